#![no_main]

use keyturn_core::command::Direction;
use keyturn_core::frame::MessageLayout;
use keyturn_core::{FramingConfig, Reassembler};
use keyturn_crypto::Curve;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let framing = FramingConfig {
        checksum: selector & 1 != 0,
        encrypted_authorization: selector & 2 != 0,
        ..FramingConfig::default()
    };
    let curve = if selector & 4 != 0 { Curve::P256 } else { Curve::X25519 };
    let fragment_size = usize::from(selector >> 3).max(2);

    let mut reassembler = Reassembler::new(
        MessageLayout::new(curve, &framing),
        Direction::ToController,
        fragment_size,
    );
    for piece in rest.chunks(fragment_size) {
        let _ = reassembler.feed(piece);
    }
});
