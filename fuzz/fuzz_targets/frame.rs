#![no_main]

use keyturn_core::frame::decode_frame;
use keyturn_core::message::{
    AuthorizationConfirmation, AuthorizationData, AuthorizationGrant, ErrorReport,
    PeerAuthenticator,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Frame and payload decoding must reject, never panic
    for checksum in [true, false] {
        if let Ok((_, payload)) = decode_frame(data, checksum) {
            let _ = PeerAuthenticator::decode(payload);
            let _ = AuthorizationData::decode(payload);
            let _ = AuthorizationGrant::decode(payload);
            let _ = AuthorizationConfirmation::decode(payload);
            let _ = ErrorReport::decode(payload);
        }
    }
});
