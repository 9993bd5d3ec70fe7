#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Binary node decoding must never panic, whatever the input
    let _ = chatwire::core::decode(data);

    // Neither may envelope parsing and control classification
    if let Ok(env) = chatwire::Envelope::parse(bytes::Bytes::copy_from_slice(data)) {
        let _ = chatwire::protocol::control::classify(&env.payload);
    }
});
