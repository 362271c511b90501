#![no_main]

use libfuzzer_sys::fuzz_target;
use v2x_beacon::config::BeaconConfig;
use v2x_beacon::core::codec;
use v2x_beacon::protocol::BeaconEngine;
use v2x_beacon::utils::crypto::AuthKey;
use v2x_beacon::utils::time::Millis;

fuzz_target!(|data: &[u8]| {
    // Arbitrary datagrams must never panic the decoder or the receive pipeline
    let _ = codec::decode(data);

    let config = BeaconConfig::default_with_overrides(|c| c.node.id = "FUZZ".into());
    if let Ok(key) = AuthKey::from_bytes(&[0x42; 32]) {
        if let Ok(mut engine) = BeaconEngine::new(&config, key) {
            let _ = engine.handle_datagram(data, Millis::new(1_000));
        }
    }
});
