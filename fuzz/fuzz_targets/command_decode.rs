//! Fuzz target for Command::decode
//!
//! Arbitrary text must never panic the decoder. Every input either decodes to
//! a command that passes validation, or yields a `ProtocolError` whose code
//! can be sent back to the client.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tidewire_proto::{Command, DEFAULT_MAX_COMMAND_BYTES};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    match Command::decode(text, DEFAULT_MAX_COMMAND_BYTES) {
        Ok(command) => {
            assert!(command.validate().is_ok(), "decoded command failed validation");
            let _ = command.encode();
        },
        Err(e) => {
            let _ = e.code().as_str();
        },
    }
});
