#![no_main]

use imposter_client::protocol::ClientCommand;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<ClientCommand>(data);

    // Commands that decode must re-encode.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(command) = serde_json::from_str::<ClientCommand>(s) {
            let _ = serde_json::to_string(&command);
        }
    }
});
