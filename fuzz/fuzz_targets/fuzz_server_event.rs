#![no_main]

use imposter_client::protocol::ServerEvent;
use imposter_client::SessionStateMachine;
use imposter_client::TransportEvent;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<ServerEvent>(data);

    // Anything that decodes must also apply without panicking, whatever
    // phase the machine happens to be in.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(event) = serde_json::from_str::<ServerEvent>(s) {
            let mut state = SessionStateMachine::new();
            let event = TransportEvent::Server(event);
            let _ = state.apply(&event);
            let _ = state.apply(&event);
        }
    }
});
