#![no_main]

use libfuzzer_sys::fuzz_target;
use scrawly_client::presence::{Presence, PresenceDiff, PresenceList};
use scrawly_client::protocol::Frame;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = serde_json::from_slice::<Frame>(data) else {
        return;
    };

    // Reply and presence payloads are decoded from arbitrary frame payloads.
    let _ = frame.reply();
    let mut presence = Presence::new();
    if let Ok(list) = serde_json::from_value::<PresenceList>(frame.payload.clone()) {
        presence.sync_state(list);
    }
    if let Ok(diff) = serde_json::from_value::<PresenceDiff>(frame.payload.clone()) {
        presence.sync_diff(diff);
    }

    // Anything that decoded must encode again.
    let _ = serde_json::to_string(&frame);
});
