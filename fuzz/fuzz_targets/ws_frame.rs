#![no_main]

use std::io::Cursor;

use libfuzzer_sys::fuzz_target;
use tokio::runtime::Runtime;
use webtransport::ws::codec::{FrameReader, Role};
use webtransport::config::WebSocketConfig;

// Frame parsing runs directly on attacker-controlled socket bytes
// (spec.md §4.D), so it must never panic on truncated headers, oversized
// extended lengths, or any other malformed input. `Role::Client` is used so
// the fuzzer exercises length/payload parsing without needing every input
// to also satisfy the server's masking requirement.
fuzz_target!(|data: &[u8]| {
    let runtime = Runtime::new().unwrap();
    runtime.block_on(async move {
        let mut reader = FrameReader::new(Cursor::new(data), Role::Client, WebSocketConfig::default());
        loop {
            match reader.read_frame().await {
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    });
});
