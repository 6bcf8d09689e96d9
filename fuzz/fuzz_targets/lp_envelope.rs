#![no_main]

use libfuzzer_sys::fuzz_target;
use webtransport::lp::envelope;

// Envelope decoding runs directly on attacker-controlled POST bodies
// (spec.md §4.E), so it must never panic regardless of what a client sends.
fuzz_target!(|data: &[u8]| {
    let _ = envelope::decode_all(data);
});
