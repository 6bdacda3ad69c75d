#![no_main]

use compat_jk::{text, threedo};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = text::decode_text(data);
    let _ = threedo::parse_model(&text);
});
