#![no_main]

use compat_jk::{episode, jkl, models_dat, text};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = text::decode_text(data);
    let _ = jkl::parse_level(&text);
    let _ = episode::parse_episode(&text);
    let _ = models_dat::parse_models_dat(&text);
});
