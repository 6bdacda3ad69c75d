#![no_main]

use compat_jk::{cmp, mat};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = cmp::parse_colormap(data);
    let _ = mat::parse_mat(data, None);
});
