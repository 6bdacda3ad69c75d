#![no_main]

use compat_jk::gob;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(archive) = gob::parse_gob(data.to_vec()) {
        let names: Vec<String> = archive.names().map(str::to_string).collect();
        for name in names {
            let _ = archive.read(&name);
        }
    }
});
