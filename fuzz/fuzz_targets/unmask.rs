#![no_main]
use libfuzzer_sys::fuzz_target;
use masked_id::{Config, IdMask};

fuzz_target!(|data: &[u8]| {
    let config = Config::from_key(b"\x2a\x5a\x96\x7e\x46\x69\x51\x05\x60\xb7\x3c\xe5\xc0\x26\xd5\xf5")
        .unwrap()
        .no_cache();
    let token = String::from_utf8_lossy(data);
    let _ = IdMask::for_long_ids(&config).unmask(&token);
    let _ = IdMask::for_uuids(&config).unmask(&token);
    let _ = IdMask::for_uuids_siv(&config).unmask(&token);
});
