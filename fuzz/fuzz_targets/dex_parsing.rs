#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut header) = dk_dex::parse(data) {
        let _ = dk_dex::write(&mut header, &dk_dex::WriterOptions::compact());
    }
});
