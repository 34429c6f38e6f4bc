#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut vdex) = dk_vdex::VdexFile::from_bytes(data.to_vec()) {
        let _ = vdex.unquicken(dk_vdex::UnquickenOptions {
            decompile_return_instruction: true,
        });
    }
});
