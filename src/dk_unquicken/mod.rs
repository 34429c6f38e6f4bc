use crate::prelude::*;
use clap::ArgMatches;
use rayon::prelude::*;
use std::fs;
use std::path::Path;

/// Multidex file name: `classes.dex`, `classes2.dex`, ...
fn dex_name(index: usize) -> String {
    if index == 0 {
        "classes.dex".to_string()
    } else {
        format!("classes{}.dex", index + 1)
    }
}

pub fn run(args: &ArgMatches) -> DkResult<()> {
    init_logger(args);

    let input_fname = args
        .get_one::<String>("input")
        .ok_or_else(|| DkError::BadArguments("--input needed".to_string()))?;
    let output_dir = args
        .get_one::<String>("output")
        .ok_or_else(|| DkError::BadArguments("--output needed".to_string()))?;
    let options = UnquickenOptions {
        decompile_return_instruction: args.get_flag("decompile-return"),
    };

    let mut vdex = VdexFile::open(input_fname)?;
    log::info!(
        "{}: {} dex file(s), {} bytes of quickening info",
        input_fname,
        vdex.num_dex_files(),
        vdex.header().quickening_info_size
    );

    let (slots, quickening_info) = vdex.split_for_unquicken();
    slots
        .into_par_iter()
        .map(|mut slot| -> DkResult<()> {
            slot.unquicken(quickening_info, options)?;
            log::debug!("dex #{} unquickened", slot.index);
            Ok(())
        })
        .collect::<DkResult<Vec<()>>>()?;

    fs::create_dir_all(output_dir)?;
    for index in 0..vdex.num_dex_files() {
        let path = Path::new(output_dir).join(dex_name(index));
        fs::write(&path, vdex.dex_file_data(index)?)?;
        log::info!("{} written", path.display());
    }
    Ok(())
}
