use crate::prelude::*;
use clap::ArgMatches;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

fn writer_options(args: &ArgMatches) -> WriterOptions {
    let mut options = if args.get_flag("compact") {
        WriterOptions::compact()
    } else {
        WriterOptions::default()
    };
    options.dedupe = !args.get_flag("no-dedupe");
    options.dedupe_code_items = args.get_flag("dedupe-code");
    options.recompute_checksums = !args.get_flag("keep-checksums");
    options
}

fn relayout(input: &Path, output: &Path, options: &WriterOptions) -> DkResult<(usize, usize)> {
    let data = fs::read(input)?;
    let mut header = dk_dex::parse(&data)?;
    let written = dk_dex::write(&mut header, options)?;
    fs::write(output, &written)?;
    Ok((data.len(), written.len()))
}

pub fn run(args: &ArgMatches) -> DkResult<()> {
    init_logger(args);

    let inputs: Vec<&String> = args
        .get_many::<String>("input")
        .ok_or_else(|| DkError::BadArguments("--input needed".to_string()))?
        .collect();
    let output_dir = args
        .get_one::<String>("output")
        .ok_or_else(|| DkError::BadArguments("--output needed".to_string()))?;
    let options = writer_options(args);

    let mut names = HashSet::new();
    let mut jobs = Vec::with_capacity(inputs.len());
    for input in inputs {
        let input = PathBuf::from(input);
        let name = input
            .file_name()
            .ok_or_else(|| DkError::BadArguments(format!("{} is not a file", input.display())))?
            .to_owned();
        if !names.insert(name.clone()) {
            return Err(DkError::BadArguments(format!(
                "several inputs named {}",
                name.to_string_lossy()
            )));
        }
        jobs.push((input, Path::new(output_dir).join(name)));
    }
    fs::create_dir_all(output_dir)?;

    let sizes = jobs
        .par_iter()
        .map(|(input, output)| relayout(input, output, &options))
        .collect::<DkResult<Vec<(usize, usize)>>>()?;

    for ((input, output), (before, after)) in jobs.iter().zip(sizes) {
        log::info!(
            "{} -> {}: {} -> {} bytes",
            input.display(),
            output.display(),
            before,
            after
        );
    }
    Ok(())
}
