use crate::prelude::*;
use clap::ArgMatches;
use dk_dex::visualize::{visualize, VisualizeOptions};
use regex::Regex;
use std::fs::File;
use std::io::{self, BufWriter, Write};

pub fn run(args: &ArgMatches) -> DkResult<()> {
    init_logger(args);

    let input_fname = args
        .get_one::<String>("input")
        .ok_or_else(|| DkError::BadArguments("--input needed".to_string()))?;
    let index = *args
        .get_one::<usize>("index")
        .ok_or_else(|| DkError::BadArguments("--index needed".to_string()))?;

    let mut options = VisualizeOptions::for_dex_index(index);
    if let Some(page_size) = args.get_one::<u32>("page-size") {
        options.page_size = *page_size;
    }
    if let Some(filter) = args.get_one::<String>("filter-class") {
        options.class_filter = Some(Regex::new(filter)?);
    }

    let header = dk_dex::open(input_fname)?;
    let mut out: Box<dyn Write> = match args.get_one::<String>("output") {
        Some(fname) => Box::new(BufWriter::new(File::create(fname)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    let records = visualize(&header, &mut out, &options)?;
    out.flush()?;
    log::info!("{} records plotted", records);
    Ok(())
}
