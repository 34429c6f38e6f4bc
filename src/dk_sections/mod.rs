use crate::prelude::*;
use clap::ArgMatches;
use dk_dex::sections::{page_letters, section_statistics};
use nu_ansi_term::Color;
use std::fs;

pub fn run(args: &ArgMatches) -> DkResult<()> {
    init_logger(args);

    let input_fname = args
        .get_one::<String>("input")
        .ok_or_else(|| DkError::BadArguments("--input needed".to_string()))?;
    let page_size = *args
        .get_one::<u32>("page-size")
        .ok_or_else(|| DkError::BadArguments("--page-size needed".to_string()))?;

    let data = fs::read(input_fname)?;
    let file_size = u32::try_from(data.len())
        .map_err(|_| DkError::BadArguments(format!("{input_fname} is too large")))?;
    let header = dk_dex::parse(&data)?;
    let stats = section_statistics(&header, file_size, page_size)?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", page_letters(&header, file_size, page_size)?);
    for stat in stats {
        let pages = format!("{:>6} pages", stat.pages);
        let pages = if stat.pages > 0 {
            Color::Green.paint(pages)
        } else {
            Color::DarkGray.paint(pages)
        };
        println!(
            "{} {:<28} {:#010x} {:>8} items {}",
            stat.letter, stat.name, stat.offset, stat.items, pages
        );
    }
    Ok(())
}
