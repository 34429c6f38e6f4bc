//! Main `Dexkit` binary command line arguments options.
//!
//! This module declares a function to build `clap` command line arguments
//! parser, so that it can be used from other places than the main binary,
//! such as from bash completion file generator.

use clap::{value_parser, Arg, ArgAction, Command};
use clap_complete::Shell;

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

fn arg_debug() -> Arg {
    Arg::new("debug")
        .short('d')
        .long("debug")
        .action(ArgAction::SetTrue)
        .help("Activate debug mode")
}

fn arg_verbose() -> Arg {
    Arg::new("verbose")
        .short('v')
        .long("verbose")
        .action(ArgAction::SetTrue)
        .help("Activate verbose mode")
}

fn arg_ecslog() -> Arg {
    Arg::new("ecslog")
        .short('e')
        .long("ecslog")
        .action(ArgAction::SetTrue)
        .help("Output logs in ECS format")
}

fn arg_input() -> Arg {
    Arg::new("input")
        .short('i')
        .long("input")
        .action(ArgAction::Set)
        .required(true)
        .help("Input file")
}

fn arg_output(help: &str) -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .action(ArgAction::Set)
        .help(help.to_string())
}

fn arg_page_size() -> Arg {
    Arg::new("page-size")
        .short('p')
        .long("page-size")
        .action(ArgAction::Set)
        .value_parser(value_parser!(u32))
        .default_value("4096")
        .help("Page size in bytes (a power of two)")
}

#[must_use]
pub fn dexkit() -> Command {
    Command::new(NAME)
        .version(VERSION)
        .author(AUTHORS)
        .about(DESCRIPTION)
        .subcommand(layout())
        .subcommand(sections())
        .subcommand(unquicken())
        .subcommand(visualize())
        .subcommand(
            Command::new("gen-completions")
                .about("Generates completions file")
                .arg(
                    Arg::new("shell")
                        .short('s')
                        .long("shell")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(Shell))
                        .required(true)
                        .help("Shell type for completion generation"),
                ),
        )
}

#[must_use]
pub fn layout() -> Command {
    Command::new("layout")
        .bin_name("dk-layout")
        .version(VERSION)
        .author(AUTHORS)
        .about("Rewrites dex files with a fresh layout")
        .arg(arg_debug())
        .arg(arg_verbose())
        .arg(arg_ecslog())
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .action(ArgAction::Append)
                .required(true)
                .help("Input dex file(s)"),
        )
        .arg(arg_output("Output directory").required(true))
        .arg(
            Arg::new("compact")
                .short('c')
                .long("compact")
                .action(ArgAction::SetTrue)
                .help("Share identical data items"),
        )
        .arg(
            Arg::new("no-dedupe")
                .long("no-dedupe")
                .action(ArgAction::SetTrue)
                .requires("compact")
                .help("Do not share data items, even in compact mode"),
        )
        .arg(
            Arg::new("dedupe-code")
                .long("dedupe-code")
                .action(ArgAction::SetTrue)
                .requires("compact")
                .conflicts_with("no-dedupe")
                .help("Also share identical code items"),
        )
        .arg(
            Arg::new("keep-checksums")
                .long("keep-checksums")
                .action(ArgAction::SetTrue)
                .help("Keep the input checksum and signature"),
        )
}

#[must_use]
pub fn sections() -> Command {
    Command::new("sections")
        .bin_name("dk-sections")
        .version(VERSION)
        .author(AUTHORS)
        .about("Prints which section every page of a dex file belongs to")
        .arg(arg_debug())
        .arg(arg_verbose())
        .arg(arg_ecslog())
        .arg(arg_input())
        .arg(arg_page_size())
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print statistics as json"),
        )
}

#[must_use]
pub fn unquicken() -> Command {
    Command::new("unquicken")
        .bin_name("dk-unquicken")
        .version(VERSION)
        .author(AUTHORS)
        .about("Extracts the dex files of a vdex, restoring quickened instructions")
        .arg(arg_debug())
        .arg(arg_verbose())
        .arg(arg_ecslog())
        .arg(arg_input())
        .arg(arg_output("Output directory").required(true))
        .arg(
            Arg::new("decompile-return")
                .short('r')
                .long("decompile-return")
                .action(ArgAction::SetTrue)
                .help("Also restore return-void instructions"),
        )
}

#[must_use]
pub fn visualize() -> Command {
    Command::new("visualize")
        .bin_name("dk-visualize")
        .version(VERSION)
        .author(AUTHORS)
        .about("Generates a gnuplot script of the pages each class touches")
        .arg(arg_debug())
        .arg(arg_verbose())
        .arg(arg_ecslog())
        .arg(arg_input())
        .arg(arg_output("Output gnuplot file (stdout if missing)"))
        .arg(arg_page_size())
        .arg(
            Arg::new("index")
                .long("index")
                .action(ArgAction::Set)
                .value_parser(value_parser!(usize))
                .default_value("0")
                .help("Index of the dex file in the application, used for naming"),
        )
        .arg(
            Arg::new("filter-class")
                .long("filter-class")
                .action(ArgAction::Set)
                .help("Class(es) regex filter"),
        )
}
