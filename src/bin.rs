use clap::ArgMatches;
use clap_complete::{generate, Shell};
use dexkit::prelude::*;
use dexkit::{cli, dk_layout, dk_sections, dk_unquicken, dk_visualize};
use std::io;

fn main() -> DkResult<()> {
    let args = cli::dexkit().get_matches();

    match &args.subcommand() {
        Some(("layout", cmd_args)) => dk_layout::run(cmd_args),
        Some(("sections", cmd_args)) => dk_sections::run(cmd_args),
        Some(("unquicken", cmd_args)) => dk_unquicken::run(cmd_args),
        Some(("visualize", cmd_args)) => dk_visualize::run(cmd_args),
        Some(("gen-completions", sub_args)) => subcommand_gen_completions(sub_args),
        Some((subcommand, _)) => Err(DkError::BadArguments(format!(
            "unknown subcommand '{subcommand}'"
        ))),
        None => Err(DkError::BadArguments("missing subcommand".to_string())),
    }
}

fn subcommand_gen_completions(sub_args: &ArgMatches) -> DkResult<()> {
    let generator = *sub_args
        .get_one::<Shell>("shell")
        .ok_or_else(|| DkError::BadArguments("--shell needed".to_string()))?;
    let mut cmd = cli::dexkit();
    let cmd_name = cmd.get_name().to_string();
    generate(generator, &mut cmd, cmd_name, &mut io::stdout());
    Ok(())
}
