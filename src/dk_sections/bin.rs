use dexkit::prelude::DkResult;
use dexkit::{cli, dk_sections};

fn main() -> DkResult<()> {
    let args = cli::sections().get_matches();
    dk_sections::run(&args)
}
