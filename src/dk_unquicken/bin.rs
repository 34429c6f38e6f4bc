use dexkit::prelude::DkResult;
use dexkit::{cli, dk_unquicken};

fn main() -> DkResult<()> {
    let args = cli::unquicken().get_matches();
    dk_unquicken::run(&args)
}
