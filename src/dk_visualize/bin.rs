use dexkit::prelude::DkResult;
use dexkit::{cli, dk_visualize};

fn main() -> DkResult<()> {
    let args = cli::visualize().get_matches();
    dk_visualize::run(&args)
}
