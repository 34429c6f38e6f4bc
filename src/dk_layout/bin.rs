use dexkit::prelude::DkResult;
use dexkit::{cli, dk_layout};

fn main() -> DkResult<()> {
    let args = cli::layout().get_matches();
    dk_layout::run(&args)
}
