//! # `Dexkit`
//!
//! `dexkit` is the main crate of the `Dexkit` project. The project is
//! subdivided into multiple crates, `dexkit` acts as entry point by
//! reexporting important structs and functions from those sub-crates. Most of
//! the reexport are done within the `dexkit::prelude` namespace.
//!
//! ## Library basics
//!
//! A dex file is parsed into an item model, which can be modified and
//! written back with a fresh layout:
//!
//! ```rust,no_run
//! use dexkit::prelude::*;
//! use dexkit::dex;
//!
//! let mut header = dex::open("classes.dex")?;
//! println!("dex version: {}", header.version());
//! let compact = dex::write(&mut header, &WriterOptions::compact())?;
//! println!("compact size: {}", compact.len());
//! # Ok::<(), DkError>(())
//! ```
//!
//! Vdex containers are mapped copy-on-write, and their dex files can be
//! restored in place:
//!
//! ```rust,no_run
//! use dexkit::prelude::*;
//!
//! let mut vdex = VdexFile::open("base.vdex")?;
//! vdex.unquicken(UnquickenOptions::default())?;
//! std::fs::write("classes.dex", vdex.dex_file_data(0)?)?;
//! # Ok::<(), DkError>(())
//! ```
//!
//! ## Sub-crates
//!
//!  - [`dk_utils`] contains the binary format primitives (LEB128, encoded
//!    values, little-endian writers),
//!  - [`dk_dex`] contains the dex reader, item model, writer and the page
//!    diagnostics,
//!  - [`dk_vdex`] contains the vdex container and the quickening passes.

mod errors;

pub mod cli;
pub mod dk_layout;
pub mod dk_sections;
pub mod dk_unquicken;
pub mod dk_visualize;

pub use dk_dex as dex;
pub use dk_utils as utils;
pub use dk_vdex as vdex;

/// Reexport module of commonly used structures and functions from `Dexkit`
/// sub-crates:
///
/// ```rust
/// use dexkit::prelude::*;
/// ```
pub mod prelude {
    pub use crate::errors::{DkError, DkResult};

    pub use dk_dex::{DexFile, DexFileOptions, Header, LayoutLevel, WriterOptions};

    pub use dk_vdex::{UnquickenOptions, VdexFile};

    use clap::ArgMatches;

    pub fn init_logger(args: &ArgMatches) {
        let env = env_logger::Env::new()
            .filter_or("DK_LOG", "info")
            .write_style("DK_LOG_STYLE");

        let mut builder = env_logger::Builder::from_env(env);
        if args.get_flag("verbose") {
            builder.filter_level(log::LevelFilter::Trace);
        } else if args.get_flag("debug") {
            builder.filter_level(log::LevelFilter::Debug);
        }
        if args.get_flag("ecslog") {
            builder.format(ecs_logger::format);
        }
        builder.init();
    }
}
