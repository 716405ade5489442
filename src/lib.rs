//! # release-installer
//!
//! Picks the one release asset that fits the running machine out of
//! arbitrarily-named release files, downloads it, and installs its
//! executables into a directory, atomically and idempotently.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use release_installer::Api;
//!
//! fn main() -> Result<(), release_installer::Error> {
//!     Api::new()
//!         .set_install_dir("/usr/local/bin")
//!         .github("prometheus/node_exporter", None)
//!         .tag("1.8.2")
//!         .install()?;
//!     Ok(())
//! }
//! ```
//!
//! The pieces are usable on their own: [`select::select`] ranks assets for a
//! [`PlatformDescriptor`], [`Install`] puts executables from a `.tar.gz`,
//! `.tgz` or `.zip` into place.

pub mod api;
pub mod downloader;
pub mod error;
pub mod install;
pub mod matcher;
pub mod platform;
pub mod progress;
pub mod provider;
pub mod release;
pub mod score;
pub mod select;

pub use api::Api;
pub use downloader::Downloader;
pub use error::{Error, Result};
pub use install::{Install, InstallOutcome};
pub use platform::PlatformDescriptor;
pub use progress::default_progress_fn;
pub use provider::RepoProvider;
pub use release::{Asset, Release};
