//! wpkg-repo drives the external `wpkg` packaging tool to manage a local
//! constellation of package repositories and installation targets.
//!
//! The tool itself builds, installs and indexes packages; this crate owns
//! everything around it: which repository a package resolves from, how
//! superseded versions migrate into the `wpkg@ver` archive next to each
//! repository, the per-package `index.json` version catalog, and the
//! re-index cycle that runs after every mutation.
//!
//! All operations go through one [`Orchestrator`]:
//!
//! ```no_run
//! use wpkg_repo::{Config, Orchestrator};
//!
//! let wpkg = Orchestrator::new(Config::default());
//! if !wpkg.is_installed("libx", "amd64", None).unwrap() {
//!     wpkg.install("libx", "amd64", &Default::default()).unwrap();
//! }
//! ```
//!
//! Version ordering is never computed here; everything that picks a
//! "latest" defers to the tool's own Debian comparator through the
//! [`util::VersionOrder`] seam.

pub mod archive;
pub mod cache;
pub mod config;
pub mod control;
pub mod error;
pub mod index;
pub mod orchestrator;
pub mod resolver;
pub mod runner;
pub mod sync;
pub mod util;

pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::orchestrator::{
	BuildOptions, InstallOptions, Orchestrator, Selection, ShowOptions,
};
pub use crate::resolver::DebRef;
