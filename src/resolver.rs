//! Contains package resolution against the repository constellation.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::filters;
use crate::index::{IndexParser, Pattern};
use crate::util::read_md5_sidecar;

/// A fully-qualified artifact descriptor.
///
/// Everything a mutating operation needs to know about one `.deb`: where
/// it lives, which repository owns it, and the recorded md5 when a sidecar
/// is present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebRef {
	pub name: String,
	pub version: String,
	/// `None` for source packages.
	pub arch: Option<String>,
	/// Distribution the artifact lives in.
	pub distribution: String,
	/// Absolute artifact path.
	pub file: PathBuf,
	/// Root of the repository owning the artifact.
	pub repository: PathBuf,
	/// md5 from the `.md5sum` sidecar, when one exists.
	pub hash: Option<String>,
	/// The control data's `Distribution` field, verbatim.
	pub ctrl_distribution: Option<String>,
}

/// Locates artifacts by probing repositories in a fixed order.
pub struct Resolver {
	config: Rc<Config>,
	index: Rc<IndexParser>,
}

impl Resolver {
	pub fn new(config: Rc<Config>, index: Rc<IndexParser>) -> Resolver {
		Resolver { config, index }
	}

	/// Find the best artifact for a package.
	///
	/// The primary probe is `repository` when given, else the root owning
	/// `distribution`; when the primary differs from the default
	/// toolchain repository, that default is probed second. Matching
	/// accepts the requested distribution or `sources`, and the requested
	/// architecture or `all`; among the matches the greatest version
	/// wins. The first repository in probe order with a hit provides the
	/// result, deterministically for a fixed filesystem state.
	pub fn look_for_package(
		&self,
		name: &str,
		version: Option<&str>,
		arch: Option<&str>,
		distribution: Option<&str>,
		repository: Option<&Path>,
	) -> Result<DebRef> {
		let distribution = distribution
			.unwrap_or(&self.config.distribution)
			.trim_end_matches('/');
		let arch = arch.unwrap_or(&self.config.architecture);

		let primary = match repository {
			Some(repository) => repository.to_path_buf(),
			None => self.config.deb_root_for(Some(distribution)),
		};
		let mut probes = vec![primary];
		if probes[0] != self.config.deb_root {
			probes.push(self.config.deb_root.clone());
		}

		let mut filters = filters! {
			name: Pattern::literal(name),
			distrib: Pattern::regex(&format!("^(?:{}|sources)$", regex::escape(distribution)))?,
			arch: Pattern::regex(&format!("^(?:{}|all)$", regex::escape(arch)))?,
		};
		if let Some(version) = version {
			filters.version = Some(Pattern::literal(version));
		}

		let indexes = self
			.index
			.list_index_packages(&probes, Some(arch), &filters, true)?;
		for repo_index in &indexes {
			let Some(entry) = repo_index.first(name) else {
				continue;
			};
			let file = repo_index.repository.join(&entry.file);
			let hash = read_md5_sidecar(&file)?;
			return Ok(DebRef {
				name: entry.name.clone(),
				version: entry.version.clone(),
				arch: entry.arch.clone(),
				distribution: entry
					.distrib
					.clone()
					.unwrap_or_else(|| distribution.to_string()),
				file,
				repository: repo_index.repository.clone(),
				hash,
				ctrl_distribution: entry.ctrl_distribution.clone(),
			});
		}

		Err(Error::PackageNotFound(match version {
			Some(version) => format!("{name} {version}"),
			None => name.to_string(),
		}))
	}
}
