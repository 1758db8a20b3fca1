//! Contains the version archive: migration of superseded artifacts and the
//! per-package catalog.
//!
//! The archive tree lives next to the repository it serves, at
//! `<parent(repo)>/wpkg@ver/<distribution>/<name>/<version>/`. Sweeping a
//! distribution moves every losing version there, back-links a copy of the
//! surviving latest, and rewrites the package's `index.json` catalog.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::{self, Filters, IndexParser, RepoIndex};
use crate::runner::ToolRunner;
use crate::util::{VersionOrder, base_version, file_md5, sidecar_path};

/// Name of the archive directory, a sibling of the repository root.
pub const ARCHIVE_DIR_NAME: &str = "wpkg@ver";

/// The archive tree serving `repository`.
pub fn archive_root(repository: &Path) -> PathBuf {
	repository
		.parent()
		.unwrap_or(repository)
		.join(ARCHIVE_DIR_NAME)
}

/// Catalog entry of one base version (the version minus its trailing
/// `-suffix`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseEntry {
	/// Greatest full version of this base.
	pub latest: String,
	/// Every archived full version of this base.
	pub versions: Vec<String>,
}

/// The per-package `index.json` catalog.
///
/// Serialized as a flat object: one key per base version plus the literal
/// key `latest` naming the greatest base. Every listed version corresponds
/// to an existing archive directory; the catalog is rebuilt from the
/// directory listing on each update, which purges orphans.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArchiveCatalog {
	/// Greatest base version, when any version is archived.
	pub latest: Option<String>,
	pub bases: BTreeMap<String, BaseEntry>,
}

impl ArchiveCatalog {
	/// Read a catalog; an absent file is an empty catalog.
	pub fn load(path: &Path) -> Result<ArchiveCatalog> {
		let text = match fs::read_to_string(path) {
			Ok(text) => text,
			Err(err) if err.kind() == io::ErrorKind::NotFound => {
				return Ok(ArchiveCatalog::default());
			},
			Err(err) => return Err(Error::Io(err)),
		};
		let value: Value = match serde_json::from_str(&text) {
			Ok(value) => value,
			Err(err) => return Err(Error::parse("archive catalog", err)),
		};
		let Value::Object(map) = value else {
			return Err(Error::parse("archive catalog", "top-level value is not an object"));
		};

		let mut catalog = ArchiveCatalog::default();
		for (key, value) in map {
			if key == "latest" {
				catalog.latest = value.as_str().map(str::to_string);
				continue;
			}
			match serde_json::from_value(value) {
				Ok(entry) => {
					catalog.bases.insert(key, entry);
				},
				Err(err) => return Err(Error::parse("archive catalog", err)),
			}
		}
		Ok(catalog)
	}

	/// Persist the catalog with a 2-space indent.
	pub fn save(&self, path: &Path) -> Result<()> {
		let mut map = serde_json::Map::new();
		for (base, entry) in &self.bases {
			let value = serde_json::to_value(entry)
				.map_err(|err| Error::parse("archive catalog", err))?;
			map.insert(base.clone(), value);
		}
		if let Some(latest) = &self.latest {
			map.insert("latest".to_string(), Value::String(latest.clone()));
		}
		let text = serde_json::to_string_pretty(&Value::Object(map))
			.map_err(|err| Error::parse("archive catalog", err))?;
		fs::write(path, text)?;
		Ok(())
	}

	/// Every archived full version, grouped by base in catalog order.
	pub fn all_versions(&self) -> Vec<String> {
		self.bases
			.values()
			.flat_map(|entry| entry.versions.iter().cloned())
			.collect()
	}

	/// The greatest archived full version.
	pub fn latest_version(&self) -> Option<&str> {
		let base = self.latest.as_deref()?;
		Some(self.bases.get(base)?.latest.as_str())
	}
}

/// A `.deb` file name parsed from a distribution directory.
#[derive(Clone, Debug)]
struct DebFile {
	name: String,
	version: String,
	file: String,
}

/// Migrates superseded artifacts out of distribution directories.
pub struct ArchiveManager {
	runner: Rc<ToolRunner>,
	order: Rc<dyn VersionOrder>,
	index: Rc<IndexParser>,
	config: Rc<Config>,
}

impl ArchiveManager {
	pub fn new(
		runner: Rc<ToolRunner>,
		order: Rc<dyn VersionOrder>,
		index: Rc<IndexParser>,
		config: Rc<Config>,
	) -> ArchiveManager {
		ArchiveManager {
			runner,
			order,
			index,
			config,
		}
	}

	/// Sweep one distribution of a repository.
	///
	/// Package names with more than one version lose every version but
	/// the greatest to the archive; the survivor is back-linked (copied,
	/// the live artifact stays). Names ending in `-stub` are skipped. A
	/// version whose control `Distribution` carries a `+`-marked token is
	/// archived under that specialized distribution instead of the one
	/// being swept.
	pub fn archive_distribution(&self, repository: &Path, distribution: &str) -> Result<()> {
		let probes = [repository.to_path_buf()];
		let indexes = self
			.index
			.list_index_packages(&probes, None, &Filters::default(), false)?;
		let repo_index = indexes.into_iter().next();

		let packages_dir = repository.join(distribution);
		let mut groups: BTreeMap<String, Vec<DebFile>> = BTreeMap::new();
		let read = match fs::read_dir(&packages_dir) {
			Ok(read) => read,
			Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
			Err(err) => return Err(Error::Io(err)),
		};
		for entry in read {
			let entry = entry?;
			let file = entry.file_name().to_string_lossy().into_owned();
			let Some(captures) = deb_name_re().captures(&file) else {
				continue;
			};
			let name = captures[1].to_string();
			if name.ends_with("-stub") {
				continue;
			}
			groups.entry(name.clone()).or_default().push(DebFile {
				name,
				version: captures[2].to_string(),
				file,
			});
		}

		let archive = archive_root(repository);
		for (name, debs) in groups {
			if debs.len() < 2 {
				continue;
			}

			let mut survivor: Option<DebFile> = None;
			for deb in debs {
				survivor = Some(match survivor.take() {
					None => deb,
					Some(to_check) => {
						let (winner, loser) =
							if self.order.is_greater(&deb.version, &to_check.version)? {
								(deb, to_check)
							} else {
								(to_check, deb)
							};
						let dir = self.destination(
							&archive,
							distribution,
							repo_index.as_ref(),
							&loser,
						);
						self.move_to_archive(&packages_dir, &dir, &loser, false)?;
						winner
					},
				});
			}

			let Some(latest) = survivor else {
				return Err(Error::InvariantViolation(format!(
					"at least one version of {name} must exist in the main repository"
				)));
			};
			let dir = self.destination(&archive, distribution, repo_index.as_ref(), &latest);
			self.move_to_archive(&packages_dir, &dir, &latest, true)?;
		}
		Ok(())
	}

	/// Archive destination for one version, honoring the specialized
	/// distribution redirect.
	fn destination(
		&self,
		archive: &Path,
		swept: &str,
		repo_index: Option<&RepoIndex>,
		deb: &DebFile,
	) -> PathBuf {
		let entry = repo_index.and_then(|index| index.entry(&deb.name, &deb.version));
		let specialized = entry
			.and_then(|entry| entry.ctrl_distribution.as_deref())
			.and_then(|ctrl| {
				ctrl.split([' ', ','])
					.map(|token| token.trim().trim_end_matches('/'))
					.find(|token| token.contains('+'))
					.map(str::to_string)
			});
		archive.join(specialized.unwrap_or_else(|| swept.to_string()))
	}

	/// Move (or back-link) one artifact into the archive and refresh the
	/// package catalog.
	///
	/// An identical artifact already in place short-circuits: the source
	/// is simply dropped when moving, and left alone when back-linking. A
	/// differing artifact under the same version is overwritten with a
	/// warning, which makes re-publishing a rebuilt version converge.
	fn move_to_archive(
		&self,
		packages_dir: &Path,
		archive_dir: &Path,
		deb: &DebFile,
		back_link: bool,
	) -> Result<()> {
		let src = packages_dir.join(&deb.file);
		let version_dir = archive_dir.join(&deb.name).join(&deb.version);
		let dst = version_dir.join(&deb.file);

		if dst.exists() {
			if file_md5(&src)? == file_md5(&dst)? {
				if !back_link {
					fs::remove_file(&src)?;
					remove_sidecar(&src);
				}
				return Ok(());
			}
			warn!(
				artifact = %deb.file,
				version = %deb.version,
				"archived copy differs, overwriting"
			);
		}

		fs::create_dir_all(&version_dir)?;
		if back_link {
			fs::copy(&src, &dst)?;
		} else {
			fs::rename(&src, &dst)?;
		}
		transfer_sidecar(&src, &dst, back_link)?;

		index::create_index(&self.runner, &self.config, &version_dir)?;
		self.update_catalog(&archive_dir.join(&deb.name))
	}

	/// Rebuild a package's `index.json` from its version directories.
	fn update_catalog(&self, package_dir: &Path) -> Result<()> {
		let mut versions = Vec::new();
		for entry in fs::read_dir(package_dir)? {
			let entry = entry?;
			if entry.file_type()?.is_dir() {
				versions.push(entry.file_name().to_string_lossy().into_owned());
			}
		}
		versions.sort();

		let mut catalog = ArchiveCatalog::default();
		for version in versions {
			let base = base_version(&version).to_string();
			catalog.bases.entry(base).or_default().versions.push(version);
		}

		for entry in catalog.bases.values_mut() {
			let mut latest = entry.versions[0].clone();
			for candidate in &entry.versions[1..] {
				if self.order.is_greater(candidate, &latest)? {
					latest = candidate.clone();
				}
			}
			entry.latest = latest;
		}

		let mut top: Option<String> = None;
		for base in catalog.bases.keys() {
			top = Some(match top.take() {
				None => base.clone(),
				Some(current) => {
					if self.order.is_greater(base, &current)? {
						base.clone()
					} else {
						current
					}
				},
			});
		}
		catalog.latest = top;

		catalog.save(&package_dir.join("index.json"))
	}

	/// Read the catalog of one archived package.
	pub fn catalog(
		&self,
		repository: &Path,
		distribution: &str,
		name: &str,
	) -> Result<ArchiveCatalog> {
		ArchiveCatalog::load(
			&archive_root(repository)
				.join(distribution.trim_end_matches('/'))
				.join(name)
				.join("index.json"),
		)
	}

	/// Absolute path of an archived artifact, pinned to a version.
	pub fn archived_deb(
		&self,
		repository: &Path,
		distribution: &str,
		name: &str,
		version: &str,
	) -> Result<PathBuf> {
		let version_dir = archive_root(repository)
			.join(distribution.trim_end_matches('/'))
			.join(name)
			.join(version);
		let read = match fs::read_dir(&version_dir) {
			Ok(read) => read,
			Err(err) if err.kind() == io::ErrorKind::NotFound => {
				return Err(Error::PackageNotFound(format!("{name} {version}")));
			},
			Err(err) => return Err(Error::Io(err)),
		};
		for entry in read {
			let entry = entry?;
			let file = entry.file_name().to_string_lossy().into_owned();
			if deb_name_re().is_match(&file) {
				return Ok(version_dir.join(file));
			}
		}
		Err(Error::PackageNotFound(format!("{name} {version}")))
	}
}

/// Apply the artifact's move/copy to its `.md5sum` sidecar; a missing
/// sidecar is benign.
fn transfer_sidecar(src: &Path, dst: &Path, back_link: bool) -> Result<()> {
	let src_sidecar = sidecar_path(src);
	let dst_sidecar = sidecar_path(dst);
	let result = if back_link {
		fs::copy(&src_sidecar, &dst_sidecar).map(|_| ())
	} else {
		fs::rename(&src_sidecar, &dst_sidecar)
	};
	match result {
		Ok(()) => Ok(()),
		Err(err) if err.kind() == io::ErrorKind::NotFound => {
			debug!(sidecar = %src_sidecar.display(), "no md5 sidecar to transfer");
			Ok(())
		},
		Err(err) => Err(Error::Io(err)),
	}
}

fn remove_sidecar(file: &Path) {
	let sidecar = sidecar_path(file);
	if let Err(err) = fs::remove_file(&sidecar) {
		if err.kind() != io::ErrorKind::NotFound {
			debug!(sidecar = %sidecar.display(), "unable to remove sidecar: {err}");
		}
	}
}

fn deb_name_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(r"^([^ _]+)_([^ _]+)(?:_([^ _]+))?\.deb$").expect("deb name pattern is valid")
	})
}
