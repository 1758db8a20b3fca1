//! Contains the toolchain configuration the orchestrator operates under.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Filesystem roots, identities and tool settings read by every operation.
///
/// A toolchain loader usually hydrates this from disk; the [`Default`]
/// values describe a self-contained layout under the system temp directory
/// so the crate is usable without one.
///
/// # Example:
/// ```
/// use wpkg_repo::Config;
///
/// let config = Config::default()
///     .deb_root("/srv/packages/repository")
///     .distribution("stable");
/// assert_eq!(config.distribution, "stable");
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Default repository root, one sub-directory per distribution.
	pub deb_root: PathBuf,
	/// Distributions that live under a different repository root.
	pub distribution_roots: HashMap<String, PathBuf>,
	/// Root under which per-architecture installation targets live.
	pub target_root: PathBuf,
	/// File name of the repository index the tool maintains.
	pub index_filename: String,
	/// Distribution assumed when an operation does not name one.
	pub distribution: String,
	/// Architecture of the running toolchain, in Debian naming.
	pub architecture: String,
	/// Name of the metadata database directory under `var/lib`.
	pub admindir: String,
	/// Scratch directory for rendered control files and tool temp data.
	pub temp_dir: PathBuf,
	/// Short alias advertised to the tool instead of [`Config::temp_dir`].
	///
	/// The tool chokes on long temp paths on some platforms; when a
	/// substitution helper provides a short alias it goes here.
	pub temp_alias: Option<PathBuf>,
	/// Maintainer identity rendered into the admindir control file.
	pub maintainer_name: String,
	pub maintainer_email: String,
	/// Binary name (or path) of the packaging tool.
	pub pkg_tool: String,
	/// Binary name (or path) of the dependency-graph companion.
	pub graph_tool: String,
	/// CMake generator handed to binary builds.
	pub cmake_generator: String,
	/// Make command handed to binary builds.
	pub make_tool: String,
	/// Pass `--verbose` to every tool invocation.
	pub verbose: bool,
}

impl Default for Config {
	fn default() -> Config {
		let base = env::temp_dir().join("wpkg");
		Config {
			deb_root: base.join("repository"),
			distribution_roots: HashMap::new(),
			target_root: base.join("targets"),
			index_filename: "index.tar.gz".to_string(),
			distribution: "stable".to_string(),
			architecture: native_architecture(),
			admindir: "wpkg".to_string(),
			temp_dir: base.join("tmp"),
			temp_alias: None,
			maintainer_name: "Toolchain Builder".to_string(),
			maintainer_email: "builder@localhost".to_string(),
			pkg_tool: "wpkg".to_string(),
			graph_tool: "wpkg-graph".to_string(),
			cmake_generator: default_cmake_generator().to_string(),
			make_tool: "make".to_string(),
			verbose: false,
		}
	}
}

impl Config {
	/// Replace the default repository root.
	pub fn deb_root(mut self, root: impl Into<PathBuf>) -> Config {
		self.deb_root = root.into();
		self
	}

	/// Replace the installation-target root.
	pub fn target_root(mut self, root: impl Into<PathBuf>) -> Config {
		self.target_root = root.into();
		self
	}

	/// Replace the default distribution.
	pub fn distribution(mut self, distribution: impl Into<String>) -> Config {
		self.distribution = distribution.into();
		self
	}

	/// Replace the packaging-tool binary.
	pub fn pkg_tool(mut self, tool: impl Into<String>) -> Config {
		self.pkg_tool = tool.into();
		self
	}

	/// Replace the graph-tool binary.
	pub fn graph_tool(mut self, tool: impl Into<String>) -> Config {
		self.graph_tool = tool.into();
		self
	}

	/// Repository root owning `distribution`.
	///
	/// Falls back to [`Config::deb_root`] unless the distribution has a
	/// dedicated root configured. A trailing `/` on the name is ignored.
	pub fn deb_root_for(&self, distribution: Option<&str>) -> PathBuf {
		if let Some(distribution) = distribution {
			let distribution = distribution.trim_end_matches('/');
			if let Some(root) = self.distribution_roots.get(distribution) {
				return root.clone();
			}
		}
		self.deb_root.clone()
	}

	/// The per-architecture installation root `<target>/<arch>`.
	pub fn target_arch_root(&self, arch: &str, target_root: Option<&Path>) -> PathBuf {
		target_root.unwrap_or(&self.target_root).join(arch)
	}

	/// Path of the sources list inside a target's metadata database.
	pub fn sources_list(&self, arch: &str, target_root: Option<&Path>) -> PathBuf {
		self.target_arch_root(arch, target_root)
			.join("var/lib")
			.join(&self.admindir)
			.join("core/sources.list")
	}

	/// The temp path advertised to the tool via `--tmpdir`.
	pub fn tool_tmp(&self) -> &Path { self.temp_alias.as_deref().unwrap_or(&self.temp_dir) }
}

/// The Debian name of the architecture this toolchain runs on.
fn native_architecture() -> String {
	match env::consts::ARCH {
		"x86_64" => "amd64".to_string(),
		"x86" => "i386".to_string(),
		"aarch64" => "arm64".to_string(),
		other => other.to_string(),
	}
}

fn default_cmake_generator() -> &'static str {
	if cfg!(windows) {
		"MSYS Makefiles"
	} else {
		"Unix Makefiles"
	}
}
