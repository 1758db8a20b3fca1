//! Contains the orchestrator facade, the entry point for all operations.

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use crate::archive::{ArchiveManager, archive_root};
use crate::cache::{BoundedCache, SHOW_CACHE_CAP};
use crate::config::Config;
use crate::control::{ADMINDIR_TEMPLATE, ControlSection, render_template};
use crate::error::{Error, Result};
use crate::index::IndexParser;
use crate::resolver::{DebRef, Resolver};
use crate::runner::{Invocation, ToolRunner};
use crate::sync::RepositorySynchronizer;
use crate::util::{ToolVersionOrder, VersionOrder, read_md5_sidecar};

/// Options recognized by the build operations.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuildOptions<'a> {
	/// Publish build products into this repository instead of the
	/// default root for the distribution.
	pub output_repository: Option<&'a Path>,
	/// Target distribution sub-tree.
	pub distribution: Option<&'a str>,
}

/// Options recognized by the install operations.
#[derive(Clone, Copy, Debug, Default)]
pub struct InstallOptions<'a> {
	/// Distribution to resolve the package from.
	pub distribution: Option<&'a str>,
	/// Install into this target root instead of the configured one.
	pub target_root: Option<&'a Path>,
	/// Reinstall even when the same version is already present; when
	/// unset the tool is told to skip same-version installs.
	pub reinstall: bool,
}

/// Options recognized by `show`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShowOptions<'a> {
	/// Pin to an archived version instead of the live artifact.
	pub version: Option<&'a str>,
	/// Distribution to resolve from; also names the dynamic
	/// per-distribution metadata field.
	pub distribution: Option<&'a str>,
}

/// Package selection states accepted by `--set-selection`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
	Auto,
	Normal,
	Hold,
	Reject,
}

impl Selection {
	pub fn as_str(self) -> &'static str {
		match self {
			Selection::Auto => "auto",
			Selection::Normal => "normal",
			Selection::Hold => "hold",
			Selection::Reject => "reject",
		}
	}
}

/// The main struct for driving the packaging tools.
///
/// One orchestrator serializes all of its operations; callers wanting
/// parallel mutations run several orchestrators against disjoint
/// repositories. Construction wires every component once; the two bounded
/// caches live as long as the orchestrator.
///
/// # Example:
/// ```no_run
/// use wpkg_repo::{Config, Orchestrator};
///
/// let wpkg = Orchestrator::new(Config::default());
/// wpkg.sync_repository(std::path::Path::new("/srv/packages/repository")).unwrap();
/// ```
pub struct Orchestrator {
	config: Rc<Config>,
	runner: Rc<ToolRunner>,
	grapher: ToolRunner,
	order: Rc<dyn VersionOrder>,
	index: Rc<IndexParser>,
	resolver: Resolver,
	archive: Rc<ArchiveManager>,
	synchronizer: RepositorySynchronizer,
	show_cache: RefCell<BoundedCache<Value>>,
}

impl Orchestrator {
	/// Wire an orchestrator with the tool-backed version comparator.
	pub fn new(config: Config) -> Orchestrator {
		let config = Rc::new(config);
		let runner = Rc::new(ToolRunner::packaging(&config));
		let order: Rc<dyn VersionOrder> = Rc::new(ToolVersionOrder::new(runner.clone()));
		Self::assemble(config, runner, order)
	}

	/// Wire an orchestrator around a caller-provided version comparator.
	pub fn with_version_order(config: Config, order: Rc<dyn VersionOrder>) -> Orchestrator {
		let config = Rc::new(config);
		let runner = Rc::new(ToolRunner::packaging(&config));
		Self::assemble(config, runner, order)
	}

	fn assemble(
		config: Rc<Config>,
		runner: Rc<ToolRunner>,
		order: Rc<dyn VersionOrder>,
	) -> Orchestrator {
		let grapher = ToolRunner::graphing(&config);
		let index = Rc::new(IndexParser::new(runner.clone(), order.clone(), config.clone()));
		let archive = Rc::new(ArchiveManager::new(
			runner.clone(),
			order.clone(),
			index.clone(),
			config.clone(),
		));
		let resolver = Resolver::new(config.clone(), index.clone());
		let synchronizer =
			RepositorySynchronizer::new(runner.clone(), config.clone(), archive.clone());
		Orchestrator {
			config,
			runner,
			grapher,
			order,
			index,
			resolver,
			archive,
			synchronizer,
			show_cache: RefCell::new(BoundedCache::new(SHOW_CACHE_CAP)),
		}
	}

	/// The configuration this orchestrator operates under.
	pub fn config(&self) -> &Config { &self.config }

	/// Get the Resolver.
	pub fn resolver(&self) -> &Resolver { &self.resolver }

	/// Get the IndexParser.
	pub fn index(&self) -> &IndexParser { &self.index }

	// ----- builds ------------------------------------------------------

	/// Build a binary package from `package_path`.
	///
	/// The architecture is the second-to-last component of the path
	/// (`…/<arch>/<package>`). The target root for that architecture is
	/// passed to the builder when it exists, so the build can resolve
	/// against installed dependencies. On success the effective
	/// repository is synchronized.
	pub fn build(&self, package_path: &Path, options: &BuildOptions) -> Result<()> {
		let arch = path_arch(package_path)?;
		let repository = self.build_repository(options);

		let mut invocation = self.build_invocation(&repository);
		let root = self.config.target_arch_root(&arch, None);
		if root.is_dir() {
			invocation = invocation.arg("--root").arg(root);
		}
		invocation = invocation.arg("--build").last_arg(package_path);
		self.runner.run_ok(invocation)?;

		self.synchronizer.sync_repository(&repository)
	}

	/// Build a source package from `package_path`.
	///
	/// Source builds run with the package directory as the child working
	/// directory; the orchestrator's own working directory is untouched.
	pub fn build_src(&self, package_path: &Path, options: &BuildOptions) -> Result<()> {
		let repository = self.build_repository(options);

		let invocation = self
			.build_invocation(&repository)
			.current_dir(package_path)
			.arg("--build")
			.last_arg(package_path);
		self.runner.run_ok(invocation)?;

		self.synchronizer.sync_repository(&repository)
	}

	/// Build binary packages out of already-published source packages.
	///
	/// With a name, the matching `-src` package is resolved and built;
	/// without one the whole `sources` sub-tree of the repository is
	/// built, which requires it to exist and hold at least one package.
	pub fn build_from_src(
		&self,
		name: Option<&str>,
		arch: &str,
		options: &BuildOptions,
	) -> Result<()> {
		let repository = self.build_repository(options);

		let operand = match name {
			Some(name) => {
				let src_name = format!("{name}-src");
				let debref = self.resolver.look_for_package(
					&src_name,
					None,
					Some(arch),
					options.distribution,
					Some(&repository),
				)?;
				debref.file
			},
			None => {
				let sources = repository.join("sources");
				if !has_entries(&sources)? {
					return Err(Error::NothingToBuild(sources));
				}
				sources
			},
		};

		let mut invocation = self.build_invocation(&repository);
		let root = self.config.target_arch_root(arch, None);
		if root.is_dir() {
			invocation = invocation.arg("--root").arg(root);
		}
		invocation = invocation.arg("--build").last_arg(operand);
		self.runner.run_ok(invocation)?;

		self.synchronizer.sync_repository(&repository)
	}

	fn build_repository(&self, options: &BuildOptions) -> PathBuf {
		match options.output_repository {
			Some(repository) => repository.to_path_buf(),
			None => self.config.deb_root_for(options.distribution),
		}
	}

	/// The flags shared by every build flavor.
	fn build_invocation(&self, repository: &Path) -> Invocation<'static> {
		let mut invocation = Invocation::new()
			.arg("--output-repository-dir")
			.arg(repository)
			.args(["--compressor", "zstd", "--zlevel", "3"])
			.args(["--install-prefix", "/usr"])
			.arg("--cmake-generator")
			.arg(&self.config.cmake_generator)
			.arg("--make-tool")
			.arg(&self.config.make_tool)
			.args(["--exception", ".gitignore", ".gitattributes"])
			.args(["--force-file-info", "--accept-special-windows-filename"]);

		let mut add_list = vec![repository.to_path_buf()];
		if self.config.deb_root != repository {
			add_list.push(self.config.deb_root.clone());
		}
		let add_list: Vec<_> = add_list.into_iter().filter(|path| path.is_dir()).collect();
		if !add_list.is_empty() {
			invocation = invocation.arg("--repository").args(add_list);
		}
		invocation
	}

	// ----- installs ----------------------------------------------------

	/// Install a package resolved from the repositories.
	pub fn install(&self, name: &str, arch: &str, options: &InstallOptions) -> Result<()> {
		let debref = self.resolver.look_for_package(
			name,
			None,
			Some(arch),
			options.distribution,
			None,
		)?;
		self.install_file(&debref.file, arch, options)
	}

	/// Install by package name, letting the tool resolve it from the
	/// target's configured sources.
	pub fn install_by_name(&self, name: &str, arch: &str, options: &InstallOptions) -> Result<()> {
		self.install_file(Path::new(name), arch, options)
	}

	/// Install a version pinned from the archive.
	pub fn install_from_archive(
		&self,
		name: &str,
		version: &str,
		arch: &str,
		options: &InstallOptions,
	) -> Result<()> {
		let distribution = self.distribution_or_default(options.distribution);
		let repository = self.config.deb_root_for(Some(distribution.as_str()));
		let file = self
			.archive
			.archived_deb(&repository, &distribution, name, version)?;
		self.install_file(&file, arch, options)
	}

	fn install_file(&self, file: &Path, arch: &str, options: &InstallOptions) -> Result<()> {
		let root = self.config.target_arch_root(arch, options.target_root);
		let mut invocation = Invocation::new().arg("--root").arg(root).arg("--install");
		if !options.reinstall {
			invocation = invocation.arg("--skip-same-version");
		}
		self.runner.run_ok(invocation.last_arg(file))
	}

	/// Whether a package is installed in a target.
	pub fn is_installed(
		&self,
		name: &str,
		arch: &str,
		target_root: Option<&Path>,
	) -> Result<bool> {
		let root = self.config.target_arch_root(arch, target_root);
		let invocation = Invocation::new()
			.arg("--root")
			.arg(root)
			.arg("--is-installed")
			.last_arg(name);
		match self.runner.run(invocation)? {
			0 => Ok(true),
			1 => Ok(false),
			code => Err(Error::ToolFailed {
				tool: self.runner.tool().to_string(),
				code,
			}),
		}
	}

	// ----- queries -----------------------------------------------------

	/// Query control fields of an installed package.
	pub fn fields(
		&self,
		name: &str,
		fields: &[&str],
		arch: &str,
		target_root: Option<&Path>,
	) -> Result<ControlSection> {
		let root = self.config.target_arch_root(arch, target_root);
		let mut lines = Vec::new();
		let invocation = Invocation::new()
			.arg("--root")
			.arg(root)
			.arg("--field")
			.arg(name)
			.args(fields)
			.on_line(|line| lines.push(line.to_string()));
		self.runner.run_ok(invocation)?;
		ControlSection::parse(&lines.join("\n"))
	}

	/// Package metadata as a JSON object over a fixed field set.
	///
	/// Answers come from the md5-keyed cache whenever the artifact's
	/// sidecar hash is known and the descriptor was shown before; an
	/// unchanged artifact is never shown twice.
	pub fn show(&self, name: &str, arch: Option<&str>, options: &ShowOptions) -> Result<Value> {
		let distribution = self.distribution_or_default(options.distribution);
		let (file, hash) = match options.version {
			Some(version) => {
				let repository = self.config.deb_root_for(Some(distribution.as_str()));
				let file = self
					.archive
					.archived_deb(&repository, &distribution, name, version)?;
				let hash = read_md5_sidecar(&file)?;
				(file, hash)
			},
			None => {
				let debref =
					self.resolver
						.look_for_package(name, None, arch, Some(distribution.as_str()), None)?;
				(debref.file, debref.hash)
			},
		};

		if let Some(hash) = &hash {
			if let Some(value) = self.show_cache.borrow().get(hash) {
				debug!(name, "show served from cache");
				return Ok(value.clone());
			}
		}

		let mut stdout = String::new();
		let invocation = Invocation::new()
			.arg("--show")
			.arg("--showformat")
			.arg(show_format(&distribution))
			.last_arg(&file)
			.on_line(|line| {
				stdout.push_str(line);
				stdout.push('\n');
			});
		self.runner.run_ok(invocation)?;

		let value: Value = match serde_json::from_str(&stdout) {
			Ok(value) => value,
			Err(err) => return Err(Error::parse("show output", err)),
		};
		if let Some(hash) = hash {
			self.show_cache.borrow_mut().insert(hash, value.clone());
		}
		Ok(value)
	}

	/// List installed packages, optionally filtered by a tool pattern.
	pub fn list(
		&self,
		pattern: Option<&str>,
		arch: &str,
		target_root: Option<&Path>,
	) -> Result<Vec<String>> {
		let root = self.config.target_arch_root(arch, target_root);
		let mut lines = Vec::new();
		let mut invocation = Invocation::new()
			.arg("--root")
			.arg(root)
			.arg("--list")
			.on_line(|line| lines.push(line.to_string()));
		if let Some(pattern) = pattern {
			invocation = invocation.last_arg(pattern);
		}
		self.runner.run_ok(invocation)?;
		Ok(lines)
	}

	/// Search the target's file database.
	pub fn search(&self, pattern: &str, arch: &str, target_root: Option<&Path>) -> Result<Vec<String>> {
		let root = self.config.target_arch_root(arch, target_root);
		let mut lines = Vec::new();
		let invocation = Invocation::new()
			.arg("--root")
			.arg(root)
			.arg("--search")
			.last_arg(pattern)
			.on_line(|line| lines.push(line.to_string()));
		self.runner.run_ok(invocation)?;
		Ok(lines)
	}

	/// List the files an installed package owns.
	pub fn list_files(&self, name: &str, arch: &str, target_root: Option<&Path>) -> Result<Vec<String>> {
		let root = self.config.target_arch_root(arch, target_root);
		let mut lines = Vec::new();
		let invocation = Invocation::new()
			.arg("--root")
			.arg(root)
			.arg("--listfiles")
			.last_arg(name)
			.on_line(|line| lines.push(line.to_string()));
		self.runner.run_ok(invocation)?;
		Ok(lines)
	}

	// ----- target maintenance ------------------------------------------

	/// Remove an installed package from a target.
	pub fn remove(&self, name: &str, arch: &str, target_root: Option<&Path>) -> Result<()> {
		let root = self.config.target_arch_root(arch, target_root);
		self.runner.run_ok(
			Invocation::new()
				.arg("--root")
				.arg(root)
				.arg("--remove")
				.last_arg(name),
		)
	}

	/// Remove automatically installed packages nothing depends on.
	pub fn autoremove(&self, arch: &str, target_root: Option<&Path>) -> Result<()> {
		let root = self.config.target_arch_root(arch, target_root);
		self.runner
			.run_ok(Invocation::new().arg("--root").arg(root).arg("--autoremove"))
	}

	/// Change a package's selection state.
	pub fn set_selection(
		&self,
		name: &str,
		selection: Selection,
		arch: &str,
		target_root: Option<&Path>,
	) -> Result<()> {
		let root = self.config.target_arch_root(arch, target_root);
		self.runner.run_ok(
			Invocation::new()
				.arg("--root")
				.arg(root)
				.args(["--set-selection", selection.as_str()])
				.last_arg(name),
		)
	}

	/// Create the metadata database of a target architecture.
	///
	/// Renders the admindir control file into the temp directory, creates
	/// the target root, hands both to the tool, and finishes with an
	/// empty `sources.list` so later update/upgrade runs have one.
	pub fn create_admindir(
		&self,
		arch: &str,
		distribution: Option<&str>,
		target_root: Option<&Path>,
	) -> Result<()> {
		let distribution = self.distribution_or_default(distribution);
		let rendered = render_template(ADMINDIR_TEMPLATE, &[
			("ARCHITECTURE", arch),
			("MAINTAINER.NAME", self.config.maintainer_name.as_str()),
			("MAINTAINER.EMAIL", self.config.maintainer_email.as_str()),
			("DISTRIBUTION", distribution.as_str()),
		]);
		fs::create_dir_all(&self.config.temp_dir)?;
		let control_file = self.config.temp_dir.join("admindir.ctrl");
		fs::write(&control_file, rendered)?;

		let root = self.config.target_arch_root(arch, target_root);
		fs::create_dir_all(&root)?;
		self.runner.run_ok(
			Invocation::new()
				.arg("--root")
				.arg(&root)
				.arg("--create-admindir")
				.last_arg(&control_file),
		)?;

		let sources_list = self.config.sources_list(arch, target_root);
		if let Some(parent) = sources_list.parent() {
			fs::create_dir_all(parent)?;
		}
		if !sources_list.exists() {
			fs::write(&sources_list, "")?;
		}
		Ok(())
	}

	/// Register hook scripts with a target's database.
	pub fn add_hooks(&self, hooks: &[&Path], arch: &str, target_root: Option<&Path>) -> Result<()> {
		let root = self.config.target_arch_root(arch, target_root);
		self.runner.run_ok(
			Invocation::new()
				.arg("--root")
				.arg(root)
				.arg("--add-hooks")
				.args(hooks),
		)
	}

	/// Release a stale database lock left behind by a crashed tool run.
	pub fn remove_database_lock(&self, arch: &str, target_root: Option<&Path>) -> Result<()> {
		let root = self.config.target_arch_root(arch, target_root);
		self.runner.run_ok(
			Invocation::new()
				.arg("--root")
				.arg(root)
				.arg("--remove-database-lock"),
		)
	}

	// ----- sources -----------------------------------------------------

	/// Register a source repository with a target.
	///
	/// The sources list is read directly instead of going through the
	/// tool's listing command, which would take the database lock. An
	/// entry that is already present makes this a no-op.
	pub fn add_sources(&self, source: &str, arch: &str, target_root: Option<&Path>) -> Result<()> {
		let current = self.read_sources(arch, target_root)?;
		if current.iter().any(|line| line.trim() == source.trim()) {
			debug!(source, "source already registered");
			return Ok(());
		}
		let root = self.config.target_arch_root(arch, target_root);
		self.runner.run_ok(
			Invocation::new()
				.arg("--root")
				.arg(root)
				.arg("--add-sources")
				.last_arg(source),
		)
	}

	/// Unregister a source repository from a target.
	///
	/// The tool removes by 1-based line index; the index is computed from
	/// a direct read of the sources list. An absent entry is a no-op.
	pub fn remove_sources(&self, source: &str, arch: &str, target_root: Option<&Path>) -> Result<()> {
		let current = self.read_sources(arch, target_root)?;
		let Some(position) = current.iter().position(|line| line.trim() == source.trim()) else {
			debug!(source, "source not registered");
			return Ok(());
		};
		let root = self.config.target_arch_root(arch, target_root);
		self.runner.run_ok(
			Invocation::new()
				.arg("--root")
				.arg(root)
				.arg("--remove-sources")
				.arg((position + 1).to_string()),
		)
	}

	/// The registered source entries of a target, one per line.
	pub fn list_sources(&self, arch: &str, target_root: Option<&Path>) -> Result<Vec<String>> {
		Ok(self
			.read_sources(arch, target_root)?
			.into_iter()
			.filter(|line| !line.trim().is_empty())
			.collect())
	}

	fn read_sources(&self, arch: &str, target_root: Option<&Path>) -> Result<Vec<String>> {
		let path = self.config.sources_list(arch, target_root);
		match fs::read_to_string(&path) {
			Ok(text) => Ok(text.lines().map(str::to_string).collect()),
			Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
			Err(err) => Err(Error::Io(err)),
		}
	}

	/// Update the package lists of a target.
	pub fn update(&self, arch: &str, target_root: Option<&Path>) -> Result<()> {
		let root = self.config.target_arch_root(arch, target_root);
		self.runner
			.run_ok(Invocation::new().arg("--root").arg(root).arg("--update"))
	}

	/// Upgrade the installed packages of a target.
	pub fn upgrade(&self, arch: &str, target_root: Option<&Path>) -> Result<()> {
		let root = self.config.target_arch_root(arch, target_root);
		self.runner
			.run_ok(Invocation::new().arg("--root").arg(root).arg("--upgrade"))
	}

	// ----- publication -------------------------------------------------

	/// Copy an artifact from one repository into a distribution of
	/// another, then synchronize the destination.
	pub fn publish(
		&self,
		name: &str,
		arch: &str,
		in_repository: &Path,
		out_repository: Option<&Path>,
		distribution: &str,
	) -> Result<()> {
		if !in_repository.is_dir() {
			return Err(Error::RepositoryNotFound(in_repository.to_path_buf()));
		}
		let debref = self.resolver.look_for_package(
			name,
			None,
			Some(arch),
			Some(distribution),
			Some(in_repository),
		)?;

		let out = match out_repository {
			Some(out) => out.to_path_buf(),
			None => self.config.deb_root_for(Some(distribution)),
		};
		let dist_dir = out.join(distribution.trim_end_matches('/'));
		fs::create_dir_all(&dist_dir)?;

		let Some(file_name) = debref.file.file_name() else {
			return Err(Error::InvariantViolation(format!(
				"artifact of {name} has no file name"
			)));
		};
		fs::copy(&debref.file, dist_dir.join(file_name))?;
		copy_sidecar(&debref.file, &dist_dir.join(file_name));

		self.synchronizer.sync_repository(&out)
	}

	/// Delete an artifact from a repository's distribution.
	///
	/// Skipping the index update (`update_index = false`) avoids the full
	/// synchronization cycle when many removals are batched.
	pub fn unpublish(
		&self,
		name: &str,
		arch: &str,
		repository: Option<&Path>,
		distribution: &str,
		update_index: bool,
	) -> Result<()> {
		if let Some(repository) = repository {
			if !repository.is_dir() {
				return Err(Error::RepositoryNotFound(repository.to_path_buf()));
			}
		}
		let debref = self.resolver.look_for_package(
			name,
			None,
			Some(arch),
			Some(distribution),
			repository,
		)?;

		fs::remove_file(&debref.file)?;
		remove_sidecar_quiet(&debref.file);

		if update_index {
			self.synchronizer.sync_repository(&debref.repository)?;
		}
		Ok(())
	}

	/// Whether an artifact is present in a repository.
	pub fn is_published(
		&self,
		name: &str,
		version: Option<&str>,
		arch: &str,
		repository: Option<&Path>,
		distribution: Option<&str>,
	) -> Result<bool> {
		match self
			.resolver
			.look_for_package(name, version, Some(arch), distribution, repository)
		{
			Ok(_) => Ok(true),
			Err(Error::PackageNotFound(_)) => Ok(false),
			Err(err) => Err(err),
		}
	}

	/// Run the full index/archive cycle on a repository.
	pub fn sync_repository(&self, repository: &Path) -> Result<()> {
		self.synchronizer.sync_repository(repository)
	}

	// ----- graphing ----------------------------------------------------

	/// Render the dependency graph of the named packages.
	///
	/// Each name resolves against the given distribution first, then the
	/// default one. Without Graphviz `dot` on `PATH` the grapher is told
	/// to skip SVG rendering. Resolution failing for every name is an
	/// error rather than an empty graph.
	pub fn graph(&self, names: &[&str], arch: &str, distribution: Option<&str>) -> Result<()> {
		let mut debs = Vec::new();
		for name in names {
			let mut found = self
				.resolver
				.look_for_package(name, None, Some(arch), distribution, None);
			if distribution.is_some() {
				if let Err(Error::PackageNotFound(_)) = found {
					found = self.resolver.look_for_package(name, None, Some(arch), None, None);
				}
			}
			match found {
				Ok(debref) => debs.push(debref.file),
				Err(Error::PackageNotFound(_)) => {
					debug!(name, "not graphing unresolved package");
				},
				Err(err) => return Err(err),
			}
		}
		if debs.is_empty() {
			return Err(Error::PackageNotFound(names.join(", ")));
		}

		let mut invocation = Invocation::new();
		if which::which("dot").is_err() {
			invocation = invocation.arg("--skip-svg");
		}
		invocation = invocation
			.arg("--verbose")
			.arg("--root")
			.arg(self.config.target_arch_root(arch, None))
			.args(debs);
		self.grapher.run_ok(invocation)
	}

	// ----- archive queries ---------------------------------------------

	/// Absolute path of a package's artifact.
	///
	/// A pinned version reads from the archive; otherwise the live
	/// repositories are resolved.
	pub fn deb_location(
		&self,
		name: &str,
		arch: Option<&str>,
		version: Option<&str>,
		distribution: Option<&str>,
	) -> Result<PathBuf> {
		match version {
			Some(version) => {
				let distribution = self.distribution_or_default(distribution);
				let repository = self.config.deb_root_for(Some(distribution.as_str()));
				self.archive
					.archived_deb(&repository, &distribution, name, version)
			},
			None => {
				let debref = self
					.resolver
					.look_for_package(name, None, arch, distribution, None)?;
				Ok(debref.file)
			},
		}
	}

	/// Copy an archived artifact (and its sidecar) into a directory.
	///
	/// Deliberately does not synchronize: restoring a superseded version
	/// into a live distribution would only have the next sweep archive it
	/// again.
	pub fn copy_from_archiving(
		&self,
		name: &str,
		version: &str,
		distribution: &str,
		destination: &Path,
		repository: Option<&Path>,
	) -> Result<PathBuf> {
		let repo = match repository {
			Some(repo) => repo.to_path_buf(),
			None => self.config.deb_root_for(Some(distribution)),
		};
		let src = self
			.archive
			.archived_deb(&repo, distribution, name, version)?;
		let Some(file_name) = src.file_name() else {
			return Err(Error::InvariantViolation(format!(
				"archived artifact of {name} has no file name"
			)));
		};

		fs::create_dir_all(destination)?;
		let dst = destination.join(file_name);
		fs::copy(&src, &dst)?;
		copy_sidecar(&src, &dst);
		Ok(dst)
	}

	/// Relocate one distribution's archive sub-tree between repository
	/// parents. Nothing to move is not an error.
	pub fn move_archive(
		&self,
		distribution: &str,
		from_repository: &Path,
		to_repository: &Path,
	) -> Result<()> {
		let distribution = distribution.trim_end_matches('/');
		let src = archive_root(from_repository).join(distribution);
		if !src.exists() {
			debug!(archive = %src.display(), "no archive to move");
			return Ok(());
		}
		let dst_root = archive_root(to_repository);
		fs::create_dir_all(&dst_root)?;
		fs::rename(&src, dst_root.join(distribution))?;
		Ok(())
	}

	/// Every archived version of a package, in catalog order.
	pub fn list_archive_versions(
		&self,
		name: &str,
		distribution: &str,
		repository: Option<&Path>,
	) -> Result<Vec<String>> {
		let repo = match repository {
			Some(repo) => repo.to_path_buf(),
			None => self.config.deb_root_for(Some(distribution)),
		};
		Ok(self.archive.catalog(&repo, distribution, name)?.all_versions())
	}

	/// The greatest archived version of a package.
	pub fn archive_latest_version(
		&self,
		name: &str,
		distribution: &str,
		repository: Option<&Path>,
	) -> Result<Option<String>> {
		let repo = match repository {
			Some(repo) => repo.to_path_buf(),
			None => self.config.deb_root_for(Some(distribution)),
		};
		Ok(self
			.archive
			.catalog(&repo, distribution, name)?
			.latest_version()
			.map(str::to_string))
	}

	// ----- odds and ends -----------------------------------------------

	/// Whether a target architecture has a metadata database.
	pub fn target_exists(&self, arch: &str, target_root: Option<&Path>) -> bool {
		self.config
			.target_arch_root(arch, target_root)
			.join("var/lib")
			.join(&self.config.admindir)
			.is_dir()
	}

	/// Strict `v1 > v2` under the tool's version ordering.
	pub fn is_v1_greater(&self, v1: &str, v2: &str) -> Result<bool> {
		self.order.is_greater(v1, v2)
	}

	fn distribution_or_default(&self, distribution: Option<&str>) -> String {
		distribution
			.unwrap_or(&self.config.distribution)
			.trim_end_matches('/')
			.to_string()
	}
}

impl Orchestrator {
	/// Find the best artifact for a package; see
	/// [`Resolver::look_for_package`].
	pub fn look_for_package(
		&self,
		name: &str,
		version: Option<&str>,
		arch: Option<&str>,
		distribution: Option<&str>,
		repository: Option<&Path>,
	) -> Result<DebRef> {
		self.resolver
			.look_for_package(name, version, arch, distribution, repository)
	}
}

/// The architecture encoded as the second-to-last path component.
fn path_arch(package_path: &Path) -> Result<String> {
	let mut components = package_path.components().rev();
	components.next();
	match components.next() {
		Some(component) => Ok(component.as_os_str().to_string_lossy().into_owned()),
		None => Err(Error::parse(
			"package path",
			format!("{} has no architecture component", package_path.display()),
		)),
	}
}

fn has_entries(dir: &Path) -> Result<bool> {
	match fs::read_dir(dir) {
		Ok(mut read) => Ok(read.next().is_some()),
		Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
		Err(err) => Err(Error::Io(err)),
	}
}

/// Best-effort copy of an artifact's `.md5sum` sidecar.
fn copy_sidecar(src: &Path, dst: &Path) {
	let src_sidecar = crate::util::sidecar_path(src);
	let dst_sidecar = crate::util::sidecar_path(dst);
	if let Err(err) = fs::copy(&src_sidecar, &dst_sidecar) {
		if err.kind() != io::ErrorKind::NotFound {
			debug!(sidecar = %src_sidecar.display(), "unable to copy sidecar: {err}");
		}
	}
}

fn remove_sidecar_quiet(file: &Path) {
	let sidecar = crate::util::sidecar_path(file);
	if let Err(err) = fs::remove_file(&sidecar) {
		if err.kind() != io::ErrorKind::NotFound {
			debug!(sidecar = %sidecar.display(), "unable to remove sidecar: {err}");
		}
	}
}

/// The JSON showformat template over the fixed metadata field set.
///
/// The per-distribution packages field is dynamic and rendered from the
/// caller's distribution exactly as given.
fn show_format(distribution: &str) -> String {
	let dynamic = format!("X-Craft-Packages-{distribution}");
	let fields = [
		"Architecture",
		"Build-Depends",
		"Date",
		"Depends",
		"Distribution",
		"Package",
		"Version",
		"X-Craft-Build-Depends",
		"X-Craft-Make-Depends",
		dynamic.as_str(),
		"X-Craft-Sub-Packages",
	];
	let parts: Vec<String> = fields
		.iter()
		.map(|field| format!("\"{field}\": \"${{{field}}}\""))
		.collect();
	format!("{{{}}}", parts.join(", "))
}
