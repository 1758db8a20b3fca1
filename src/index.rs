//! Contains the repository-index parser and its filter model.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::cache::{BoundedCache, INDEX_CACHE_CAP};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::runner::{Invocation, ToolRunner};
use crate::util::{VersionOrder, sha256_hex};

/// One package entry decoded from a repository index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
	pub name: String,
	pub version: String,
	/// `None` for source packages.
	pub arch: Option<String>,
	/// Distribution sub-directory the artifact lives in, when encoded in
	/// the index.
	pub distrib: Option<String>,
	/// The control data's `Distribution` field, verbatim.
	pub ctrl_distribution: Option<String>,
	/// Artifact path relative to the repository root.
	pub file: PathBuf,
}

/// A single filter predicate over one entry attribute.
///
/// A plain string is an anchored literal: the whole value must equal it.
/// Anything more selective is a compiled regular expression. Both forms
/// are accepted everywhere a filter is, which keeps name, arch and
/// distribution matching uniform.
#[derive(Clone, Debug)]
pub enum Pattern {
	Literal(String),
	Regex(Regex),
}

impl Pattern {
	pub fn literal(value: impl Into<String>) -> Pattern { Pattern::Literal(value.into()) }

	pub fn regex(pattern: &str) -> Result<Pattern> {
		match Regex::new(pattern) {
			Ok(re) => Ok(Pattern::Regex(re)),
			Err(err) => Err(Error::parse("filter pattern", err)),
		}
	}

	pub fn matches(&self, value: &str) -> bool {
		match self {
			Pattern::Literal(literal) => literal == value,
			Pattern::Regex(re) => re.is_match(value),
		}
	}
}

/// Attribute filters applied to index entries.
///
/// An attribute the entry does not carry is unconstrained: a source
/// package has no architecture and passes any `arch` filter, which is what
/// lets the resolver find `-src` packages under an architecture-filtered
/// lookup.
#[derive(Clone, Debug, Default)]
pub struct Filters {
	pub name: Option<Pattern>,
	pub version: Option<Pattern>,
	pub arch: Option<Pattern>,
	pub distrib: Option<Pattern>,
}

impl Filters {
	pub fn matches(&self, entry: &IndexEntry) -> bool {
		fn check(pattern: &Option<Pattern>, value: Option<&str>) -> bool {
			match (pattern, value) {
				(None, _) => true,
				(Some(_), None) => true,
				(Some(pattern), Some(value)) => pattern.matches(value),
			}
		}

		check(&self.name, Some(&entry.name))
			&& check(&self.version, Some(&entry.version))
			&& check(&self.arch, entry.arch.as_deref())
			&& check(&self.distrib, entry.distrib.as_deref())
	}
}

/// Macro to build a [`Filters`] value from field/pattern pairs.
///
/// ```
/// use wpkg_repo::filters;
/// use wpkg_repo::index::Pattern;
///
/// let filters = filters! {
///     name: Pattern::literal("libx"),
///     arch: Pattern::regex("^(?:amd64|all)$").unwrap(),
/// };
/// assert!(filters.version.is_none());
/// ```
#[macro_export]
macro_rules! filters {
	($($field:ident: $pattern:expr),* $(,)?) => {{
		let mut filters = $crate::index::Filters::default();
		$(filters.$field = Some($pattern);)*
		filters
	}};
}

/// Index listing of one repository: package name to its matching entries.
#[derive(Clone, Debug)]
pub struct RepoIndex {
	pub repository: PathBuf,
	pub packages: BTreeMap<String, Vec<IndexEntry>>,
}

impl RepoIndex {
	/// First entry for a package, the only one in `greater` mode.
	pub fn first(&self, name: &str) -> Option<&IndexEntry> {
		self.packages.get(name).and_then(|entries| entries.first())
	}

	/// The entry for an exact (name, version) pair.
	pub fn entry(&self, name: &str, version: &str) -> Option<&IndexEntry> {
		self.packages
			.get(name)?
			.iter()
			.find(|entry| entry.version == version)
	}
}

/// Drives the tool's JSON index dump and shapes it into [`IndexEntry`]s.
///
/// Parsed snapshots are cached by the SHA-256 of the index file bytes, so
/// repeated queries against an unchanged repository never re-spawn the
/// tool.
pub struct IndexParser {
	runner: Rc<ToolRunner>,
	order: Rc<dyn VersionOrder>,
	config: Rc<Config>,
	cache: RefCell<BoundedCache<Vec<IndexEntry>>>,
}

impl IndexParser {
	pub fn new(
		runner: Rc<ToolRunner>,
		order: Rc<dyn VersionOrder>,
		config: Rc<Config>,
	) -> IndexParser {
		IndexParser {
			runner,
			order,
			config,
			cache: RefCell::new(BoundedCache::new(INDEX_CACHE_CAP)),
		}
	}

	/// List the packages of each repository, filtered.
	///
	/// Repositories without an index file are silently omitted; the
	/// result keeps the probe order of `repositories`. With `greater`
	/// set, each package collapses to its single greatest version.
	pub fn list_index_packages(
		&self,
		repositories: &[PathBuf],
		arch: Option<&str>,
		filters: &Filters,
		greater: bool,
	) -> Result<Vec<RepoIndex>> {
		let mut indexes = Vec::new();
		for repository in repositories {
			let Some(entries) = self.snapshot(repository, arch)? else {
				continue;
			};

			let mut packages: BTreeMap<String, Vec<IndexEntry>> = BTreeMap::new();
			for entry in entries {
				if filters.matches(&entry) {
					packages.entry(entry.name.clone()).or_default().push(entry);
				}
			}

			if greater {
				for entries in packages.values_mut() {
					self.collapse_to_greatest(entries)?;
				}
			}

			indexes.push(RepoIndex {
				repository: repository.clone(),
				packages,
			});
		}
		Ok(indexes)
	}

	/// All entries of one repository index, through the content cache.
	fn snapshot(&self, repository: &Path, arch: Option<&str>) -> Result<Option<Vec<IndexEntry>>> {
		let index_path = repository.join(&self.config.index_filename);
		let bytes = match fs::read(&index_path) {
			Ok(bytes) => bytes,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
				debug!(repository = %repository.display(), "no index file");
				return Ok(None);
			},
			Err(err) => return Err(Error::Io(err)),
		};

		let key = sha256_hex(&bytes);
		if let Some(entries) = self.cache.borrow().get(&key) {
			return Ok(Some(entries.clone()));
		}

		let mut stdout = String::new();
		let mut invocation = Invocation::new()
			.arg("--list-index-packages-json")
			.last_arg(&index_path)
			.on_line(|line| {
				stdout.push_str(line);
				stdout.push('\n');
			});
		if let Some(arch) = arch {
			let root = self.config.target_arch_root(arch, None);
			if root.is_dir() {
				invocation = invocation.arg("--root").arg(root);
			}
		}
		self.runner.run_ok(invocation)?;

		let repaired = repair_json_backslashes(&stdout);
		let dump: Value = match serde_json::from_str(&repaired) {
			Ok(dump) => dump,
			Err(err) => return Err(Error::parse("index dump", err)),
		};
		let entries = shape_entries(&dump)?;
		self.cache.borrow_mut().insert(key, entries.clone());
		Ok(Some(entries))
	}

	/// Reduce `entries` to the one with the maximum version.
	fn collapse_to_greatest(&self, entries: &mut Vec<IndexEntry>) -> Result<()> {
		let mut greatest: Option<IndexEntry> = None;
		for entry in entries.drain(..) {
			greatest = Some(match greatest.take() {
				None => entry,
				Some(current) => {
					if self.order.is_greater(&entry.version, &current.version)? {
						entry
					} else {
						current
					}
				},
			});
		}
		entries.extend(greatest);
		Ok(())
	}
}

/// Shape the tool's JSON dump into entries.
///
/// The dump is keyed by `<distrib>/<name>_<version>[_<arch>].ctrl`; the
/// distribution prefix and the architecture suffix are both optional, and
/// an `Architecture` of `source` clears the architecture.
fn shape_entries(dump: &Value) -> Result<Vec<IndexEntry>> {
	let Some(object) = dump.as_object() else {
		return Err(Error::parse("index dump", "top-level value is not an object"));
	};

	let mut entries = Vec::with_capacity(object.len());
	for (key, value) in object {
		let Some(captures) = ctrl_name_re().captures(key) else {
			debug!(key = %key, "skipping unrecognized index entry");
			continue;
		};

		let distrib = captures.get(1).map(|m| m.as_str().to_string());
		let name = captures[2].to_string();
		let version = captures[3].to_string();
		let mut arch = captures.get(4).map(|m| m.as_str().to_string());
		if value.get("Architecture").and_then(Value::as_str) == Some("source") {
			arch = None;
		}
		let ctrl_distribution = value
			.get("Distribution")
			.and_then(Value::as_str)
			.map(str::to_string);

		let mut file = String::new();
		if let Some(distrib) = &distrib {
			file.push_str(distrib);
			file.push('/');
		}
		file.push_str(&name);
		file.push('_');
		file.push_str(&version);
		if let Some(arch) = &arch {
			file.push('_');
			file.push_str(arch);
		}
		file.push_str(".deb");

		entries.push(IndexEntry {
			name,
			version,
			arch,
			distrib,
			ctrl_distribution,
			file: PathBuf::from(file),
		});
	}
	Ok(entries)
}

/// Repair the lone backslashes the tool emits on Windows, which would
/// otherwise break the JSON parse.
pub fn repair_json_backslashes(text: &str) -> String {
	static RE: OnceLock<Regex> = OnceLock::new();
	let re = RE.get_or_init(|| {
		Regex::new(r"(^|[^\\])\\([^\\]|$)").expect("backslash repair pattern is valid")
	});
	re.replace_all(text, "${1}\\\\${2}").into_owned()
}

fn ctrl_name_re() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(r"^(?:([^/]+)/)?([^ _/]+)_([^ _/]+)(?:_([^ _/]+))?\.ctrl$")
			.expect("ctrl name pattern is valid")
	})
}

/// Create or refresh the index of a repository directory.
pub(crate) fn create_index(runner: &ToolRunner, config: &Config, repository: &Path) -> Result<()> {
	runner.run_ok(
		Invocation::new()
			.arg("--create-index")
			.arg(repository.join(&config.index_filename))
			.arg("--repository")
			.arg(repository)
			.args(["--recursive", "--depth", "1"]),
	)
}
