//! Contains the version-ordering seam and small filesystem helpers.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Error, Result};
use crate::runner::{Invocation, ToolRunner};

/// Strict Debian version ordering.
///
/// Version arithmetic is never implemented locally; everything that picks
/// a "latest" defers to this trait, and the production implementation
/// defers in turn to the packaging tool. Two versions compare through the
/// strict `>` relation only.
pub trait VersionOrder {
	/// Whether `v1` sorts strictly greater than `v2`.
	fn is_greater(&self, v1: &str, v2: &str) -> Result<bool>;
}

/// Comparator backed by the packaging tool's `--compare-versions`.
pub struct ToolVersionOrder {
	runner: Rc<ToolRunner>,
}

impl ToolVersionOrder {
	pub fn new(runner: Rc<ToolRunner>) -> ToolVersionOrder { ToolVersionOrder { runner } }
}

impl VersionOrder for ToolVersionOrder {
	fn is_greater(&self, v1: &str, v2: &str) -> Result<bool> {
		let invocation = Invocation::new().args(["--compare-versions", v1, ">", v2]);
		match self.runner.run(invocation)? {
			0 => Ok(true),
			1 => Ok(false),
			code => Err(Error::ToolFailed {
				tool: self.runner.tool().to_string(),
				code,
			}),
		}
	}
}

/// The version with any trailing `-<suffix>` removed.
///
/// # Example:
/// ```
/// use wpkg_repo::util::base_version;
///
/// assert_eq!(base_version("1.0-2"), "1.0");
/// assert_eq!(base_version("1.0-rc1-2"), "1.0-rc1");
/// assert_eq!(base_version("0.9"), "0.9");
/// ```
pub fn base_version(version: &str) -> &str {
	match version.rsplit_once('-') {
		Some((base, _)) => base,
		None => version,
	}
}

/// Path of the `.md5sum` sidecar next to an artifact.
pub(crate) fn sidecar_path(file: &Path) -> PathBuf {
	let mut os = file.as_os_str().to_os_string();
	os.push(".md5sum");
	PathBuf::from(os)
}

/// Read the md5 recorded in an artifact's sidecar file.
///
/// A missing sidecar is benign and reported as `None`; every other read
/// failure surfaces. The first whitespace-separated token is the hash,
/// matching the `<md5>  <filename>` layout the tool writes.
pub(crate) fn read_md5_sidecar(file: &Path) -> Result<Option<String>> {
	let sidecar = sidecar_path(file);
	let text = match fs::read_to_string(&sidecar) {
		Ok(text) => text,
		Err(err) if err.kind() == io::ErrorKind::NotFound => {
			debug!(sidecar = %sidecar.display(), "no md5 sidecar");
			return Ok(None);
		},
		Err(err) => return Err(Error::Io(err)),
	};
	Ok(text.split_whitespace().next().map(str::to_string))
}

/// md5 of a file's bytes, as lowercase hex.
pub(crate) fn file_md5(path: &Path) -> Result<String> {
	let bytes = fs::read(path)?;
	Ok(format!("{:x}", md5::compute(bytes)))
}

/// SHA-256 of a byte slice, as lowercase hex.
pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
	let digest = Sha256::digest(bytes);
	let mut hex = String::with_capacity(digest.len() * 2);
	for byte in digest {
		hex.push_str(&format!("{byte:02x}"));
	}
	hex
}
