//! Contains the crate-wide error type.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Alias used by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds surfaced at the operation boundary.
///
/// Operations pass these up verbatim; there is no automatic retry anywhere
/// in this crate. Callers match on the variant to decide whether a failure
/// is recoverable user input ([`Error::PackageNotFound`]) or a sign of
/// external interference ([`Error::InvariantViolation`]).
#[derive(Debug)]
pub enum Error {
	/// An explicitly requested repository root does not exist.
	RepositoryNotFound(PathBuf),
	/// No artifact matched the requested name, version and architecture.
	PackageNotFound(String),
	/// A whole-repository source build found no source packages.
	NothingToBuild(PathBuf),
	/// The external tool exited with a non-zero status.
	ToolFailed { tool: String, code: i32 },
	/// Repository or archive state contradicts what the archiver relies on.
	InvariantViolation(String),
	/// Malformed JSON or control text coming back from the external tool.
	Parse { context: String, detail: String },
	/// Filesystem failure other than the benign cases handled in place.
	Io(io::Error),
}

impl Error {
	pub(crate) fn parse(context: &str, detail: impl fmt::Display) -> Error {
		Error::Parse {
			context: context.to_string(),
			detail: detail.to_string(),
		}
	}

	/// Whether this failure is a plain `ENOENT` from the filesystem.
	///
	/// The synchronizer uses this to treat an empty or missing repository
	/// as "nothing to do" rather than an error.
	pub fn is_not_found_io(&self) -> bool {
		matches!(self, Error::Io(err) if err.kind() == io::ErrorKind::NotFound)
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::RepositoryNotFound(path) => {
				write!(f, "repository not found: {}", path.display())
			},
			Error::PackageNotFound(what) => write!(f, "package not found: {what}"),
			Error::NothingToBuild(path) => write!(f, "nothing to build in {}", path.display()),
			Error::ToolFailed { tool, code } => write!(f, "{tool} exited with code {code}"),
			Error::InvariantViolation(msg) => write!(f, "{msg}"),
			Error::Parse { context, detail } => {
				write!(f, "unable to parse {context}: {detail}")
			},
			Error::Io(err) => write!(f, "{err}"),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(err) => Some(err),
			_ => None,
		}
	}
}

impl From<io::Error> for Error {
	fn from(err: io::Error) -> Error { Error::Io(err) }
}
