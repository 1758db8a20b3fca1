//! Contains the two-pass index/archive cycle run after every mutation.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use tracing::debug;

use crate::archive::ArchiveManager;
use crate::config::Config;
use crate::error::Result;
use crate::index;
use crate::runner::ToolRunner;

/// Re-indexes a repository around an archival sweep of every distribution.
pub struct RepositorySynchronizer {
	runner: Rc<ToolRunner>,
	config: Rc<Config>,
	archive: Rc<ArchiveManager>,
}

impl RepositorySynchronizer {
	pub fn new(
		runner: Rc<ToolRunner>,
		config: Rc<Config>,
		archive: Rc<ArchiveManager>,
	) -> RepositorySynchronizer {
		RepositorySynchronizer {
			runner,
			config,
			archive,
		}
	}

	/// Bring a repository's index and archive up to date.
	///
	/// The index is refreshed before the sweep, so artifacts added since
	/// the last cycle are visible to the archiver, and refreshed again
	/// strictly after every archival movement has completed. A missing or
	/// empty repository is not an error; any `ENOENT` in the chain ends
	/// the cycle silently.
	pub fn sync_repository(&self, repository: &Path) -> Result<()> {
		match self.run_cycle(repository) {
			Err(err) if err.is_not_found_io() => {
				debug!(repository = %repository.display(), "nothing to synchronize");
				Ok(())
			},
			result => result,
		}
	}

	fn run_cycle(&self, repository: &Path) -> Result<()> {
		let mut distributions = Vec::new();
		for entry in fs::read_dir(repository)? {
			let entry = entry?;
			if entry.file_type()?.is_dir() {
				distributions.push(entry.file_name().to_string_lossy().into_owned());
			}
		}
		distributions.sort();

		index::create_index(&self.runner, &self.config, repository)?;
		for distribution in &distributions {
			self.archive.archive_distribution(repository, distribution)?;
		}
		index::create_index(&self.runner, &self.config, repository)
	}
}
