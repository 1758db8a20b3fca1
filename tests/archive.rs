mod archive {
	use std::collections::BTreeMap;
	use std::fs;
	use std::os::unix::fs::PermissionsExt;
	use std::path::{Path, PathBuf};
	use std::rc::Rc;

	use serde_json::json;
	use wpkg_repo::archive::{ArchiveCatalog, archive_root};
	use wpkg_repo::util::VersionOrder;
	use wpkg_repo::{Config, Orchestrator};

	struct StubOrder;

	impl VersionOrder for StubOrder {
		fn is_greater(&self, v1: &str, v2: &str) -> wpkg_repo::Result<bool> {
			fn key(version: &str) -> Vec<u64> {
				version
					.split(['.', '-', ':'])
					.map(|part| part.parse().unwrap_or(0))
					.collect()
			}
			Ok(key(v1) > key(v2))
		}
	}

	/// An orchestrator whose packaging tool is a no-op; index creation
	/// succeeds without writing anything, which is all the sweep needs.
	fn orchestrator(dir: &Path) -> (Orchestrator, PathBuf) {
		let repository = dir.join("repo");
		fs::create_dir_all(&repository).unwrap();

		let mut config = Config::default()
			.deb_root(&repository)
			.pkg_tool("true".to_string());
		config.temp_dir = dir.join("tmp");

		let wpkg = Orchestrator::with_version_order(config, Rc::new(StubOrder));
		(wpkg, repository)
	}

	fn seed(repository: &Path, distribution: &str, file: &str, bytes: &[u8]) {
		let dir = repository.join(distribution);
		fs::create_dir_all(&dir).unwrap();
		fs::write(dir.join(file), bytes).unwrap();
	}

	/// Walk a tree into (relative path, bytes) pairs.
	fn tree_snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
		fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
			for entry in fs::read_dir(dir).unwrap() {
				let entry = entry.unwrap();
				let path = entry.path();
				if path.is_dir() {
					walk(root, &path, out);
				} else {
					let rel = path.strip_prefix(root).unwrap().to_path_buf();
					out.insert(rel, fs::read(&path).unwrap());
				}
			}
		}
		let mut out = BTreeMap::new();
		if root.exists() {
			walk(root, root, &mut out);
		}
		out
	}

	#[test]
	fn collapses_a_distribution_to_the_greatest_version() {
		let dir = tempfile::tempdir().unwrap();
		let (wpkg, repository) = orchestrator(dir.path());

		seed(&repository, "foo", "pkg_1.0-1_amd64.deb", b"one");
		seed(&repository, "foo", "pkg_1.0-2_amd64.deb", b"two");
		seed(&repository, "foo", "pkg_0.9_amd64.deb", b"zero");

		wpkg.sync_repository(&repository).unwrap();

		// Only the winner stays live.
		let live: Vec<_> = fs::read_dir(repository.join("foo"))
			.unwrap()
			.map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
			.collect();
		assert_eq!(live, vec!["pkg_1.0-2_amd64.deb"]);

		// Losers moved, byte for byte; the winner is back-linked as a copy.
		let archive = archive_root(&repository);
		assert_eq!(
			fs::read(archive.join("foo/pkg/1.0-1/pkg_1.0-1_amd64.deb")).unwrap(),
			b"one"
		);
		assert_eq!(
			fs::read(archive.join("foo/pkg/0.9/pkg_0.9_amd64.deb")).unwrap(),
			b"zero"
		);
		assert_eq!(
			fs::read(archive.join("foo/pkg/1.0-2/pkg_1.0-2_amd64.deb")).unwrap(),
			b"two"
		);

		let catalog: serde_json::Value = serde_json::from_str(
			&fs::read_to_string(archive.join("foo/pkg/index.json")).unwrap(),
		)
		.unwrap();
		assert_eq!(
			catalog,
			json!({
				"0.9": {"latest": "0.9", "versions": ["0.9"]},
				"1.0": {"latest": "1.0-2", "versions": ["1.0-1", "1.0-2"]},
				"latest": "1.0",
			})
		);
	}

	#[test]
	fn synchronizing_twice_changes_nothing() {
		let dir = tempfile::tempdir().unwrap();
		let (wpkg, repository) = orchestrator(dir.path());

		seed(&repository, "foo", "pkg_1.0-1_amd64.deb", b"one");
		seed(&repository, "foo", "pkg_1.0-2_amd64.deb", b"two");
		seed(&repository, "foo", "lib_3.1_amd64.deb", b"lib");

		wpkg.sync_repository(&repository).unwrap();
		let first = (
			tree_snapshot(&repository),
			tree_snapshot(&archive_root(&repository)),
		);

		wpkg.sync_repository(&repository).unwrap();
		let second = (
			tree_snapshot(&repository),
			tree_snapshot(&archive_root(&repository)),
		);
		assert_eq!(first, second);
	}

	#[test]
	fn single_version_packages_are_left_alone() {
		let dir = tempfile::tempdir().unwrap();
		let (wpkg, repository) = orchestrator(dir.path());

		seed(&repository, "foo", "lib_3.1_amd64.deb", b"lib");
		wpkg.sync_repository(&repository).unwrap();

		assert!(repository.join("foo/lib_3.1_amd64.deb").exists());
		assert!(!archive_root(&repository).join("foo/lib").exists());
	}

	#[test]
	fn stub_packages_are_skipped() {
		let dir = tempfile::tempdir().unwrap();
		let (wpkg, repository) = orchestrator(dir.path());

		seed(&repository, "foo", "pkg-stub_1.0_amd64.deb", b"a");
		seed(&repository, "foo", "pkg-stub_2.0_amd64.deb", b"b");
		wpkg.sync_repository(&repository).unwrap();

		assert!(repository.join("foo/pkg-stub_1.0_amd64.deb").exists());
		assert!(repository.join("foo/pkg-stub_2.0_amd64.deb").exists());
	}

	#[test]
	fn sidecars_travel_with_their_artifact() {
		let dir = tempfile::tempdir().unwrap();
		let (wpkg, repository) = orchestrator(dir.path());

		seed(&repository, "foo", "pkg_1.0-1_amd64.deb", b"one");
		seed(&repository, "foo", "pkg_1.0-1_amd64.deb.md5sum", b"aa  pkg_1.0-1_amd64.deb");
		seed(&repository, "foo", "pkg_1.0-2_amd64.deb", b"two");

		wpkg.sync_repository(&repository).unwrap();

		let archived = archive_root(&repository).join("foo/pkg/1.0-1/pkg_1.0-1_amd64.deb.md5sum");
		assert_eq!(fs::read(archived).unwrap(), b"aa  pkg_1.0-1_amd64.deb");
		assert!(!repository.join("foo/pkg_1.0-1_amd64.deb.md5sum").exists());
	}

	#[test]
	fn identical_archived_copy_drops_the_source() {
		let dir = tempfile::tempdir().unwrap();
		let (wpkg, repository) = orchestrator(dir.path());

		seed(&repository, "foo", "pkg_1.0-1_amd64.deb", b"same");
		seed(&repository, "foo", "pkg_1.0-2_amd64.deb", b"two");
		let prior = archive_root(&repository).join("foo/pkg/1.0-1");
		fs::create_dir_all(&prior).unwrap();
		fs::write(prior.join("pkg_1.0-1_amd64.deb"), b"same").unwrap();

		wpkg.sync_repository(&repository).unwrap();

		assert!(!repository.join("foo/pkg_1.0-1_amd64.deb").exists());
		assert_eq!(fs::read(prior.join("pkg_1.0-1_amd64.deb")).unwrap(), b"same");
	}

	#[test]
	fn differing_archived_copy_is_overwritten() {
		let dir = tempfile::tempdir().unwrap();
		let (wpkg, repository) = orchestrator(dir.path());

		seed(&repository, "foo", "pkg_1.0-1_amd64.deb", b"rebuilt");
		seed(&repository, "foo", "pkg_1.0-2_amd64.deb", b"two");
		let prior = archive_root(&repository).join("foo/pkg/1.0-1");
		fs::create_dir_all(&prior).unwrap();
		fs::write(prior.join("pkg_1.0-1_amd64.deb"), b"stale").unwrap();

		wpkg.sync_repository(&repository).unwrap();

		assert_eq!(
			fs::read(prior.join("pkg_1.0-1_amd64.deb")).unwrap(),
			b"rebuilt"
		);
	}

	#[test]
	fn specialized_distribution_redirects_the_destination() {
		let dir = tempfile::tempdir().unwrap();
		let repository = dir.path().join("repo");
		fs::create_dir_all(&repository).unwrap();
		fs::write(repository.join("index.tar.gz"), b"index").unwrap();

		let dump = json!({
			"foo/pkg_1.0-1_amd64.ctrl": {"Architecture": "amd64", "Distribution": "foo+special"},
			"foo/pkg_1.0-2_amd64.ctrl": {"Architecture": "amd64", "Distribution": "foo"},
		});
		let dump_file = dir.path().join("dump.json");
		fs::write(&dump_file, serde_json::to_vec(&dump).unwrap()).unwrap();

		let tool = dir.path().join("wpkg-stub");
		fs::write(
			&tool,
			format!(
				"#!/bin/sh\ncase \"$*\" in\n*--list-index-packages-json*) cat \"{}\" ;;\nesac\nexit 0\n",
				dump_file.display()
			),
		)
		.unwrap();
		let mut perms = fs::metadata(&tool).unwrap().permissions();
		perms.set_mode(0o755);
		fs::set_permissions(&tool, perms).unwrap();

		let mut config = Config::default()
			.deb_root(&repository)
			.pkg_tool(tool.to_string_lossy().into_owned());
		config.temp_dir = dir.path().join("tmp");
		let wpkg = Orchestrator::with_version_order(config, Rc::new(StubOrder));

		seed(&repository, "foo", "pkg_1.0-1_amd64.deb", b"one");
		seed(&repository, "foo", "pkg_1.0-2_amd64.deb", b"two");
		wpkg.sync_repository(&repository).unwrap();

		let archive = archive_root(&repository);
		// The loser's control data names a specialized distribution.
		assert!(archive.join("foo+special/pkg/1.0-1/pkg_1.0-1_amd64.deb").exists());
		assert!(archive.join("foo/pkg/1.0-2/pkg_1.0-2_amd64.deb").exists());
	}

	#[test]
	fn catalog_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("index.json");

		let mut catalog = ArchiveCatalog::default();
		catalog.bases.insert(
			"1.0".to_string(),
			wpkg_repo::archive::BaseEntry {
				latest: "1.0-2".to_string(),
				versions: vec!["1.0-1".to_string(), "1.0-2".to_string()],
			},
		);
		catalog.latest = Some("1.0".to_string());
		catalog.save(&path).unwrap();

		let loaded = ArchiveCatalog::load(&path).unwrap();
		assert_eq!(loaded, catalog);
		assert_eq!(loaded.latest_version(), Some("1.0-2"));
		assert_eq!(loaded.all_versions(), vec!["1.0-1", "1.0-2"]);
	}

	#[test]
	fn absent_catalog_is_empty() {
		let dir = tempfile::tempdir().unwrap();
		let loaded = ArchiveCatalog::load(&dir.path().join("index.json")).unwrap();
		assert_eq!(loaded, ArchiveCatalog::default());
		assert_eq!(loaded.latest_version(), None);
	}
}
