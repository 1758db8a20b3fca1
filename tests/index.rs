mod index {
	use std::fs;
	use std::os::unix::fs::PermissionsExt;
	use std::path::{Path, PathBuf};
	use std::rc::Rc;

	use serde_json::json;
	use wpkg_repo::config::Config;
	use wpkg_repo::filters;
	use wpkg_repo::index::{Filters, IndexParser, Pattern, repair_json_backslashes};
	use wpkg_repo::runner::ToolRunner;
	use wpkg_repo::util::VersionOrder;

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

	fn write_script(path: &Path, body: &str) {
		fs::write(path, body).unwrap();
		let mut perms = fs::metadata(path).unwrap().permissions();
		perms.set_mode(0o755);
		fs::set_permissions(path, perms).unwrap();
	}

	/// A parser over one scratch repository served by a stub tool.
	fn scratch_parser(dir: &Path) -> (IndexParser, PathBuf, PathBuf) {
		let repository = dir.join("repo");
		fs::create_dir_all(&repository).unwrap();
		fs::write(repository.join("index.tar.gz"), b"index-one").unwrap();

		let dump = json!({
			"foo/pkg_1.0-1_amd64.ctrl": {"Architecture": "amd64", "Distribution": "foo"},
			"foo/pkg_1.0-2_amd64.ctrl": {"Architecture": "amd64", "Distribution": "foo"},
			"foo/other_2.0_all.ctrl": {"Architecture": "all"},
			"sources/pkg-src_1.0-2.ctrl": {"Architecture": "source", "Distribution": "sources"},
		});
		let dump_file = dir.join("dump.json");
		fs::write(&dump_file, serde_json::to_vec(&dump).unwrap()).unwrap();

		let log = dir.join("calls.log");
		let tool = dir.join("wpkg-stub");
		write_script(
			&tool,
			&format!(
				"#!/bin/sh\necho \"$@\" >> \"{}\"\ncase \"$*\" in\n\
				 *--list-index-packages-json*) cat \"{}\" ;;\nesac\nexit 0\n",
				log.display(),
				dump_file.display()
			),
		);

		let mut config = Config::default().pkg_tool(tool.to_string_lossy().into_owned());
		config.temp_dir = dir.join("tmp");
		let config = Rc::new(config);
		let runner = Rc::new(ToolRunner::packaging(&config));
		let parser = IndexParser::new(runner, Rc::new(StubOrder), config);
		(parser, repository, log)
	}

	#[test]
	fn shapes_entries_from_the_dump() {
		let dir = tempfile::tempdir().unwrap();
		let (parser, repository, _) = scratch_parser(dir.path());

		let indexes = parser
			.list_index_packages(&[repository.clone()], None, &Filters::default(), false)
			.unwrap();
		assert_eq!(indexes.len(), 1);
		assert_eq!(indexes[0].repository, repository);

		let pkg = &indexes[0].packages["pkg"];
		assert_eq!(pkg.len(), 2);
		assert_eq!(pkg[0].file, PathBuf::from("foo/pkg_1.0-1_amd64.deb"));
		assert_eq!(pkg[0].distrib.as_deref(), Some("foo"));
		assert_eq!(pkg[0].arch.as_deref(), Some("amd64"));

		// The architecture clears on source packages.
		let src = &indexes[0].packages["pkg-src"];
		assert_eq!(src[0].arch, None);
		assert_eq!(src[0].file, PathBuf::from("sources/pkg-src_1.0-2.deb"));
	}

	#[test]
	fn greater_collapses_to_the_maximum_version() {
		let dir = tempfile::tempdir().unwrap();
		let (parser, repository, _) = scratch_parser(dir.path());

		let indexes = parser
			.list_index_packages(&[repository], None, &Filters::default(), true)
			.unwrap();
		let pkg = &indexes[0].packages["pkg"];
		assert_eq!(pkg.len(), 1);
		assert_eq!(pkg[0].version, "1.0-2");
	}

	#[test]
	fn filters_constrain_present_attributes_only() {
		let dir = tempfile::tempdir().unwrap();
		let (parser, repository, _) = scratch_parser(dir.path());

		let filters = filters! {
			arch: Pattern::regex("^(?:amd64|all)$").unwrap(),
			distrib: Pattern::regex("^(?:foo|sources)$").unwrap(),
		};
		let indexes = parser
			.list_index_packages(&[repository.clone()], None, &filters, false)
			.unwrap();
		// The source package has no architecture and passes the filter.
		assert!(indexes[0].packages.contains_key("pkg-src"));
		assert!(indexes[0].packages.contains_key("other"));

		let filters = filters! { name: Pattern::literal("other") };
		let indexes = parser
			.list_index_packages(&[repository], None, &filters, false)
			.unwrap();
		assert_eq!(indexes[0].packages.len(), 1);
		assert!(indexes[0].packages.contains_key("other"));
	}

	#[test]
	fn missing_repositories_are_omitted_not_errors() {
		let dir = tempfile::tempdir().unwrap();
		let (parser, repository, _) = scratch_parser(dir.path());

		let missing = dir.path().join("no-such-repo");
		let indexes = parser
			.list_index_packages(
				&[missing, repository.clone()],
				None,
				&Filters::default(),
				false,
			)
			.unwrap();
		assert_eq!(indexes.len(), 1);
		assert_eq!(indexes[0].repository, repository);
	}

	#[test]
	fn unchanged_index_is_served_from_cache() {
		let dir = tempfile::tempdir().unwrap();
		let (parser, repository, log) = scratch_parser(dir.path());

		for _ in 0..3 {
			parser
				.list_index_packages(&[repository.clone()], None, &Filters::default(), true)
				.unwrap();
		}
		let calls = fs::read_to_string(&log).unwrap();
		let dumps = calls
			.lines()
			.filter(|line| line.contains("--list-index-packages-json"))
			.count();
		assert_eq!(dumps, 1);

		// Rewriting the index changes the content hash and misses.
		fs::write(repository.join("index.tar.gz"), b"index-two").unwrap();
		parser
			.list_index_packages(&[repository], None, &Filters::default(), true)
			.unwrap();
		let calls = fs::read_to_string(&log).unwrap();
		let dumps = calls
			.lines()
			.filter(|line| line.contains("--list-index-packages-json"))
			.count();
		assert_eq!(dumps, 2);
	}

	#[test]
	fn literal_patterns_are_anchored() {
		let pattern = Pattern::literal("libx");
		assert!(pattern.matches("libx"));
		assert!(!pattern.matches("libxml"));
		assert!(!pattern.matches("prelibx"));
	}

	#[test]
	fn repairs_lone_backslashes() {
		assert_eq!(
			repair_json_backslashes(r#"{"file": "C:\temp\pkg.deb"}"#),
			r#"{"file": "C:\\temp\\pkg.deb"}"#
		);
		// Already-escaped backslashes are left alone.
		assert_eq!(
			repair_json_backslashes(r#"{"file": "C:\\temp"}"#),
			r#"{"file": "C:\\temp"}"#
		);
	}
}
