mod util {
	use wpkg_repo::util::base_version;

	#[test]
	fn base_version_strips_the_last_suffix() {
		assert_eq!(base_version("1.0-2"), "1.0");
		assert_eq!(base_version("1.0-rc1-2"), "1.0-rc1");
		assert_eq!(base_version("2:1.4-3"), "2:1.4");
	}

	#[test]
	fn base_version_without_suffix_is_itself() {
		assert_eq!(base_version("0.9"), "0.9");
		assert_eq!(base_version("2024.01.15"), "2024.01.15");
	}
}
