/// Full commit the binary was built from, when built inside a git checkout.
pub fn git_sha() -> Option<&'static str> {
    option_env!("CLANZONE_BUILD_GIT_SHA")
}

/// `clanzone --version` text: package version plus short sha and a
/// `-dirty` marker for uncommitted tracked changes.
pub fn long_version() -> &'static str {
    env!("CLANZONE_LONG_VERSION")
}
