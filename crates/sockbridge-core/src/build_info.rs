//! Version metadata reported by `sockbridge-relay --version` and logged when
//! the relay starts.

/// Short commit hash the binaries were built from, or `unknown` outside a
/// git checkout.
pub const GIT_HASH: &str = env!("SOCKBRIDGE_GIT_HASH");

/// Cargo profile of the build (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("SOCKBRIDGE_BUILD_PROFILE");

/// Workspace version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The relay's `--version` text, e.g. `0.1.0 (abc1234, release)`.
pub const VERSION_STRING: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("SOCKBRIDGE_GIT_HASH"),
    ", ",
    env!("SOCKBRIDGE_BUILD_PROFILE"),
    ")"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_layout() {
        assert_eq!(
            VERSION_STRING,
            format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
        );
    }

    #[test]
    fn test_commit_is_stamped() {
        assert!(!GIT_HASH.is_empty());
        assert!(!GIT_HASH.contains(char::is_whitespace));
    }

    #[test]
    fn test_profile_is_known() {
        assert!(["debug", "release"].contains(&BUILD_PROFILE));
    }
}
