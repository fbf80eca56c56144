//! Version information for status surfaces.

use serde::{Deserialize, Serialize};

/// Version information for the bacex binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Crate version.
    pub version: String,
    /// Git commit hash (short), when the build stamped one.
    pub git_commit: Option<String>,
}

impl VersionInfo {
    /// Version of the running binary.
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_commit: option_env!("GIT_COMMIT").map(String::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_version_matches_manifest() {
        assert_eq!(VersionInfo::current().version, env!("CARGO_PKG_VERSION"));
    }
}
