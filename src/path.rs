// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way.

use std::path::{Path, PathBuf};

/// System-wide configuration file consulted when no path is given.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/hostprep/config.toml";

/// Determine default absolute path to configuration file.
///
/// Uses the system-wide file if it exists, then the per-user file at
/// `$XDG_CONFIG_HOME/hostprep/config.toml`. Returns `None` if neither
/// exists, which means built-in defaults apply.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_path() -> Option<PathBuf> {
    let system = PathBuf::from(SYSTEM_CONFIG_PATH);
    if system.is_file() {
        return Some(system);
    }

    dirs::config_dir()
        .map(|path| path.join("hostprep").join("config.toml"))
        .filter(|path| path.is_file())
}

/// Determine directory that holds per-user shell snippets.
///
/// Always relative to the target user's home, not the invoking user, since
/// hostprep usually runs under sudo.
pub fn user_snippet_dir(home: &Path) -> PathBuf {
    home.join(".config").join("hostprep")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn snippet_dir_lives_under_home() {
        assert_eq!(
            user_snippet_dir(Path::new("/home/deploy")),
            PathBuf::from("/home/deploy/.config/hostprep")
        );
    }
}
