// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host detection.
//!
//! Pre-flight checks that decide whether provisioning may run at all, plus
//! facts about the host that later steps depend on, e.g., whether we are
//! inside WSL, where swap and systemd behave differently.

use nix::unistd::{geteuid, Gid, Uid, User};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Distribution family hostprep knows how to provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distro {
    Debian,
    Ubuntu,
}

/// Parsed `/etc/os-release`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OsRelease {
    pub id: String,
    pub id_like: Vec<String>,
    pub version_id: Option<String>,
    pub version_codename: Option<String>,
    pub pretty_name: Option<String>,
}

impl OsRelease {
    /// Determine supported distribution family.
    ///
    /// Derivatives are matched through `ID_LIKE`, e.g., Linux Mint reports
    /// `ID_LIKE="ubuntu debian"`.
    pub fn distro(&self) -> Option<Distro> {
        let ids = std::iter::once(self.id.as_str()).chain(self.id_like.iter().map(String::as_str));
        let mut debian = false;
        for id in ids {
            match id {
                "ubuntu" => return Some(Distro::Ubuntu),
                "debian" => debian = true,
                _ => {}
            }
        }

        debian.then_some(Distro::Debian)
    }

    pub fn name(&self) -> &str {
        self.pretty_name.as_deref().unwrap_or(&self.id)
    }
}

impl FromStr for OsRelease {
    type Err = HostError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut release = OsRelease::default();
        for line in data.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = unquote(value.trim());

            match key.trim() {
                "ID" => release.id = value.to_ascii_lowercase(),
                "ID_LIKE" => {
                    release.id_like = value
                        .split_whitespace()
                        .map(str::to_ascii_lowercase)
                        .collect()
                }
                "VERSION_ID" => release.version_id = Some(value.into()),
                "VERSION_CODENAME" => release.version_codename = Some(value.into()),
                "PRETTY_NAME" => release.pretty_name = Some(value.into()),
                _ => {}
            }
        }

        if release.id.is_empty() {
            return Err(HostError::MalformedOsRelease);
        }

        Ok(release)
    }
}

fn unquote(value: &str) -> &str {
    ['"', '\'']
        .iter()
        .find_map(|quote| {
            value
                .strip_prefix(*quote)
                .and_then(|rest| rest.strip_suffix(*quote))
        })
        .unwrap_or(value)
}

/// Facts about the host being provisioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub os: OsRelease,
    pub distro: Distro,
    pub wsl: bool,
}

/// Detect host under target root prefix.
///
/// # Errors
///
/// - Return [`HostError::OsRelease`] if os-release cannot be read.
/// - Return [`HostError::Unsupported`] if host is not Debian or Ubuntu based.
pub fn detect(root: &Path) -> Result<HostInfo> {
    let path = root.join("etc/os-release");
    let data = fs::read_to_string(&path).map_err(|source| HostError::OsRelease { source, path })?;
    let os: OsRelease = data.parse()?;
    let distro = os.distro().ok_or_else(|| HostError::Unsupported(os.name().into()))?;

    Ok(HostInfo {
        distro,
        wsl: is_wsl(root),
        os,
    })
}

/// Check if running under Windows Subsystem for Linux.
pub fn is_wsl(root: &Path) -> bool {
    if std::env::var_os("WSL_DISTRO_NAME").is_some() {
        return true;
    }

    fs::read_to_string(root.join("proc/sys/kernel/osrelease"))
        .map(|release| release.to_ascii_lowercase().contains("microsoft"))
        .unwrap_or(false)
}

/// Require effective root privileges.
///
/// # Errors
///
/// - Return [`HostError::NotRoot`] if effective user is not root.
pub fn require_root() -> Result<()> {
    if !geteuid().is_root() {
        return Err(HostError::NotRoot);
    }

    Ok(())
}

/// User that per-user files are provisioned for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUser {
    pub name: String,
    pub home: PathBuf,
    pub uid: Uid,
    pub gid: Gid,
    pub shell: PathBuf,
}

impl TargetUser {
    /// Look up user in the password database.
    ///
    /// # Errors
    ///
    /// - Return [`HostError::UnknownUser`] if user does not exist.
    pub fn lookup(name: &str) -> Result<Self> {
        let user = User::from_name(name)
            .map_err(|errno| HostError::UserLookup {
                name: name.into(),
                source: errno.into(),
            })?
            .ok_or_else(|| HostError::UnknownUser(name.into()))?;

        Ok(Self {
            name: user.name,
            home: user.dir,
            uid: user.uid,
            gid: user.gid,
            shell: user.shell,
        })
    }

    /// Check if files written for this user need their ownership changed.
    pub fn needs_chown(&self) -> bool {
        self.uid != geteuid()
    }
}

/// Pick name of user to provision per-user files for.
///
/// Explicit name first, then the user that invoked sudo, then root.
pub fn target_user_name(explicit: Option<&str>) -> String {
    explicit
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .or_else(|| std::env::var("SUDO_USER").ok().filter(|name| !name.is_empty()))
        .unwrap_or_else(|| "root".into())
}

/// Host detection error types.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Not running with root privileges.
    #[error("hostprep must run as root, try again with sudo")]
    NotRoot,

    /// Os-release file could not be read.
    #[error("failed to read {:?}", path.display())]
    OsRelease {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Os-release file has no ID field.
    #[error("os-release does not identify the distribution")]
    MalformedOsRelease,

    /// Host distribution is not supported.
    #[error("unsupported distribution {0:?}, only Debian and Ubuntu based hosts are supported")]
    Unsupported(String),

    /// User does not exist.
    #[error("user {0:?} does not exist")]
    UnknownUser(String),

    /// Password database lookup failed.
    #[error("failed to look up user {name:?}")]
    UserLookup {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Friendly result alias :3
pub type Result<T, E = HostError> = std::result::Result<T, E>;
