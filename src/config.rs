// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the provisioning configuration file to simplify the
//! process of serialization and deserialization. File I/O is left to the
//! caller to figure out.
//!
//! # General Layout
//!
//! One table per provisioning concern. Every table carries an `enabled` flag
//! that serves as the default answer when the user is asked whether to run
//! the matching step, and as the final answer in non-interactive runs. Every
//! field has a default, so an empty file is a valid configuration.

use crate::download::Download;

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Provisioning configuration.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Never prompt, use configured defaults for every step.
    pub non_interactive: bool,

    /// Append-only run log.
    pub log_file: PathBuf,

    /// User to provision per-user files for. Empty means the user that
    /// invoked sudo, or root.
    pub user: String,

    pub packages: PackageSettings,
    pub locale: LocaleSettings,
    pub timezone: TimezoneSettings,
    pub shell: ShellSettings,
    pub sysctl: SysctlSettings,
    pub swap: SwapSettings,
    pub docker: DockerSettings,
    pub ssh: SshSettings,
    pub services: ServiceSettings,
    pub download: DownloadSettings,

    /// Pinned third-party binaries.
    #[serde(rename = "binary")]
    pub binaries: Vec<Download>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            non_interactive: false,
            log_file: PathBuf::from("/var/log/hostprep.log"),
            user: String::new(),
            packages: PackageSettings::default(),
            locale: LocaleSettings::default(),
            timezone: TimezoneSettings::default(),
            shell: ShellSettings::default(),
            sysctl: SysctlSettings::default(),
            swap: SwapSettings::default(),
            docker: DockerSettings::default(),
            ssh: SshSettings::default(),
            services: ServiceSettings::default(),
            download: DownloadSettings::default(),
            binaries: Vec::new(),
        }
    }
}

impl FromStr for ProvisionConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: ProvisionConfig =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        config.log_file = expand_path(&config.log_file)?;
        config.swap.path = expand_path(&config.swap.path)?;
        for binary in &mut config.binaries {
            binary.destination = expand_path(&binary.destination)?;
        }

        Ok(config)
    }
}

impl Display for ProvisionConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand_path(path: &std::path::Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Package installation settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PackageSettings {
    pub enabled: bool,

    /// Packages every host gets.
    pub base: Vec<String>,

    /// Additional packages for this host.
    pub extra: Vec<String>,

    /// Seconds to wait for the package manager lock.
    pub lock_timeout_secs: u64,
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base: [
                "ca-certificates",
                "curl",
                "git",
                "gnupg",
                "htop",
                "jq",
                "rsync",
                "tmux",
                "unzip",
                "vim",
            ]
            .map(String::from)
            .to_vec(),
            extra: Vec::new(),
            lock_timeout_secs: 300,
        }
    }
}

/// System locale settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LocaleSettings {
    pub enabled: bool,

    /// Locale to generate and make default, e.g., "en_US.UTF-8".
    pub name: String,
}

impl Default for LocaleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "en_US.UTF-8".into(),
        }
    }
}

/// System timezone settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimezoneSettings {
    /// Zone name, e.g., "Europe/Berlin". Unset leaves the timezone alone.
    pub name: Option<String>,
}

/// Interactive shell flavor.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    #[default]
    Bash,
    Zsh,
}

/// Shell configuration settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShellSettings {
    pub enabled: bool,
    pub kind: ShellKind,

    /// Value for `$EDITOR` and `$VISUAL`.
    pub editor: String,

    /// Extra aliases, name to command.
    pub aliases: BTreeMap<String, String>,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            kind: ShellKind::default(),
            editor: "vim".into(),
            aliases: BTreeMap::new(),
        }
    }
}

/// Kernel parameter settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SysctlSettings {
    pub enabled: bool,
    pub swappiness: u8,

    /// Additional parameters, key to value.
    pub extra: BTreeMap<String, String>,
}

impl Default for SysctlSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            swappiness: 10,
            extra: BTreeMap::new(),
        }
    }
}

/// Swap file settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SwapSettings {
    pub enabled: bool,
    pub size_mb: u64,
    pub path: PathBuf,
}

impl Default for SwapSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            size_mb: 2048,
            path: PathBuf::from("/swapfile"),
        }
    }
}

/// Docker engine settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DockerSettings {
    pub enabled: bool,

    /// Packages providing the engine. Unavailable names are skipped.
    pub packages: Vec<String>,

    /// Maximum size of one container log file.
    pub log_max_size: String,

    /// Maximum number of rotated container log files.
    pub log_max_file: u32,

    /// Users to add to the docker group.
    pub users: Vec<String>,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            packages: ["docker.io", "docker-compose-v2"].map(String::from).to_vec(),
            log_max_size: "10m".into(),
            log_max_file: 3,
            users: Vec::new(),
        }
    }
}

/// SSH daemon hardening settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SshSettings {
    pub enabled: bool,
    pub port: u16,
    pub permit_root_login: String,
    pub password_authentication: bool,

    /// Restrict logins to these users. Empty allows everyone.
    pub allow_users: Vec<String>,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 22,
            permit_root_login: "prohibit-password".into(),
            password_authentication: false,
            allow_users: Vec::new(),
        }
    }
}

/// Service settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Services to stop and disable.
    pub disable: Vec<String>,
}

/// Network download settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Connect and read timeout in seconds.
    pub timeout_secs: u64,

    /// Attempts before a download is given up on.
    pub retries: u32,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retries: 3,
        }
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
