// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Provisioning steps.
//!
//! The fixed listing of steps hostprep knows how to run, in the order they
//! run in. Each step gets its enabled flag from configuration, possibly
//! flipped by the user through a prompt, or by detecting that the host is
//! already in the desired state. Planning happens before anything runs, so
//! every question is asked upfront and the run itself is unattended.
//!
//! | Step               | Critical | Enabled by default         |
//! |--------------------|----------|----------------------------|
//! | `preflight`        | yes      | always                     |
//! | `base-packages`    | no       | yes                        |
//! | `extra-packages`   | no       | if any are configured      |
//! | `locale`           | no       | yes                        |
//! | `timezone`         | no       | if one is configured       |
//! | `shell`            | no       | yes                        |
//! | `sysctl`           | no       | yes                        |
//! | `swap`             | no       | no, never on WSL           |
//! | `docker`           | no       | no                         |
//! | `binaries`         | no       | if any are configured      |
//! | `disable-services` | no       | if any are configured      |
//! | `ssh-hardening`    | yes      | no                         |

pub mod binaries;
pub mod docker;
pub mod locale;
pub mod packages;
pub mod preflight;
pub mod services;
pub mod shell;
pub mod ssh;
pub mod swap;
pub mod sysctl;
pub mod timezone;

use crate::{
    config::ProvisionConfig,
    host,
    prompt::{PromptError, Prompter, Selector},
    step::{Context, Result, Sequencer, Step},
};

use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::debug;

/// Every step hostprep can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Preflight,
    BasePackages,
    ExtraPackages,
    Locale,
    Timezone,
    Shell,
    Sysctl,
    Swap,
    Docker,
    Binaries,
    DisableServices,
    SshHardening,
}

impl StepKind {
    /// Every step in declared order.
    pub const ALL: [StepKind; 12] = [
        Self::Preflight,
        Self::BasePackages,
        Self::ExtraPackages,
        Self::Locale,
        Self::Timezone,
        Self::Shell,
        Self::Sysctl,
        Self::Swap,
        Self::Docker,
        Self::Binaries,
        Self::DisableServices,
        Self::SshHardening,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::BasePackages => "base-packages",
            Self::ExtraPackages => "extra-packages",
            Self::Locale => "locale",
            Self::Timezone => "timezone",
            Self::Shell => "shell",
            Self::Sysctl => "sysctl",
            Self::Swap => "swap",
            Self::Docker => "docker",
            Self::Binaries => "binaries",
            Self::DisableServices => "disable-services",
            Self::SshHardening => "ssh-hardening",
        }
    }

    /// Check if failure of this step aborts the run.
    pub fn critical(self) -> bool {
        matches!(self, Self::Preflight | Self::SshHardening)
    }

    /// Configured default for the enabled flag.
    pub fn default_enabled(self, config: &ProvisionConfig) -> bool {
        match self {
            Self::Preflight | Self::Timezone | Self::Binaries | Self::DisableServices => true,
            Self::BasePackages | Self::ExtraPackages => config.packages.enabled,
            Self::Locale => config.locale.enabled,
            Self::Shell => config.shell.enabled,
            Self::Sysctl => config.sysctl.enabled,
            Self::Swap => config.swap.enabled,
            Self::Docker => config.docker.enabled,
            Self::SshHardening => config.ssh.enabled,
        }
    }

    /// Reason this step has nothing to do, if any.
    ///
    /// Inapplicable steps are disabled without asking.
    pub fn inapplicable(self, config: &ProvisionConfig, wsl: bool) -> Option<&'static str> {
        match self {
            Self::BasePackages if config.packages.base.is_empty() => {
                Some("no base packages configured")
            }
            Self::ExtraPackages if config.packages.extra.is_empty() => {
                Some("no extra packages configured")
            }
            Self::Timezone if config.timezone.name.is_none() => Some("no timezone configured"),
            Self::Swap if wsl => Some("swap is managed by WSL"),
            Self::Binaries if config.binaries.is_empty() => Some("no binaries configured"),
            Self::DisableServices if config.services.disable.is_empty() => {
                Some("no services to disable")
            }
            _ => None,
        }
    }

    /// Question that toggles this step. Pre-flight is never asked about.
    pub fn prompt(self, config: &ProvisionConfig) -> Option<String> {
        let prompt = match self {
            Self::Preflight => return None,
            Self::BasePackages => format!(
                "Install {} base package(s)?",
                config.packages.base.len()
            ),
            Self::ExtraPackages => format!(
                "Install {} extra package(s)?",
                config.packages.extra.len()
            ),
            Self::Locale => format!("Configure locale {}?", config.locale.name),
            Self::Timezone => format!(
                "Set timezone to {}?",
                config.timezone.name.as_deref().unwrap_or_default()
            ),
            Self::Shell => "Configure shell?".into(),
            Self::Sysctl => "Apply kernel parameters?".into(),
            Self::Swap => format!("Create {} MiB swap file?", config.swap.size_mb),
            Self::Docker => "Install and configure Docker?".into(),
            Self::Binaries => format!("Install {} binary(s)?", config.binaries.len()),
            Self::DisableServices => format!(
                "Disable service(s) {}?",
                config.services.disable.join(", ")
            ),
            Self::SshHardening => "Harden SSH daemon?".into(),
        };

        Some(prompt)
    }

    /// Describe existing host state that already satisfies this step.
    pub fn satisfied(self, config: &ProvisionConfig, ctx: &Context<'_>) -> Option<String> {
        match self {
            Self::Preflight | Self::DisableServices => None,
            Self::BasePackages => packages::satisfied(&config.packages.base, ctx),
            Self::ExtraPackages => packages::satisfied(&config.packages.extra, ctx),
            Self::Locale => locale::satisfied(&config.locale, ctx),
            Self::Timezone => timezone::satisfied(&config.timezone, ctx),
            Self::Shell => shell::satisfied(&config.shell, ctx),
            Self::Sysctl => sysctl::satisfied(&config.sysctl, ctx),
            Self::Swap => swap::satisfied(&config.swap, ctx),
            Self::Docker => docker::satisfied(&config.docker, ctx),
            Self::Binaries => binaries::satisfied(&config.binaries, ctx),
            Self::SshHardening => ssh::satisfied(&config.ssh, ctx),
        }
    }

    /// Run step action.
    ///
    /// # Errors
    ///
    /// - Return [`StepError`](crate::step::StepError) if the step failed.
    pub fn run(self, config: &ProvisionConfig, ctx: &mut Context<'_>) -> Result<()> {
        match self {
            Self::Preflight => preflight::run(config, ctx),
            Self::BasePackages => packages::install(&config.packages.base, ctx),
            Self::ExtraPackages => packages::install(&config.packages.extra, ctx),
            Self::Locale => locale::run(&config.locale, ctx),
            Self::Timezone => timezone::run(&config.timezone, ctx),
            Self::Shell => shell::run(&config.shell, ctx),
            Self::Sysctl => sysctl::run(&config.sysctl, ctx),
            Self::Swap => swap::run(&config.swap, ctx),
            Self::Docker => docker::run(&config.docker, ctx),
            Self::Binaries => binaries::run(&config.binaries, ctx),
            Self::DisableServices => services::run(&config.services.disable, ctx),
            Self::SshHardening => ssh::run(&config.ssh, ctx),
        }
    }
}

impl Display for StepKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.name())
    }
}

/// Step as declared by configuration, before anyone is asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Declared {
    pub kind: StepKind,
    pub enabled: bool,
    pub critical: bool,

    /// Why the step has nothing to do.
    pub reason: Option<&'static str>,
}

/// Declare every step from configuration alone.
pub fn declare(config: &ProvisionConfig, wsl: bool) -> Vec<Declared> {
    StepKind::ALL
        .iter()
        .map(|&kind| {
            let reason = kind.inapplicable(config, wsl);
            Declared {
                kind,
                enabled: reason.is_none() && kind.default_enabled(config),
                critical: kind.critical(),
                reason,
            }
        })
        .collect()
}

/// Plan provisioning run.
///
/// Asks about every applicable step upfront, unless the host already
/// satisfies it.
///
/// # Errors
///
/// - Return [`PromptError`] if prompting fails or is interrupted.
pub fn plan<'a, P>(
    config: &'a ProvisionConfig,
    ctx: &Context<'_>,
    selector: &mut Selector<P>,
) -> std::result::Result<Sequencer<'a>, PromptError>
where
    P: Prompter,
{
    let wsl = host::is_wsl(ctx.files.root());
    let mut sequencer = Sequencer::new();

    for declared in declare(config, wsl) {
        let kind = declared.kind;
        let enabled = match (declared.reason, kind.prompt(config)) {
            (Some(reason), _) => {
                debug!("{kind}: {reason}");
                false
            }
            (None, None) => declared.enabled,
            (None, Some(prompt)) => {
                selector.choose(&prompt, declared.enabled, kind.satisfied(config, ctx))?
            }
        };

        let mut step = Step::new(kind.name(), move |ctx| kind.run(config, ctx)).enabled(enabled);
        if declared.critical {
            step = step.critical();
        }
        sequencer.push(step);
    }

    Ok(sequencer)
}
