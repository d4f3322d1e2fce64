// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! SSH daemon hardening.
//!
//! Render a drop-in, validate the complete daemon configuration, and only
//! then reload the daemon. A drop-in that fails validation is rolled back
//! before anything reads it, so a typo never locks anyone out.

use crate::{
    config::SshSettings,
    exec::Cmd,
    materialize::{block::ManagedBlock, template::Substitutions, ConfigTemplate, Materialized},
    step::{best_effort, error_chain, Context, Result, StepError},
};

use tracing::info;

pub const SSHD_CONFIG: &str = "/etc/ssh/sshd_config";

/// Hardening drop-in. Sorts ahead of distribution drop-ins such as
/// `50-cloud-init.conf`, since sshd keeps the first value it reads.
pub const DROP_IN: &str = "/etc/ssh/sshd_config.d/00-hostprep.conf";
pub const PRIVSEP_DIR: &str = "/run/sshd";

/// Hardening drop-in.
pub fn template(settings: &SshSettings) -> ConfigTemplate {
    let allow_users = if settings.allow_users.is_empty() {
        "# AllowUsers not restricted".to_string()
    } else {
        format!("AllowUsers {}", settings.allow_users.join(" "))
    };
    let password = if settings.password_authentication {
        "yes"
    } else {
        "no"
    };

    ConfigTemplate::new(DROP_IN, include_str!("../../templates/ssh/00-hostprep.conf"))
        .with_substitutions(
            Substitutions::new()
                .with("port", settings.port.to_string())
                .with("permit_root_login", settings.permit_root_login.as_str())
                .with("password_authentication", password)
                .with("allow_users", allow_users),
        )
        .with_mode(0o644)
}

/// Include directive for daemons whose main file does not read drop-ins.
///
/// The first value sshd reads for a keyword wins, so the include goes first.
pub fn include_block() -> ManagedBlock {
    ManagedBlock::new("include", "Include /etc/ssh/sshd_config.d/*.conf").at_top()
}

/// Check if main configuration already includes the drop-in directory.
pub fn has_include(sshd_config: &str) -> bool {
    sshd_config.lines().map(str::trim).any(|line| {
        line.split_whitespace()
            .next()
            .is_some_and(|keyword| keyword.eq_ignore_ascii_case("include"))
            && line.contains("sshd_config.d")
    })
}

/// Harden daemon, validating before reload.
///
/// # Errors
///
/// - Return [`StepError::Validation`] if the daemon rejects the new
///   configuration. Every changed file is rolled back first.
/// - Return [`StepError`] if files cannot be written, or the daemon cannot
///   be reloaded.
pub fn run(settings: &SshSettings, ctx: &mut Context<'_>) -> Result<()> {
    let Some(main) = ctx.files.read(SSHD_CONFIG)? else {
        return Err(StepError::Validation(format!(
            "{SSHD_CONFIG} not found, is openssh-server installed?"
        )));
    };

    let mut changes = Vec::new();
    if !has_include(&main) {
        changes.push(ctx.files.ensure_block(SSHD_CONFIG, &include_block(), None)?);
    }
    changes.push(ctx.files.materialize(&template(settings))?);
    changes.retain(Materialized::changed);

    if changes.is_empty() {
        info!("sshd already hardened");
        return Ok(());
    }

    if let Err(message) = validate(ctx) {
        for change in changes.iter().rev() {
            best_effort(change.rollback(), "rolling back sshd configuration");
        }
        return Err(StepError::Validation(message));
    }

    reload(ctx)
}

/// Run `sshd -t` against the main configuration under the root prefix.
fn validate(ctx: &Context<'_>) -> std::result::Result<(), String> {
    best_effort(
        mkdirp::mkdirp(ctx.files.resolve(PRIVSEP_DIR)),
        "creating sshd privilege separation directory",
    );

    let config = ctx.files.resolve(SSHD_CONFIG).display().to_string();
    let check = Cmd::new("sshd").args(["-t", "-f", config.as_str()]);
    match ctx.runner.run(&check) {
        Ok(output) if output.success() => Ok(()),
        Ok(output) => Err(output.message()),
        Err(err) => Err(error_chain(&err)),
    }
}

/// Reload daemon. Debian derivatives call the unit `ssh`, others `sshd`.
fn reload(ctx: &Context<'_>) -> Result<()> {
    let mut last = None;
    for unit in ["ssh", "sshd"] {
        match ctx
            .runner
            .check(&Cmd::new("systemctl").args(["reload", unit]))
        {
            Ok(_) => {
                info!("reloaded {unit}");
                return Ok(());
            }
            Err(err) => last = Some(err),
        }
    }

    Err(last.map_or_else(|| StepError::Other("no ssh unit to reload".into()), Into::into))
}

pub fn satisfied(settings: &SshSettings, ctx: &Context<'_>) -> Option<String> {
    let main = ctx.files.read(SSHD_CONFIG).ok()??;
    let current = ctx.files.is_current(&template(settings)).ok()?;

    (current && has_include(&main)).then(|| "sshd already hardened".to_string())
}
