// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    config::DockerSettings,
    exec::Cmd,
    materialize::{template::Substitutions, ConfigTemplate},
    package::Installer,
    step::{best_effort, Context, Result, StepError},
};

use tracing::info;

pub const DAEMON_JSON: &str = "/etc/docker/daemon.json";

/// Docker daemon configuration.
pub fn template(settings: &DockerSettings) -> ConfigTemplate {
    ConfigTemplate::new(
        DAEMON_JSON,
        include_str!("../../templates/docker/daemon.json"),
    )
    .with_substitutions(
        Substitutions::new()
            .with("log_max_size", settings.log_max_size.as_str())
            .with("log_max_file", settings.log_max_file.to_string()),
    )
}

/// Install engine, configure daemon, and start it.
///
/// # Errors
///
/// - Return [`StepError::Validation`] if no engine package is available.
/// - Return [`StepError`] if installation, configuration, or start fails.
pub fn run(settings: &DockerSettings, ctx: &mut Context<'_>) -> Result<()> {
    let report = Installer::new(ctx.packages).install(settings.packages.iter().cloned())?;
    if report.installed.is_empty() {
        return Err(StepError::Validation(format!(
            "none of {} is available",
            settings.packages.join(", ")
        )));
    }

    let daemon = ctx.files.materialize(&template(settings))?;
    ctx.runner
        .check(&Cmd::new("systemctl").args(["enable", "--now", "docker"]))?;
    if daemon.changed() {
        info!("restart docker to pick up {DAEMON_JSON}");
        ctx.runner
            .check(&Cmd::new("systemctl").args(["restart", "docker"]))?;
    }

    for user in &settings.users {
        best_effort(
            ctx.runner
                .check(&Cmd::new("usermod").args(["-aG", "docker", user.as_str()])),
            &format!("adding {user} to docker group"),
        );
    }

    Ok(())
}

pub fn satisfied(settings: &DockerSettings, ctx: &Context<'_>) -> Option<String> {
    let installed = settings
        .packages
        .iter()
        .any(|name| ctx.packages.is_installed(name).unwrap_or(false));
    let configured = ctx.files.is_current(&template(settings)).unwrap_or(false);

    (installed && configured).then(|| "docker already installed and configured".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exec::{fake::FakeRunner, Output},
        materialize::Materializer,
        package::fake::FakePackages,
    };
    use pretty_assertions::assert_eq;
    use std::fs;

    fn settings() -> DockerSettings {
        DockerSettings {
            enabled: true,
            users: vec!["deploy".into()],
            ..DockerSettings::default()
        }
    }

    #[test]
    fn docker_installed_with_available_packages_only() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let runner = FakeRunner::new();
        let packages = FakePackages::with_known(["docker.io"]);
        let mut ctx = Context::new(&runner, &packages, Materializer::new(root.path()));

        run(&settings(), &mut ctx)?;

        assert_eq!(*packages.batches.borrow(), vec![vec!["docker.io".to_string()]]);
        let daemon = fs::read_to_string(root.path().join("etc/docker/daemon.json"))?;
        assert!(daemon.contains("\"max-size\": \"10m\""));
        assert!(daemon.contains("\"max-file\": \"3\""));
        assert_eq!(
            runner.calls(),
            vec![
                "systemctl enable --now docker",
                "systemctl restart docker",
                "usermod -aG docker deploy",
            ]
        );
        assert!(satisfied(&settings(), &ctx).is_some());
        Ok(())
    }

    #[test]
    fn unchanged_daemon_is_not_restarted() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let runner = FakeRunner::new()
            .respond("usermod", Output::failed(6, "usermod: group 'docker' does not exist"));
        let packages = FakePackages::with_known(["docker.io"]);
        let mut ctx = Context::new(&runner, &packages, Materializer::new(root.path()));
        ctx.files.materialize(&template(&settings()))?;

        run(&settings(), &mut ctx)?;
        assert!(!runner.called("systemctl restart"));
        Ok(())
    }

    #[test]
    fn no_engine_package_fails_step() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let runner = FakeRunner::new();
        let packages = FakePackages::default();
        let mut ctx = Context::new(&runner, &packages, Materializer::new(root.path()));

        assert!(matches!(run(&settings(), &mut ctx), Err(StepError::Validation(_))));
        assert!(!root.path().join("etc/docker/daemon.json").exists());
        Ok(())
    }
}
