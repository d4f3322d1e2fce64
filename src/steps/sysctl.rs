// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    config::SysctlSettings,
    exec::Cmd,
    materialize::{template::Substitutions, ConfigTemplate},
    step::{best_effort, Context, Result},
};

pub const DESTINATION: &str = "/etc/sysctl.d/99-hostprep.conf";

/// Kernel parameter drop-in.
pub fn template(settings: &SysctlSettings) -> ConfigTemplate {
    let extra = settings
        .extra
        .iter()
        .map(|(key, value)| format!("{key} = {value}"))
        .collect::<Vec<_>>()
        .join("\n");

    ConfigTemplate::new(
        DESTINATION,
        include_str!("../../templates/sysctl/99-hostprep.conf"),
    )
    .with_substitutions(
        Substitutions::new()
            .with("swappiness", settings.swappiness.to_string())
            .with("extra", extra),
    )
}

/// Write kernel parameters, and load them if they changed.
///
/// Loading is best-effort. Containers and WSL reject some parameters, which
/// still apply on the next boot of a real host.
///
/// # Errors
///
/// - Return [`StepError`](crate::step::StepError) if the drop-in cannot be
///   written.
pub fn run(settings: &SysctlSettings, ctx: &mut Context<'_>) -> Result<()> {
    let result = ctx.files.materialize(&template(settings))?;
    if result.changed() {
        let path = result.path().display().to_string();
        best_effort(
            ctx.runner.check(&Cmd::new("sysctl").args(["-p", path.as_str()])),
            "loading kernel parameters",
        );
    }

    Ok(())
}

pub fn satisfied(settings: &SysctlSettings, ctx: &Context<'_>) -> Option<String> {
    ctx.files
        .is_current(&template(settings))
        .unwrap_or(false)
        .then(|| "kernel parameters already applied".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exec::{fake::FakeRunner, Output},
        materialize::Materializer,
        package::fake::FakePackages,
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn sysctl_written_and_loaded_once() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let runner = FakeRunner::new();
        let packages = FakePackages::default();
        let mut ctx = Context::new(&runner, &packages, Materializer::new(root.path()));
        let mut settings = SysctlSettings::default();
        settings
            .extra
            .insert("net.core.somaxconn".into(), "1024".into());

        run(&settings, &mut ctx)?;
        run(&settings, &mut ctx)?;

        let expect = indoc! {r#"
            # Managed by hostprep. Local changes are overwritten on the next run.
            vm.swappiness = 10
            vm.vfs_cache_pressure = 50
            fs.inotify.max_user_watches = 524288
            net.core.somaxconn = 1024
        "#};
        assert_eq!(
            fs::read_to_string(root.path().join("etc/sysctl.d/99-hostprep.conf"))?,
            expect
        );
        assert_eq!(runner.calls().iter().filter(|c| c.starts_with("sysctl -p")).count(), 1);
        Ok(())
    }

    #[test]
    fn rejected_parameters_only_warn() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let runner = FakeRunner::new().respond(
            "sysctl",
            Output::failed(255, "sysctl: permission denied on key \"vm.swappiness\""),
        );
        let packages = FakePackages::default();
        let mut ctx = Context::new(&runner, &packages, Materializer::new(root.path()));

        run(&SysctlSettings::default(), &mut ctx)?;
        assert!(satisfied(&SysctlSettings::default(), &ctx).is_some());
        Ok(())
    }
}
