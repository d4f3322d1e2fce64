// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Shell configuration for the target user.
//!
//! Hostprep owns one snippet, `~/.config/hostprep/shell.sh`, and sources it
//! from the user's rc file through a managed block. The rc file itself stays
//! the user's.

use crate::{
    config::{ShellKind, ShellSettings},
    exec::Cmd,
    host::TargetUser,
    materialize::{
        block::{BlockEdit, ManagedBlock},
        template::{render, Substitutions},
        ConfigTemplate, MaterializeError,
    },
    path::user_snippet_dir,
    step::{Context, Result, StepError},
    steps::packages,
};

use std::path::{Path, PathBuf};
use tracing::info;

const ZSH: &str = "/usr/bin/zsh";

pub fn snippet_path(user: &TargetUser) -> PathBuf {
    user_snippet_dir(&user.home).join("shell.sh")
}

/// Shared snippet with environment and aliases.
pub fn snippet(settings: &ShellSettings, user: &TargetUser) -> ConfigTemplate {
    let aliases = settings
        .aliases
        .iter()
        .map(|(name, command)| format!("alias {name}={}", quote(command)))
        .collect::<Vec<_>>()
        .join("\n");

    ConfigTemplate::new(
        snippet_path(user),
        include_str!("../../templates/shell/aliases.sh"),
    )
    .with_substitutions(
        Substitutions::new()
            .with("editor", settings.editor.as_str())
            .with("aliases", aliases),
    )
}

/// Managed block of the user's rc file, and the rc file it belongs in.
///
/// # Errors
///
/// - Return [`MaterializeError::Template`] if the zsh block cannot render.
pub fn rc_block(
    settings: &ShellSettings,
    user: &TargetUser,
) -> std::result::Result<(PathBuf, ManagedBlock), MaterializeError> {
    let snippet = snippet_path(user).display().to_string();
    let result = match settings.kind {
        ShellKind::Bash => (
            user.home.join(".bashrc"),
            ManagedBlock::new("shell", format!("[ -f \"{snippet}\" ] && . \"{snippet}\"")),
        ),
        ShellKind::Zsh => {
            let body = render(
                include_str!("../../templates/shell/zshrc"),
                &Substitutions::new().with("snippet", snippet),
            )?;
            (user.home.join(".zshrc"), ManagedBlock::new("shell", body))
        }
    };

    Ok(result)
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn target_user<'c>(ctx: &'c Context<'_>) -> Result<&'c TargetUser> {
    ctx.user
        .as_ref()
        .ok_or_else(|| StepError::Other("no target user to configure shell for".into()))
}

/// Write snippet, hook it into the rc file, and switch login shell if needed.
///
/// # Errors
///
/// - Return [`StepError`] if a file cannot be written, or zsh is wanted but
///   cannot be installed.
pub fn run(settings: &ShellSettings, ctx: &mut Context<'_>) -> Result<()> {
    if settings.kind == ShellKind::Zsh {
        packages::install(&["zsh".to_string()], ctx)?;
        if !ctx.packages.is_installed("zsh").unwrap_or(false) {
            return Err(StepError::Validation("zsh is not available".into()));
        }
    }

    let user = target_user(ctx)?.clone();
    let owner = ctx.user_owner();

    ctx.files
        .materialize(&snippet(settings, &user).with_owner(owner))?;
    let (rc, block) = rc_block(settings, &user)?;
    ctx.files.ensure_block(&rc, &block, owner)?;

    let zsh = Path::new(ZSH);
    if settings.kind == ShellKind::Zsh && user.shell != zsh && user.shell != Path::new("/bin/zsh")
    {
        info!("change login shell of {} to {ZSH}", user.name);
        ctx.runner
            .check(&Cmd::new("chsh").args(["-s", ZSH, user.name.as_str()]))?;
    }

    Ok(())
}

pub fn satisfied(settings: &ShellSettings, ctx: &Context<'_>) -> Option<String> {
    let user = ctx.user.as_ref()?;
    let (rc, block) = rc_block(settings, user).ok()?;
    let snippet_current = ctx.files.is_current(&snippet(settings, user)).ok()?;
    let rc_content = ctx.files.read(&rc).ok()??;
    let hooked = BlockEdit::from(rc_content).contains(&block);

    (snippet_current && hooked).then(|| format!("shell already configured for {}", user.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exec::fake::FakeRunner, materialize::Materializer, package::fake::FakePackages,
        steps::fixture,
    };
    use std::fs;

    #[test]
    fn bash_rc_sources_snippet() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        fixture::write(root.path(), "/home/deploy/.bashrc", "alias ls='ls --color=auto'\n");

        let runner = FakeRunner::new();
        let packages = FakePackages::default();
        let mut ctx = Context::new(&runner, &packages, Materializer::new(root.path()))
            .with_user(fixture::user());
        let mut settings = ShellSettings::default();
        settings.aliases.insert("gs".into(), "git status".into());

        assert!(satisfied(&settings, &ctx).is_none());
        run(&settings, &mut ctx)?;

        let snippet =
            fs::read_to_string(root.path().join("home/deploy/.config/hostprep/shell.sh"))?;
        assert!(snippet.contains("export EDITOR=\"vim\""));
        assert!(snippet.contains("alias gs='git status'"));

        let bashrc = fs::read_to_string(root.path().join("home/deploy/.bashrc"))?;
        assert!(bashrc.starts_with("alias ls='ls --color=auto'\n# BEGIN hostprep shell\n"));
        assert!(bashrc.contains(". \"/home/deploy/.config/hostprep/shell.sh\""));

        assert!(satisfied(&settings, &ctx).is_some());
        assert!(!runner.called("chsh"));
        Ok(())
    }

    #[test]
    fn zsh_installs_and_switches_login_shell() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let runner = FakeRunner::new();
        let packages = FakePackages::with_known(["zsh"]);
        let mut ctx = Context::new(&runner, &packages, Materializer::new(root.path()))
            .with_user(fixture::user());
        let settings = ShellSettings {
            kind: ShellKind::Zsh,
            ..ShellSettings::default()
        };

        run(&settings, &mut ctx)?;

        let zshrc = fs::read_to_string(root.path().join("home/deploy/.zshrc"))?;
        assert!(zshrc.contains("autoload -Uz compinit"));
        assert!(zshrc.contains(". \"/home/deploy/.config/hostprep/shell.sh\""));
        assert!(runner.called("chsh -s /usr/bin/zsh deploy"));
        Ok(())
    }

    #[test]
    fn missing_zsh_fails_step() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let runner = FakeRunner::new();
        let packages = FakePackages::default();
        let mut ctx = Context::new(&runner, &packages, Materializer::new(root.path()))
            .with_user(fixture::user());
        let settings = ShellSettings {
            kind: ShellKind::Zsh,
            ..ShellSettings::default()
        };

        assert!(matches!(run(&settings, &mut ctx), Err(StepError::Validation(_))));
        assert!(!root.path().join("home/deploy/.zshrc").exists());
        Ok(())
    }
}
