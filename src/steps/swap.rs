// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    config::SwapSettings,
    exec::Cmd,
    materialize::block::{BlockEdit, ManagedBlock},
    step::{best_effort, Context, Result},
};

use std::{fs, path::Path};
use tracing::info;

pub const FSTAB: &str = "/etc/fstab";

/// Entry that activates the swap file on boot.
pub fn fstab_block(settings: &SwapSettings) -> ManagedBlock {
    ManagedBlock::new(
        "swap",
        format!("{} none swap sw 0 0", settings.path.display()),
    )
}

fn size_bytes(settings: &SwapSettings) -> u64 {
    settings.size_mb * 1024 * 1024
}

/// Create swap file of configured size, register it, and turn it on.
///
/// # Errors
///
/// - Return [`StepError`](crate::step::StepError) if the swap file cannot be
///   created, or `/etc/fstab` cannot be written.
pub fn run(settings: &SwapSettings, ctx: &mut Context<'_>) -> Result<()> {
    if ctx.is_wsl() {
        info!("swap is managed by WSL, nothing to do");
        return Ok(());
    }

    let path = ctx.files.resolve(&settings.path);
    let swapfile = path.display().to_string();
    let current = fs::metadata(&path).map(|meta| meta.len()).ok();

    if current != Some(size_bytes(settings)) {
        if current.is_some() {
            info!("resize swap file {swapfile:?} to {} MiB", settings.size_mb);
            best_effort(
                ctx.runner.check(&Cmd::new("swapoff").arg(swapfile.as_str())),
                "turning off old swap file",
            );
            fs::remove_file(&path)?;
        }

        allocate(ctx, &swapfile, settings.size_mb)?;
        ctx.runner
            .check(&Cmd::new("chmod").args(["600", swapfile.as_str()]))?;
        ctx.runner.check(&Cmd::new("mkswap").arg(swapfile.as_str()))?;
    }

    ctx.files.ensure_block(FSTAB, &fstab_block(settings), None)?;

    if !is_active(ctx, &path) {
        ctx.runner.check(&Cmd::new("swapon").arg(swapfile.as_str()))?;
        info!("swap file {swapfile:?} active");
    }

    Ok(())
}

/// Allocate file, falling back to writing zeros where `fallocate` is not
/// supported by the filesystem.
fn allocate(ctx: &Context<'_>, swapfile: &str, size_mb: u64) -> Result<()> {
    let length = format!("{size_mb}M");
    let fallocate = Cmd::new("fallocate").args(["-l", length.as_str(), swapfile]);
    if ctx
        .runner
        .run(&fallocate)
        .is_ok_and(|output| output.success())
    {
        return Ok(());
    }

    info!("fallocate unsupported, writing zeros instead");
    ctx.runner.check(&Cmd::new("dd").args([
        "if=/dev/zero".to_string(),
        format!("of={swapfile}"),
        "bs=1M".to_string(),
        format!("count={size_mb}"),
        "status=none".to_string(),
    ]))?;

    Ok(())
}

fn is_active(ctx: &Context<'_>, path: &Path) -> bool {
    ctx.runner
        .check(&Cmd::new("swapon").args(["--show=NAME", "--noheadings"]))
        .map(|output| output.stdout.lines().any(|line| Path::new(line.trim()) == path))
        .unwrap_or(false)
}

pub fn satisfied(settings: &SwapSettings, ctx: &Context<'_>) -> Option<String> {
    let size = fs::metadata(ctx.files.resolve(&settings.path)).ok()?.len();
    let fstab = ctx.files.read(FSTAB).ok()??;
    let registered = BlockEdit::from(fstab).contains(&fstab_block(settings));

    (size == size_bytes(settings) && registered)
        .then(|| format!("swap file {:?} already set up", settings.path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exec::{fake::FakeRunner, Output},
        materialize::Materializer,
        package::fake::FakePackages,
        steps::fixture,
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn swap_created_registered_and_enabled() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        fixture::write(root.path(), "/etc/fstab", "UUID=abc / ext4 defaults 0 1\n");

        let runner = FakeRunner::new();
        let packages = FakePackages::default();
        let mut ctx = Context::new(&runner, &packages, Materializer::new(root.path()));
        run(&SwapSettings::default(), &mut ctx)?;

        let swapfile = root.path().join("swapfile").display().to_string();
        assert_eq!(
            runner.calls(),
            vec![
                format!("fallocate -l 2048M {swapfile}"),
                format!("chmod 600 {swapfile}"),
                format!("mkswap {swapfile}"),
                "swapon --show=NAME --noheadings".to_string(),
                format!("swapon {swapfile}"),
            ]
        );
        assert_eq!(
            fs::read_to_string(root.path().join("etc/fstab"))?,
            indoc! {"
                UUID=abc / ext4 defaults 0 1
                # BEGIN hostprep swap
                /swapfile none swap sw 0 0
                # END hostprep swap
            "}
        );
        Ok(())
    }

    #[test]
    fn unsupported_fallocate_falls_back_to_dd() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let runner = FakeRunner::new().respond(
            "fallocate",
            Output::failed(1, "fallocate failed: Operation not supported"),
        );
        let packages = FakePackages::default();
        let mut ctx = Context::new(&runner, &packages, Materializer::new(root.path()));
        run(&SwapSettings::default(), &mut ctx)?;

        assert!(runner.called("dd if=/dev/zero"));
        Ok(())
    }

    #[test]
    fn active_swap_is_left_alone() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let settings = SwapSettings {
            size_mb: 1,
            ..SwapSettings::default()
        };
        fs::write(root.path().join("swapfile"), vec![0u8; 1024 * 1024])?;
        let swapfile = root.path().join("swapfile").display().to_string();

        let runner =
            FakeRunner::new().respond("swapon --show", Output::ok(format!("{swapfile}\n")));
        let packages = FakePackages::default();
        let mut ctx = Context::new(&runner, &packages, Materializer::new(root.path()));
        run(&settings, &mut ctx)?;

        assert!(satisfied(&settings, &ctx).is_some());
        assert_eq!(runner.calls(), vec!["swapon --show=NAME --noheadings"]);
        Ok(())
    }
}
