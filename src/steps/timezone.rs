// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    config::TimezoneSettings,
    step::{Context, Result, StepError},
};

use std::{
    fs,
    io::ErrorKind,
    os::unix::fs::symlink,
    path::{Component, Path, PathBuf},
};
use tracing::info;

pub const TIMEZONE: &str = "/etc/timezone";
pub const LOCALTIME: &str = "/etc/localtime";
pub const ZONEINFO: &str = "/usr/share/zoneinfo";

/// Resolve zone name to its zoneinfo file on the host.
///
/// # Errors
///
/// - Return [`StepError::Validation`] if the name escapes the zoneinfo
///   directory.
pub fn zoneinfo(name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    let sane = !name.is_empty()
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if !sane {
        return Err(StepError::Validation(format!("invalid timezone {name:?}")));
    }

    Ok(Path::new(ZONEINFO).join(relative))
}

/// Point `/etc/localtime` at zone, and record zone name in `/etc/timezone`.
///
/// # Errors
///
/// - Return [`StepError::Validation`] if the zone does not exist.
/// - Return [`StepError`] if either file cannot be written.
pub fn run(settings: &TimezoneSettings, ctx: &mut Context<'_>) -> Result<()> {
    let Some(name) = settings.name.as_deref() else {
        return Ok(());
    };

    let zone = zoneinfo(name)?;
    if !ctx.files.resolve(&zone).is_file() {
        return Err(StepError::Validation(format!("unknown timezone {name:?}")));
    }

    ctx.files
        .write(TIMEZONE, format!("{name}\n").as_bytes(), None, None)?;

    let localtime = ctx.files.resolve(LOCALTIME);
    if fs::read_link(&localtime).is_ok_and(|target| target == zone) {
        return Ok(());
    }

    // INVARIANT: Swap the link atomically through a temporary sibling.
    let temp = localtime.with_file_name(".localtime.hostprep");
    match fs::remove_file(&temp) {
        Err(err) if err.kind() != ErrorKind::NotFound => return Err(err.into()),
        _ => {}
    }
    if let Some(parent) = localtime.parent() {
        mkdirp::mkdirp(parent)?;
    }
    symlink(&zone, &temp)?;
    fs::rename(&temp, &localtime)?;
    info!("timezone set to {name}");

    Ok(())
}

pub fn satisfied(settings: &TimezoneSettings, ctx: &Context<'_>) -> Option<String> {
    let name = settings.name.as_deref()?;
    let zone = zoneinfo(name).ok()?;
    let recorded = ctx.files.read(TIMEZONE).ok()??;
    let linked = fs::read_link(ctx.files.resolve(LOCALTIME)).ok()?;

    (recorded.trim() == name && linked == zone).then(|| format!("timezone already {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exec::fake::FakeRunner, materialize::Materializer, package::fake::FakePackages,
        steps::fixture,
    };
    use simple_test_case::test_case;

    fn settings(name: &str) -> TimezoneSettings {
        TimezoneSettings {
            name: Some(name.into()),
        }
    }

    #[test_case("Europe/Berlin", true; "region and city")]
    #[test_case("UTC", true; "bare zone")]
    #[test_case("../../etc/shadow", false; "parent traversal")]
    #[test_case("/etc/shadow", false; "absolute path")]
    #[test_case("", false; "empty")]
    #[test]
    fn zone_names_are_confined(name: &str, ok: bool) {
        assert_eq!(zoneinfo(name).is_ok(), ok);
    }

    #[test]
    fn timezone_links_localtime() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        fixture::write(root.path(), "/usr/share/zoneinfo/Europe/Berlin", "TZif");
        fixture::write(root.path(), "/etc/localtime", "old");

        let runner = FakeRunner::new();
        let packages = FakePackages::default();
        let mut ctx = Context::new(&runner, &packages, Materializer::new(root.path()));
        let settings = settings("Europe/Berlin");

        assert_eq!(satisfied(&settings, &ctx), None);
        run(&settings, &mut ctx)?;

        assert_eq!(
            fs::read_link(root.path().join("etc/localtime"))?,
            PathBuf::from("/usr/share/zoneinfo/Europe/Berlin")
        );
        assert_eq!(
            fs::read_to_string(root.path().join("etc/timezone"))?,
            "Europe/Berlin\n"
        );
        assert!(satisfied(&settings, &ctx).is_some());
        Ok(())
    }

    #[test]
    fn unknown_timezone_is_rejected() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let runner = FakeRunner::new();
        let packages = FakePackages::default();
        let mut ctx = Context::new(&runner, &packages, Materializer::new(root.path()));

        let result = run(&settings("Mars/Olympus_Mons"), &mut ctx);
        assert!(matches!(result, Err(StepError::Validation(_))));
        assert!(!root.path().join("etc/timezone").exists());
        Ok(())
    }
}
