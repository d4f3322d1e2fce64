// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{RootFixture, PREFLIGHT_ONLY, UBUNTU_OS_RELEASE};

use anyhow::Result;
use assert_cmd::Command;
use hostprep::config::ProvisionConfig;
use indoc::indoc;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use std::fs;

fn hostprep() -> Result<Command> {
    let mut cmd = Command::cargo_bin("hostprep")?;
    cmd.env_remove("WSL_DISTRO_NAME").env("RUST_LOG", "info");
    Ok(cmd)
}

#[test]
fn config_prints_default_configuration() -> Result<()> {
    let output = hostprep()?.arg("config").assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone())?;

    let config: ProvisionConfig = stdout.parse()?;
    assert_eq!(config, ProvisionConfig::default());
    Ok(())
}

#[test]
fn config_writes_output_file() -> Result<()> {
    let fixture = RootFixture::new()?;
    let path = fixture.join("/etc/hostprep/config.toml");

    hostprep()?
        .args(["config", "--output"])
        .arg(&path)
        .assert()
        .success();

    let config: ProvisionConfig = fs::read_to_string(&path)?.parse()?;
    assert_eq!(config, ProvisionConfig::default());
    Ok(())
}

#[test]
fn steps_lists_plan_without_running() -> Result<()> {
    let fixture = RootFixture::new()?;
    let config = fixture.config(indoc! {r#"
        [packages]
        extra = ["ripgrep"]

        [ssh]
        enabled = true
    "#})?;

    hostprep()?
        .args(["steps", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("extra-packages     no        on"))
        .stdout(predicate::str::contains("ssh-hardening      yes       on"))
        .stdout(predicate::str::contains(
            "binaries           no        off (no binaries configured)",
        ));
    Ok(())
}

#[test]
fn run_without_os_release_aborts_in_preflight() -> Result<()> {
    let fixture = RootFixture::new()?;
    let config = fixture.config(PREFLIGHT_ONLY)?;
    let log = fixture.join("/var/log/hostprep.log");

    hostprep()?
        .args(["run", "--non-interactive", "--root"])
        .arg(fixture.path())
        .arg("--config")
        .arg(&config)
        .arg("--log-file")
        .arg(&log)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("preflight failed, aborting"));

    let log = fs::read_to_string(log)?;
    assert!(log.contains("provisioning aborted by critical step preflight"));
    assert!(!log.contains('\x1b'));
    Ok(())
}

#[test]
fn run_rejects_unsupported_distribution() -> Result<()> {
    let fixture = RootFixture::new()?;
    fixture.write("/etc/os-release", "ID=fedora\nPRETTY_NAME=\"Fedora Linux 40\"\n")?;
    let config = fixture.config(PREFLIGHT_ONLY)?;

    hostprep()?
        .args(["run", "-y", "--root"])
        .arg(fixture.path())
        .arg("-c")
        .arg(&config)
        .arg("--log-file")
        .arg(fixture.join("/hostprep.log"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unsupported distribution"));
    Ok(())
}

#[test]
fn run_with_nothing_to_do_succeeds_and_appends_log() -> Result<()> {
    let fixture = RootFixture::new()?;
    fixture.write("/etc/os-release", UBUNTU_OS_RELEASE)?;
    let config = fixture.config(PREFLIGHT_ONLY)?;
    let log = fixture.write("/var/log/hostprep.log", "earlier run\n")?;

    for _ in 0..2 {
        hostprep()?
            .args(["run", "-y", "--root"])
            .arg(fixture.path())
            .arg("-c")
            .arg(&config)
            .arg("--log-file")
            .arg(&log)
            .assert()
            .success();
    }

    let log = fs::read_to_string(log)?;
    assert!(log.starts_with("earlier run\n"));
    assert_eq!(log.matches("provisioning complete").count(), 2);
    assert!(log.contains("outcome=\"success\""));
    Ok(())
}

#[test]
fn run_reports_invalid_configuration() -> Result<()> {
    let fixture = RootFixture::new()?;
    let config = fixture.config("[shell]\nkind = \"fish\"\n")?;

    hostprep()?
        .args(["run", "-y", "--root"])
        .arg(fixture.path())
        .arg("-c")
        .arg(&config)
        .arg("--log-file")
        .arg(fixture.join("/hostprep.log"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid configuration"));
    Ok(())
}
