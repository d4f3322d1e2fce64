// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Apt package manager.

use crate::{
    exec::{Cmd, Runner},
    package::{lock::LockWait, PackageManager, Result},
};

use tracing::{debug, instrument};

/// Package management through apt-get, apt-cache, and dpkg-query.
pub struct Apt<'a> {
    runner: &'a dyn Runner,
    lock: LockWait,
}

impl<'a> Apt<'a> {
    /// Construct new apt package manager.
    pub fn new(runner: &'a dyn Runner, lock: LockWait) -> Self {
        Self { runner, lock }
    }

    fn apt_get(&self) -> Cmd {
        Cmd::new("apt-get")
            .env("DEBIAN_FRONTEND", "noninteractive")
            .args([
                "-o".to_string(),
                format!("DPkg::Lock::Timeout={}", self.lock.timeout().as_secs()),
            ])
    }
}

impl PackageManager for Apt<'_> {
    #[instrument(skip(self), level = "debug")]
    fn refresh(&self) -> Result<()> {
        self.lock.wait()?;
        self.runner.check(&self.apt_get().arg("update"))?;
        Ok(())
    }

    fn available(&self, name: &str) -> Result<bool> {
        let output = self
            .runner
            .run(&Cmd::new("apt-cache").arg("policy").arg(name))?;
        let candidate = parse_candidate(&output.stdout);
        debug!("candidate for {name:?}: {candidate:?}");

        Ok(candidate.is_some())
    }

    fn is_installed(&self, name: &str) -> Result<bool> {
        let output = self
            .runner
            .run(&Cmd::new("dpkg-query").args(["-W", "-f=${Status}", name]))?;

        Ok(output.success() && output.stdout.trim_end().ends_with("install ok installed"))
    }

    #[instrument(skip(self, names), level = "debug")]
    fn install(&self, names: &[String]) -> Result<()> {
        self.lock.wait()?;
        self.runner.check(
            &self
                .apt_get()
                .args(["install", "-y", "--no-install-recommends"])
                .args(names.iter().cloned()),
        )?;

        Ok(())
    }
}

/// Extract installation candidate from `apt-cache policy` output.
///
/// Returns `None` for unknown packages, and for packages whose candidate is
/// explicitly `(none)`.
pub fn parse_candidate(policy: &str) -> Option<&str> {
    policy
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("Candidate:"))
        .map(str::trim)
        .filter(|version| !version.is_empty() && *version != "(none)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{fake::FakeRunner, Output};
    use indoc::indoc;
    use simple_test_case::test_case;
    use std::time::Duration;

    const CURL_POLICY: &str = indoc! {r#"
        curl:
          Installed: (none)
          Candidate: 7.88.1-10+deb12u5
          Version table:
             7.88.1-10+deb12u5 500
                500 http://deb.debian.org/debian bookworm/main amd64 Packages
    "#};

    const NONE_POLICY: &str = indoc! {r#"
        python-is-python2:
          Installed: (none)
          Candidate: (none)
          Version table:
    "#};

    #[test_case(CURL_POLICY, Some("7.88.1-10+deb12u5"); "candidate version")]
    #[test_case(NONE_POLICY, None; "explicitly none")]
    #[test_case("", None; "unknown package")]
    #[test]
    fn parse_candidate_line(policy: &str, expect: Option<&str>) {
        assert_eq!(parse_candidate(policy), expect);
    }

    fn apt(runner: &FakeRunner) -> Apt<'_> {
        Apt::new(runner, LockWait::new(Vec::<std::path::PathBuf>::new(), Duration::ZERO))
    }

    #[test]
    fn available_queries_policy() -> anyhow::Result<()> {
        let runner = FakeRunner::new()
            .respond("apt-cache policy curl", Output::ok(CURL_POLICY))
            .respond("apt-cache policy", Output::ok(""));
        let apt = apt(&runner);

        assert!(apt.available("curl")?);
        assert!(!apt.available("definitely-not-a-real-package-xyz")?);

        Ok(())
    }

    #[test]
    fn is_installed_reads_dpkg_status() -> anyhow::Result<()> {
        let runner = FakeRunner::new()
            .respond("dpkg-query -W -f=${Status} git", Output::ok("install ok installed"))
            .respond(
                "dpkg-query",
                Output::failed(1, "dpkg-query: no packages found matching zsh"),
            );
        let apt = apt(&runner);

        assert!(apt.is_installed("git")?);
        assert!(!apt.is_installed("zsh")?);

        Ok(())
    }

    #[test]
    fn install_is_noninteractive_batch() -> anyhow::Result<()> {
        let runner = FakeRunner::new();
        apt(&runner).install(&["curl".into(), "git".into()])?;

        let commands = runner.commands();
        assert_eq!(
            runner.calls(),
            vec!["apt-get -o DPkg::Lock::Timeout=0 install -y --no-install-recommends curl git"]
        );
        assert_eq!(
            commands[0].get_envs(),
            &[("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string())]
        );

        Ok(())
    }

    #[test]
    fn failed_install_is_an_error() {
        let runner = FakeRunner::new().respond("apt-get", Output::failed(100, "E: broken"));
        assert!(apt(&runner).install(&["curl".into()]).is_err());
    }
}
