// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package installation.
//!
//! Provisioning wants a listing of packages installed, but package names
//! drift between releases: a package that exists on Ubuntu may not exist on
//! Debian, or may have been renamed in the next release. So installation is
//! never all-or-nothing. The [`Installer`] partitions a request into the
//! packages the index can actually provide and the ones it cannot, installs
//! the former in one batch, and reports the latter as skipped.
//!
//! # Availability Is Never Cached
//!
//! Every call to [`Installer::install`] refreshes the package index and
//! classifies each requested name again. Earlier steps may add new
//! repositories, so a name that was unavailable a moment ago can become
//! available.

pub mod apt;
pub mod lock;

use std::collections::BTreeSet;
use tracing::{info, instrument, warn};

/// Host package manager.
pub trait PackageManager {
    /// Refresh local package index.
    fn refresh(&self) -> Result<()>;

    /// Check if package index has an installation candidate for a package.
    fn available(&self, name: &str) -> Result<bool>;

    /// Check if package is already installed.
    fn is_installed(&self, name: &str) -> Result<bool>;

    /// Install listing of packages in one batch.
    fn install(&self, names: &[String]) -> Result<()>;
}

/// Partition of requested packages by availability.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Availability {
    pub available: BTreeSet<String>,
    pub unavailable: BTreeSet<String>,
}

/// Outcome of a batch installation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Packages handed to the package manager.
    pub installed: Vec<String>,

    /// Packages left out because the index has no candidate for them.
    pub skipped: Vec<String>,
}

/// Installer that never lets one unavailable package block the rest.
#[derive(Debug)]
pub struct Installer<'a, P>
where
    P: PackageManager + ?Sized,
{
    manager: &'a P,
}

impl<'a, P> Installer<'a, P>
where
    P: PackageManager + ?Sized,
{
    /// Construct new installer on top of a package manager.
    pub fn new(manager: &'a P) -> Self {
        Self { manager }
    }

    /// Partition package names into available and unavailable sets.
    ///
    /// A failed availability query counts as unavailable.
    pub fn classify(&self, names: impl IntoIterator<Item = impl Into<String>>) -> Availability {
        let mut result = Availability::default();
        for name in names.into_iter().map(Into::into) {
            match self.manager.available(&name) {
                Ok(true) => {
                    result.available.insert(name);
                }
                Ok(false) => {
                    result.unavailable.insert(name);
                }
                Err(error) => {
                    warn!("cannot query availability of {name:?}: {error}");
                    result.unavailable.insert(name);
                }
            }
        }

        result
    }

    /// Install every available package of the request.
    ///
    /// Refreshes the package index on a best-effort basis, classifies each
    /// name, then installs the available subset in one batch.
    ///
    /// # Errors
    ///
    /// - Return [`PackageError`] if the batch installation itself fails.
    #[instrument(skip(self, names), level = "debug")]
    pub fn install(
        &self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<InstallReport> {
        if let Err(error) = self.manager.refresh() {
            warn!("package index refresh failed, continuing with stale index: {error}");
        }

        let availability = self.classify(names);
        for name in &availability.unavailable {
            warn!("package {name:?} not available, skipping");
        }

        let report = InstallReport {
            installed: availability.available.into_iter().collect(),
            skipped: availability.unavailable.into_iter().collect(),
        };

        if report.installed.is_empty() {
            info!("nothing to install");
            return Ok(report);
        }

        info!("install {}", report.installed.join(" "));
        self.manager.install(&report.installed)?;

        Ok(report)
    }

    /// Check that every package of a listing is already installed.
    pub fn all_installed(&self, names: &[String]) -> bool {
        !names.is_empty()
            && names
                .iter()
                .all(|name| self.manager.is_installed(name).unwrap_or(false))
    }
}

/// Package management error types.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    /// Package manager process failed.
    #[error(transparent)]
    Exec(#[from] crate::exec::ExecError),

    /// Package manager lock could not be acquired.
    #[error(transparent)]
    Lock(#[from] crate::package::lock::LockError),
}

/// Friendly result alias :3
pub type Result<T, E = PackageError> = std::result::Result<T, E>;


#[cfg(test)]
mod tests {
    use super::{fake::FakePackages, *};
    use pretty_assertions::assert_eq;

    #[test]
    fn unavailable_package_does_not_block_the_rest() -> anyhow::Result<()> {
        let packages = FakePackages::with_known(["curl"]);
        let report =
            Installer::new(&packages).install(["curl", "definitely-not-a-real-package-xyz"])?;

        assert_eq!(
            report,
            InstallReport {
                installed: vec!["curl".into()],
                skipped: vec!["definitely-not-a-real-package-xyz".into()],
            }
        );
        assert_eq!(*packages.batches.borrow(), vec![vec!["curl".to_string()]]);

        Ok(())
    }

    #[test]
    fn every_available_package_installed_in_one_batch() -> anyhow::Result<()> {
        let packages = FakePackages::with_known(["curl", "git", "htop", "jq"]);
        let report = Installer::new(&packages).install(["jq", "nope-1", "git", "nope-2", "curl"])?;

        assert_eq!(report.installed, vec!["curl", "git", "jq"]);
        assert_eq!(report.skipped, vec!["nope-1", "nope-2"]);
        assert_eq!(packages.batches.borrow().len(), 1);

        Ok(())
    }

    #[test]
    fn nothing_available_skips_batch_call() -> anyhow::Result<()> {
        let packages = FakePackages::default();
        let report = Installer::new(&packages).install(["nope"])?;

        assert!(report.installed.is_empty());
        assert!(packages.batches.borrow().is_empty());

        Ok(())
    }

    #[test]
    fn refresh_failure_is_only_a_warning() -> anyhow::Result<()> {
        let packages = FakePackages {
            fail_refresh: true,
            ..FakePackages::with_known(["curl"])
        };
        let report = Installer::new(&packages).install(["curl"])?;
        assert_eq!(report.installed, vec!["curl"]);

        Ok(())
    }

    #[test]
    fn every_install_refreshes_the_index() -> anyhow::Result<()> {
        let packages = FakePackages::with_known(["curl"]);
        let installer = Installer::new(&packages);
        installer.install(["curl"])?;
        installer.install(["curl"])?;
        assert_eq!(*packages.refreshes.borrow(), 2);

        Ok(())
    }

    #[test]
    fn batch_failure_propagates() {
        let packages = FakePackages {
            fail_install: true,
            ..FakePackages::with_known(["curl"])
        };
        let result = Installer::new(&packages).install(["curl"]);
        assert!(matches!(result, Err(PackageError::Exec(_))));
    }
}
