// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    package::Installer,
    step::{Context, Result},
};

use tracing::info;

/// Install every available package of a listing.
///
/// # Errors
///
/// - Return [`StepError::Package`](crate::step::StepError::Package) if the
///   batch installation fails.
pub fn install(names: &[String], ctx: &mut Context<'_>) -> Result<()> {
    let report = Installer::new(ctx.packages).install(names.iter().cloned())?;
    if !report.skipped.is_empty() {
        info!(
            "installed {} package(s), skipped {} unavailable",
            report.installed.len(),
            report.skipped.len()
        );
    }

    Ok(())
}

pub fn satisfied(names: &[String], ctx: &Context<'_>) -> Option<String> {
    Installer::new(ctx.packages)
        .all_installed(names)
        .then(|| format!("all {} package(s) already installed", names.len()))
}
