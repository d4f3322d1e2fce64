// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    download::{sha256_file, Download},
    step::{error_chain, Context, Result, StepError},
};

use tracing::warn;

/// Download every pinned binary.
///
/// One failed download does not stop the others.
///
/// # Errors
///
/// - Return [`StepError::Other`] naming every binary that failed.
pub fn run(binaries: &[Download], ctx: &mut Context<'_>) -> Result<()> {
    let mut failed = Vec::new();
    for download in binaries {
        let path = ctx.files.resolve(&download.destination);
        if let Err(err) = ctx.downloader.fetch(download, &path) {
            warn!("cannot install {}: {}", download.name, error_chain(&err));
            failed.push(download.name.as_str());
        }
    }

    if !failed.is_empty() {
        return Err(StepError::Other(format!(
            "failed to install {}",
            failed.join(", ")
        )));
    }

    Ok(())
}

pub fn satisfied(binaries: &[Download], ctx: &Context<'_>) -> Option<String> {
    binaries
        .iter()
        .all(|download| {
            sha256_file(&ctx.files.resolve(&download.destination))
                .is_ok_and(|digest| digest.eq_ignore_ascii_case(download.sha256.trim()))
        })
        .then(|| format!("all {} binary(s) already present", binaries.len()))
}
