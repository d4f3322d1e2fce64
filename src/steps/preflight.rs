// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    config::ProvisionConfig,
    host::{self, target_user_name, TargetUser},
    step::{Context, Result},
};

use std::path::Path;
use tracing::info;

/// Check that the host can be provisioned at all.
///
/// Root privileges are only required when working on the live system. A
/// staging root prefix only needs write access to the prefix.
///
/// # Errors
///
/// - Return [`StepError::Host`](crate::step::StepError::Host) if not root,
///   the distribution is unsupported, or the target user does not exist.
pub fn run(config: &ProvisionConfig, ctx: &mut Context<'_>) -> Result<()> {
    if ctx.files.root() == Path::new("/") {
        host::require_root()?;
    }

    let detected = host::detect(ctx.files.root())?;
    info!(
        "detected {}{}",
        detected.os.name(),
        if detected.wsl { " under WSL" } else { "" }
    );
    ctx.host = Some(detected);

    if ctx.user.is_none() {
        let name = target_user_name(Some(config.user.as_str()));
        ctx.user = Some(TargetUser::lookup(&name)?);
    }

    if let Some(user) = &ctx.user {
        info!("per-user files go to {} at {:?}", user.name, user.home.display());
    }

    Ok(())
}
