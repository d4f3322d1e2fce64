// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    exec::Cmd,
    step::{error_chain, Context, Result, StepError},
};

use tracing::{info, warn};

/// Stop and disable every listed service that is enabled.
///
/// # Errors
///
/// - Return [`StepError::Other`] naming every service that could not be
///   disabled.
pub fn run(services: &[String], ctx: &mut Context<'_>) -> Result<()> {
    let mut failed = Vec::new();
    for service in services {
        let state = ctx
            .runner
            .run(&Cmd::new("systemctl").args(["is-enabled", service.as_str()]))?;
        let state = state.stdout.trim();

        if !state.starts_with("enabled") {
            let state = if state.is_empty() { "not installed" } else { state };
            info!("{service} is {state}, nothing to disable");
            continue;
        }

        let disable = Cmd::new("systemctl").args(["disable", "--now", service.as_str()]);
        match ctx.runner.check(&disable) {
            Ok(_) => info!("disabled {service}"),
            Err(err) => {
                warn!("cannot disable {service}: {}", error_chain(&err));
                failed.push(service.as_str());
            }
        }
    }

    if !failed.is_empty() {
        return Err(StepError::Other(format!(
            "failed to disable {}",
            failed.join(", ")
        )));
    }

    Ok(())
}
