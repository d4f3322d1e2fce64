// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Step sequencing.
//!
//! Provisioning is an ordered listing of __steps__. Each step is a named
//! action with two flags: whether it is enabled, and whether it is critical.
//! The [`Sequencer`] runs the listing once, in declared order:
//!
//! ```text
//! Pending -> Running -> Succeeded
//!                    -> Skipped
//!                    -> Failed
//! ```
//!
//! A disabled step is skipped without running. A failed step that is not
//! critical is logged as a warning, and the run moves on. A failed critical
//! step aborts the run, leaving every later step pending. Only the sequencer
//! decides what a failure means for the run. Steps just report errors.

use crate::{
    download::{DownloadError, Downloader},
    exec::{ExecError, Runner},
    host::{HostError, HostInfo, TargetUser},
    materialize::{MaterializeError, Materializer, Owner},
    package::{PackageError, PackageManager},
};

use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    time::Duration,
};
use tracing::{error, info, warn};

/// Everything a step action gets to work with.
pub struct Context<'a> {
    pub runner: &'a dyn Runner,
    pub packages: &'a dyn PackageManager,
    pub files: Materializer,
    pub downloader: Downloader,

    /// Host facts, filled in by pre-flight.
    pub host: Option<HostInfo>,

    /// User that per-user files belong to, filled in by pre-flight.
    pub user: Option<TargetUser>,
}

impl<'a> Context<'a> {
    /// Construct new context.
    pub fn new(
        runner: &'a dyn Runner,
        packages: &'a dyn PackageManager,
        files: Materializer,
    ) -> Self {
        Self {
            runner,
            packages,
            files,
            downloader: Downloader::new(Duration::from_secs(30), 3),
            host: None,
            user: None,
        }
    }

    pub fn with_downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn with_user(mut self, user: TargetUser) -> Self {
        self.user = Some(user);
        self
    }

    /// Ownership to give files written into the target user's home.
    pub fn user_owner(&self) -> Option<Owner> {
        self.user
            .as_ref()
            .filter(|user| user.needs_chown())
            .map(|user| Owner {
                uid: user.uid,
                gid: user.gid,
            })
    }

    /// Check if host runs under WSL.
    pub fn is_wsl(&self) -> bool {
        self.host.as_ref().is_some_and(|host| host.wsl)
    }
}

/// Lifecycle state of a step.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    #[default]
    Pending,
    Running,
    Succeeded,
    Skipped,
    Failed,
}

impl Display for StepState {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let state = match self {
            Self::Pending => "not run",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        fmt.write_str(state)
    }
}

type Action<'a> = Box<dyn FnMut(&mut Context<'_>) -> Result<()> + 'a>;

/// Named provisioning action.
pub struct Step<'a> {
    name: String,
    enabled: bool,
    critical: bool,
    action: Action<'a>,
    state: StepState,
}

impl<'a> Step<'a> {
    /// Construct new enabled, non-critical step.
    pub fn new(
        name: impl Into<String>,
        action: impl FnMut(&mut Context<'_>) -> Result<()> + 'a,
    ) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            critical: false,
            action: Box::new(action),
            state: StepState::Pending,
        }
    }

    /// Mark step as critical, so its failure aborts the run.
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    pub fn state(&self) -> StepState {
        self.state
    }
}

impl std::fmt::Debug for Step<'_> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("Step")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("critical", &self.critical)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Ordered listing of steps.
#[derive(Debug, Default)]
pub struct Sequencer<'a> {
    steps: Vec<Step<'a>>,
}

impl<'a> Sequencer<'a> {
    /// Construct new empty sequencer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append step to the end of the listing.
    pub fn push(&mut self, step: Step<'a>) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step<'a>] {
        &self.steps
    }

    /// Run every step once, in declared order.
    ///
    /// Never fails as a whole. Step failures are recorded in the returned
    /// summary instead.
    pub fn run(mut self, ctx: &mut Context<'_>) -> RunSummary {
        let total = self.steps.len();
        let mut aborted_by = None;
        let mut errors = vec![None; total];

        for (index, step) in self.steps.iter_mut().enumerate() {
            let position = format!("[{}/{total}]", index + 1);

            if !step.enabled {
                step.state = StepState::Skipped;
                info!("{position} {} skipped", step.name);
                continue;
            }

            info!("{position} {}", step.name);
            step.state = StepState::Running;

            match (step.action)(ctx) {
                Ok(()) => {
                    step.state = StepState::Succeeded;
                    info!(outcome = "success", "{position} {} done", step.name);
                }
                Err(err) => {
                    step.state = StepState::Failed;
                    let chain = error_chain(&err);
                    errors[index] = Some(chain.clone());

                    if step.critical {
                        error!("{position} {} failed, aborting: {chain}", step.name);
                        aborted_by = Some(step.name.clone());
                        break;
                    }

                    warn!("{position} {} failed, continuing: {chain}", step.name);
                }
            }
        }

        // INVARIANT: Steps after a critical failure stay pending.
        let outcomes = self
            .steps
            .into_iter()
            .zip(errors)
            .map(|(step, error)| StepOutcome {
                name: step.name,
                state: step.state,
                critical: step.critical,
                error,
            })
            .collect();

        RunSummary {
            outcomes,
            aborted_by,
        }
    }
}

/// Final state of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub name: String,
    pub state: StepState,
    pub critical: bool,
    pub error: Option<String>,
}

/// Per-step final states of a run, in declared order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub outcomes: Vec<StepOutcome>,

    /// Critical step that aborted the run.
    pub aborted_by: Option<String>,
}

impl RunSummary {
    /// Names of steps that ended up in target state.
    pub fn names(&self, state: StepState) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.state == state)
            .map(|outcome| outcome.name.as_str())
            .collect()
    }

    /// Process exit code for the run.
    ///
    /// - 0 if every step succeeded or was skipped.
    /// - 1 if a critical step aborted the run.
    /// - 2 if some non-critical step failed.
    pub fn exit_code(&self) -> i32 {
        if self.aborted_by.is_some() {
            1
        } else if self.outcomes.iter().any(|o| o.state == StepState::Failed) {
            2
        } else {
            0
        }
    }

    /// Log summary of the run.
    pub fn log(&self) {
        let list = |state| {
            let names = self.names(state);
            if names.is_empty() {
                "none".to_string()
            } else {
                names.join(", ")
            }
        };

        info!("succeeded: {}", list(StepState::Succeeded));
        info!("skipped: {}", list(StepState::Skipped));

        for outcome in self.outcomes.iter().filter(|o| o.state == StepState::Failed) {
            let error = outcome.error.as_deref().unwrap_or("unknown error");
            warn!("failed: {}: {error}", outcome.name);
        }

        let pending = self.names(StepState::Pending);
        if !pending.is_empty() {
            warn!("not run: {}", pending.join(", "));
        }

        match &self.aborted_by {
            Some(name) => error!("provisioning aborted by critical step {name}"),
            None if self.exit_code() == 0 => {
                info!(outcome = "success", "provisioning complete")
            }
            None => warn!("provisioning complete with failures"),
        }
    }
}

/// Downgrade failure to a warning.
///
/// For work whose failure should not fail the step around it.
pub fn best_effort<T, E>(result: std::result::Result<T, E>, what: &str) -> Option<T>
where
    E: Error,
{
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("{what} failed, continuing: {}", error_chain(&err));
            None
        }
    }
}

/// Render error with every source joined by `: `.
pub fn error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_message = cause.to_string();
        if !message.ends_with(cause_message.as_str()) {
            message.push_str(": ");
            message.push_str(cause_message.as_str());
        }
        source = cause.source();
    }

    message
}

/// Step error types.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generated configuration was rejected by its consumer.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    Other(String),
}

/// Friendly result alias :3
pub type Result<T, E = StepError> = std::result::Result<T, E>;
