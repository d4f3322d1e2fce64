// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Run log.
//!
//! Every message goes to the console, and is appended to a log file that
//! outlives the run. The log file is never truncated or rotated, so repeated
//! runs on the same host accumulate into one history. File lines carry an
//! RFC 3339 timestamp and level, and no ANSI escapes.
//!
//! Levels are the usual `tracing` ones. A successful outcome is an `info`
//! event carrying `outcome = "success"`, so it can be grepped for without a
//! custom level.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::{warn, Subscriber};
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    prelude::*,
    registry::LookupSpan,
    EnvFilter, Layer,
};

/// Open log file for appending, creating it and its parent as needed.
///
/// # Errors
///
/// - Return [`RunLogError::Open`] if the file cannot be opened.
pub fn open_log_file(path: &Path) -> Result<File> {
    let open_err = |source| RunLogError::Open {
        source,
        path: path.into(),
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        mkdirp::mkdirp(parent).map_err(open_err)?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(open_err)
}

/// Layer that appends plain, timestamped lines to a file.
pub fn file_layer<S>(file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_timer(ChronoLocal::rfc_3339())
}

/// Install global subscriber for the run.
///
/// Log verbosity follows `RUST_LOG`, defaulting to `info`. A log file that
/// cannot be opened is reported, and the run continues on the console only.
///
/// # Errors
///
/// - Return [`RunLogError::Filter`] if `RUST_LOG` cannot be parsed.
/// - Return [`RunLogError::Init`] if a global subscriber is already set.
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let console = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let (file, failure) = match log_file.map(open_log_file).transpose() {
        Ok(file) => (file, None),
        Err(error) => (None, Some(error)),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file.map(file_layer))
        .with(filter)
        .try_init()?;

    if let Some(error) = failure {
        warn!("{error}, logging to console only");
    }

    Ok(())
}

/// Run log error types.
#[derive(Debug, thiserror::Error)]
pub enum RunLogError {
    /// Log file could not be opened.
    #[error("failed to open log file {:?}", path.display())]
    Open {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Log filter directives are malformed.
    #[error(transparent)]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    /// Global subscriber could not be installed.
    #[error(transparent)]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Friendly result alias :3
pub type Result<T, E = RunLogError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tracing::info;

    #[test]
    fn open_log_file_creates_parents_and_appends() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("var/log/hostprep.log");
        fs::create_dir_all(path.parent().unwrap())?;
        fs::write(&path, "earlier run\n")?;

        let file = open_log_file(&path)?;
        let subscriber = tracing_subscriber::registry().with(file_layer(file));
        tracing::subscriber::with_default(subscriber, || {
            info!(outcome = "success", "step swap done");
        });

        let content = fs::read_to_string(&path)?;
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("earlier run"));
        let line = lines.next().unwrap();
        assert!(line.contains("INFO"));
        assert!(line.contains("step swap done"));
        assert!(line.contains("outcome=\"success\""));
        assert!(!line.contains('\x1b'));

        Ok(())
    }

    #[test]
    fn open_log_file_creates_missing_directories() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested/dir/hostprep.log");
        open_log_file(&path)?;
        assert!(path.is_file());
        Ok(())
    }
}
