// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Checksum-verified downloads.
//!
//! Third-party binaries that are not packaged for the host are fetched over
//! HTTPS, and pinned to a SHA-256 digest. The body is streamed into a
//! temporary file next to its destination while being hashed. Only a body
//! whose digest matches is moved into place. Transport failures are retried a
//! few times. A digest mismatch is not, because retrying will not fix a wrong
//! pin.

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    fs::{self, File, Permissions},
    io::{self, ErrorKind, IsTerminal, Read, Write},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use tempfile::NamedTempFile;
use tracing::{info, instrument, warn};

/// Binary to download.
#[derive(Debug, Default, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Download {
    /// Short name used in logs.
    pub name: String,

    /// Remote URL to fetch from.
    pub url: String,

    /// Expected SHA-256 digest in lowercase hexadecimal.
    pub sha256: String,

    /// Absolute path to install to.
    pub destination: PathBuf,

    /// Permission bits of installed file.
    #[serde(default = "default_binary_mode")]
    pub mode: u32,
}

fn default_binary_mode() -> u32 {
    0o755
}

/// Outcome of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetched {
    /// Destination already matched the expected digest.
    AlreadyPresent,

    /// Body was downloaded, verified, and installed.
    Installed,
}

/// Blocking HTTP downloader with bounded timeouts and retries.
#[derive(Debug, Clone)]
pub struct Downloader {
    agent: ureq::Agent,
    retries: u32,
    backoff: Duration,
}

impl Downloader {
    /// Construct new downloader.
    ///
    /// A retry count of zero still makes one attempt.
    pub fn new(timeout: Duration, retries: u32) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(timeout)
                .timeout_read(timeout)
                .build(),
            retries,
            backoff: Duration::from_secs(2),
        }
    }

    /// Fetch download into target absolute path.
    ///
    /// # Errors
    ///
    /// - Return [`DownloadError::Checksum`] if the body does not match the
    ///   expected digest.
    /// - Return [`DownloadError::Transport`] if every attempt failed.
    /// - Return [`DownloadError::Io`] if the body cannot be written.
    #[instrument(skip(self, download), fields(name = %download.name), level = "debug")]
    pub fn fetch(&self, download: &Download, path: &Path) -> Result<Fetched> {
        if path.exists() && verify(&sha256_file(path)?, &download.sha256).is_ok() {
            info!("{} already present at {:?}", download.name, path.display());
            return Ok(Fetched::AlreadyPresent);
        }

        let attempts = self.retries.max(1);
        let mut attempt = 1;
        let temp = loop {
            match self.fetch_once(download, path) {
                Ok(temp) => break temp,
                Err(DownloadError::Transport(error)) if attempt < attempts => {
                    warn!(
                        "download of {} failed (attempt {attempt}/{attempts}): {error}",
                        download.name
                    );
                    thread::sleep(self.backoff * attempt);
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        };

        fs::set_permissions(temp.path(), Permissions::from_mode(download.mode))?;
        temp.persist(path).map_err(|err| DownloadError::Io(err.error))?;
        info!("installed {} to {:?}", download.name, path.display());

        Ok(Fetched::Installed)
    }

    fn fetch_once(&self, download: &Download, path: &Path) -> Result<NamedTempFile> {
        let response = self
            .agent
            .get(&download.url)
            .call()
            .map_err(|err| DownloadError::Transport(Box::new(err)))?;
        let length = response
            .header("Content-Length")
            .and_then(|len| len.parse::<u64>().ok());

        let parent = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        mkdirp::mkdirp(parent)?;
        let mut temp = NamedTempFile::new_in(parent)?;

        let bar = progress_bar(&download.name, length)?;
        let mut reader = bar.wrap_read(response.into_reader());
        let digest = copy_hashed(&mut reader, temp.as_file_mut())
            .map_err(|err| match err.kind() {
                ErrorKind::TimedOut | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof => {
                    DownloadError::Transport(Box::new(ureq::Error::from(err)))
                }
                _ => DownloadError::Io(err),
            })?;
        bar.finish_and_clear();

        verify(&digest, &download.sha256)?;
        temp.as_file().sync_all()?;

        Ok(temp)
    }
}

fn progress_bar(name: &str, length: Option<u64>) -> Result<ProgressBar> {
    if !io::stderr().is_terminal() {
        return Ok(ProgressBar::hidden());
    }

    let bar = match length {
        Some(length) => ProgressBar::new(length),
        None => ProgressBar::new_spinner(),
    };
    let style = ProgressStyle::with_template(
        "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
    )?
    .progress_chars("-Cco.");
    bar.set_style(style);
    bar.set_message(name.to_string());

    Ok(bar)
}

/// Copy reader into file while computing SHA-256 digest of the bytes.
pub fn copy_hashed(reader: &mut impl Read, file: &mut File) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        file.write_all(&buffer[..read])?;
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute SHA-256 digest of file in lowercase hexadecimal.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare digest with expected digest, ignoring case.
pub fn verify(actual: &str, expected: &str) -> Result<()> {
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(DownloadError::Checksum {
            expected: expected.trim().to_ascii_lowercase(),
            actual: actual.to_string(),
        });
    }

    Ok(())
}

/// Download error types.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Downloaded body does not match pinned digest.
    #[error("checksum mismatch: expected sha256 {expected}, got {actual}")]
    Checksum { expected: String, actual: String },

    /// Network transport failed.
    #[error(transparent)]
    Transport(#[from] Box<ureq::Error>),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Local file operations failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = DownloadError> = std::result::Result<T, E>;
