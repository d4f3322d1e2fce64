// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration file materialization.
//!
//! To __materialize__ a configuration file is to render it from a template,
//! and durably write it to its destination. Materialization is idempotent:
//!
//! 1. Render the template with its substitutions.
//! 2. Compare the result with the destination's current content. Identical
//!    content means nothing to do.
//! 3. Back up the destination to a timestamped sibling if it exists.
//! 4. Write the result to a temporary file in the destination directory, and
//!    atomically rename it over the destination.
//!
//! Thus, running provisioning twice in a row has no further effect, and a
//! half-written file is never visible.
//!
//! # Root Prefix
//!
//! Every destination is an absolute host path, e.g., `/etc/ssh/sshd_config`.
//! The [`Materializer`] resolves those paths under a root prefix, which is
//! `/` for normal runs.

pub mod block;
pub mod template;

use crate::materialize::{
    block::{BlockEdit, ManagedBlock},
    template::{render, Substitutions},
};

use chrono::Local;
use nix::unistd::{chown, getegid, geteuid, Gid, Uid};
use std::{
    borrow::Cow,
    fs::{self, Permissions},
    io::{ErrorKind, Write},
    os::unix::fs::{MetadataExt, PermissionsExt},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

/// Default permissions for newly created files.
pub const DEFAULT_MODE: u32 = 0o644;

/// Ownership to apply to a materialized file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: Uid,
    pub gid: Gid,
}

/// Configuration file template bound to its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigTemplate {
    pub destination: PathBuf,
    pub content: Cow<'static, str>,
    pub substitutions: Substitutions,
    pub mode: Option<u32>,
    pub owner: Option<Owner>,
}

impl ConfigTemplate {
    /// Construct new template for target destination.
    pub fn new(destination: impl Into<PathBuf>, content: impl Into<Cow<'static, str>>) -> Self {
        Self {
            destination: destination.into(),
            content: content.into(),
            substitutions: Substitutions::default(),
            mode: None,
            owner: None,
        }
    }

    pub fn with_substitutions(mut self, substitutions: Substitutions) -> Self {
        self.substitutions = substitutions;
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_owner(mut self, owner: Option<Owner>) -> Self {
        self.owner = owner;
        self
    }

    /// Render template content.
    ///
    /// # Errors
    ///
    /// - Return [`MaterializeError::Template`] if a placeholder has no
    ///   substitution.
    pub fn render(&self) -> Result<String> {
        Ok(render(&self.content, &self.substitutions)?)
    }
}

/// Outcome of materializing a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    /// Destination already had the rendered content.
    Unchanged { path: PathBuf },

    /// Destination did not exist before.
    Created { path: PathBuf },

    /// Destination was overwritten after being backed up.
    Replaced { path: PathBuf, backup: PathBuf },
}

impl Materialized {
    pub fn path(&self) -> &Path {
        match self {
            Self::Unchanged { path } | Self::Created { path } | Self::Replaced { path, .. } => {
                path
            }
        }
    }

    pub fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged { .. })
    }

    pub fn backup(&self) -> Option<&Path> {
        match self {
            Self::Replaced { backup, .. } => Some(backup),
            _ => None,
        }
    }

    /// Undo materialization.
    ///
    /// Restores the backup over a replaced file, or removes a created file.
    /// The backup itself is kept.
    ///
    /// # Errors
    ///
    /// - Return [`MaterializeError`] if the restore cannot be written.
    #[instrument(skip(self), level = "debug")]
    pub fn rollback(&self) -> Result<()> {
        match self {
            Self::Unchanged { .. } => Ok(()),
            Self::Created { path } => {
                info!("roll back {:?}", path.display());
                fs::remove_file(path).map_err(|source| MaterializeError::Remove {
                    source,
                    path: path.clone(),
                })
            }
            Self::Replaced { path, backup } => {
                info!("restore {:?} from {:?}", path.display(), backup.display());
                let content = fs::read(backup).map_err(|source| MaterializeError::Read {
                    source,
                    path: backup.clone(),
                })?;
                let mode = current_mode(backup)?;
                let owner = current_owner(path)?;
                write_atomic(path, &content, mode, owner)
            }
        }
    }
}

/// Idempotent, atomic configuration file writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materializer {
    root: PathBuf,
}

impl Default for Materializer {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Materializer {
    /// Construct new materializer working under target root prefix.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve host path under root prefix.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        match path.strip_prefix("/") {
            Ok(relative) => self.root.join(relative),
            Err(_) => self.root.join(path),
        }
    }

    /// Read current content of host file, if it exists.
    ///
    /// # Errors
    ///
    /// - Return [`MaterializeError::Read`] if file exists but cannot be read.
    pub fn read(&self, path: impl AsRef<Path>) -> Result<Option<String>> {
        let path = self.resolve(path);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(MaterializeError::Read { source, path }),
        }
    }

    /// Check if template's destination already has the rendered content.
    ///
    /// # Errors
    ///
    /// - Return [`MaterializeError`] if rendering or reading fails.
    pub fn is_current(&self, template: &ConfigTemplate) -> Result<bool> {
        let rendered = template.render()?;
        Ok(self.read(&template.destination)?.as_deref() == Some(rendered.as_str()))
    }

    /// Render template, and write it to its destination.
    ///
    /// # Errors
    ///
    /// - Return [`MaterializeError::Template`] if rendering fails.
    /// - Return [`MaterializeError`] if backup or write fails.
    pub fn materialize(&self, template: &ConfigTemplate) -> Result<Materialized> {
        let rendered = template.render()?;
        self.write(
            &template.destination,
            rendered.as_bytes(),
            template.mode,
            template.owner,
        )
    }

    /// Insert or replace managed block inside a file.
    ///
    /// The file is created if it does not exist yet.
    ///
    /// # Errors
    ///
    /// - Return [`MaterializeError`] if read, backup, or write fails.
    pub fn ensure_block(
        &self,
        path: impl AsRef<Path>,
        block: &ManagedBlock,
        owner: Option<Owner>,
    ) -> Result<Materialized> {
        let current = self.read(path.as_ref())?.unwrap_or_default();
        let mut editor = BlockEdit::from(current);
        editor.upsert(block);

        if !editor.changed() {
            return Ok(Materialized::Unchanged {
                path: self.resolve(path),
            });
        }

        self.write(path, editor.to_string().as_bytes(), None, owner)
    }

    /// Write content to host file idempotently.
    ///
    /// Mode defaults to the mode of the file being replaced, or
    /// [`DEFAULT_MODE`] for new files.
    ///
    /// # Errors
    ///
    /// - Return [`MaterializeError`] if backup or write fails.
    #[instrument(skip_all, level = "debug")]
    pub fn write(
        &self,
        path: impl AsRef<Path>,
        content: &[u8],
        mode: Option<u32>,
        owner: Option<Owner>,
    ) -> Result<Materialized> {
        let path = self.resolve(path);
        let current = match fs::read(&path) {
            Ok(current) => Some(current),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(source) => return Err(MaterializeError::Read { source, path }),
        };

        if current.as_deref() == Some(content) {
            debug!("{:?} already up to date", path.display());
            return Ok(Materialized::Unchanged { path });
        }

        if current.is_none() {
            let mode = mode.unwrap_or(DEFAULT_MODE);
            write_atomic(&path, content, mode, owner)?;
            info!("created {:?}", path.display());
            return Ok(Materialized::Created { path });
        }

        let mode = match mode {
            Some(mode) => mode,
            None => current_mode(&path)?,
        };
        let backup = backup(&path)?;
        write_atomic(&path, content, mode, owner)?;
        info!(
            "replaced {:?}, previous version at {:?}",
            path.display(),
            backup.display()
        );

        Ok(Materialized::Replaced { path, backup })
    }
}

/// Pick unused timestamped backup path for target file.
pub fn backup_path(path: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%dT%H%M%S");
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut candidate = path.with_file_name(format!("{name}.hostprep-{stamp}.bak"));
    let mut counter = 1;

    // INVARIANT: Never overwrite an earlier backup.
    while candidate.exists() {
        candidate = path.with_file_name(format!("{name}.hostprep-{stamp}.{counter}.bak"));
        counter += 1;
    }

    candidate
}

fn backup(path: &Path) -> Result<PathBuf> {
    let backup = backup_path(path);
    fs::copy(path, &backup).map_err(|source| MaterializeError::Backup {
        source,
        path: path.into(),
        backup: backup.clone(),
    })?;

    Ok(backup)
}

fn current_mode(path: &Path) -> Result<u32> {
    fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o7777)
        .map_err(|source| MaterializeError::Read {
            source,
            path: path.into(),
        })
}

/// Ownership of an existing file, if it differs from our own.
fn current_owner(path: &Path) -> Result<Option<Owner>> {
    let meta = fs::metadata(path).map_err(|source| MaterializeError::Read {
        source,
        path: path.into(),
    })?;
    let owner = Owner {
        uid: Uid::from_raw(meta.uid()),
        gid: Gid::from_raw(meta.gid()),
    };

    Ok((owner.uid != geteuid() || owner.gid != getegid()).then_some(owner))
}

fn write_atomic(path: &Path, content: &[u8], mode: u32, owner: Option<Owner>) -> Result<()> {
    let write_err = |source| MaterializeError::Write {
        source,
        path: path.into(),
    };

    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    // INVARIANT: Create missing parent directories, owned like the file.
    let created = mkdirp::mkdirp(parent).map_err(write_err)?;
    if let (Some(first), Some(owner)) = (created, owner) {
        for dir in parent.ancestors().take_while(|dir| dir.starts_with(&first)) {
            chown(dir, Some(owner.uid), Some(owner.gid))
                .map_err(|errno| write_err(errno.into()))?;
        }
    }

    let mut temp = NamedTempFile::new_in(parent).map_err(write_err)?;
    temp.write_all(content).map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;
    fs::set_permissions(temp.path(), Permissions::from_mode(mode)).map_err(write_err)?;

    if let Some(owner) = owner {
        chown(temp.path(), Some(owner.uid), Some(owner.gid))
            .map_err(|errno| write_err(errno.into()))?;
    }

    temp.persist(path)
        .map_err(|err| write_err(err.error))?;

    Ok(())
}

/// Materialization error types.
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    /// Template rendering failed.
    #[error(transparent)]
    Template(#[from] crate::materialize::template::TemplateError),

    /// Existing file could not be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Existing file could not be backed up.
    #[error("failed to back up {:?} to {:?}", path.display(), backup.display())]
    Backup {
        #[source]
        source: std::io::Error,
        path: PathBuf,
        backup: PathBuf,
    },

    /// New content could not be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File could not be removed.
    #[error("failed to remove {:?}", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = MaterializeError> = std::result::Result<T, E>;
