//! Provisioning file planning.
//!
//! A declared file set is expanded into an ordered transfer plan before any
//! remote call is made. Every entry is checked even after a failure so the
//! operator sees all problems in one pass.

use std::fmt;
use std::io::{self, Cursor};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};
use shell_escape::unix::escape;
use thiserror::Error;
use tokio::io::AsyncRead;

/// A file to place on a host, either copied from a local `source` or written
/// from inline `content`.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(default)]
pub struct FileSpec {
    /// Local path to copy from. Mutually exclusive with `content`.
    pub source: Option<String>,
    /// Literal content to write. Mutually exclusive with `source`.
    pub content: Option<String>,
    /// Remote path, used as-is.
    pub destination: String,
    /// Mode passed to `chmod` after the copy.
    pub permissions: Option<String>,
    /// Owner passed to `chown` after the copy.
    pub owner: Option<String>,
    /// Group passed to `chgrp` after the copy.
    pub group: Option<String>,
}

impl FileSpec {
    /// Returns `true` when both entries describe the same payload at the same
    /// destination and differ at most in permissions, owner, or group.
    #[must_use]
    pub fn same_payload(&self, other: &Self) -> bool {
        self.destination == other.destination
            && present(self.source.as_ref()) == present(other.source.as_ref())
            && present(self.content.as_ref()) == present(other.content.as_ref())
    }
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|text| !text.is_empty())
}

/// Problems found with a single declared file.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PlanError {
    /// Raised when both `source` and `content` are set.
    #[error("file for `{destination}` sets both source and content")]
    BothSourceAndContent {
        /// Destination of the offending entry.
        destination: String,
    },
    /// Raised when neither `source` nor `content` is set.
    #[error("file for `{destination}` needs either source or content")]
    NeitherSourceNorContent {
        /// Destination of the offending entry.
        destination: String,
    },
    /// Raised when `destination` is empty.
    #[error("file entry has no destination")]
    MissingDestination,
    /// Raised when a source cannot be opened or inspected.
    #[error("failed to read file source `{path}`: {message}")]
    Unreadable {
        /// Expanded source path.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Every problem found in a declared file set.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PlanErrors(pub Vec<PlanError>);

impl PlanErrors {
    /// Returns the individual problems.
    #[must_use]
    pub fn errors(&self) -> &[PlanError] {
        &self.0
    }
}

impl fmt::Display for PlanErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PlanErrors {}

/// Where the bytes of a planned file come from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FilePayload {
    /// A local file, reopened at transfer time.
    Source(Utf8PathBuf),
    /// Inline content.
    Content(String),
}

/// A validated file ready for transfer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlannedFile {
    /// Bytes to send.
    pub payload: FilePayload,
    /// Size captured at plan time.
    pub size: u64,
    /// Remote path.
    pub destination: String,
    /// Optional `chmod` mode.
    pub permissions: Option<String>,
    /// Optional `chown` owner.
    pub owner: Option<String>,
    /// Optional `chgrp` group.
    pub group: Option<String>,
}

impl PlannedFile {
    /// Opens the payload for streaming and returns it with its current size.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when a source file can no longer be opened.
    pub fn open(&self) -> io::Result<(Box<dyn AsyncRead + Send + Unpin>, u64)> {
        match &self.payload {
            FilePayload::Source(path) => {
                let file = open_ambient(path)?;
                let size = file.metadata()?.len();
                Ok((Box::new(tokio::fs::File::from_std(file.into_std())), size))
            }
            FilePayload::Content(content) => Ok((
                Box::new(Cursor::new(content.clone().into_bytes())),
                self.size,
            )),
        }
    }

    /// Remote commands applying the declared mode and ownership.
    #[must_use]
    pub fn post_copy_commands(&self) -> Vec<String> {
        let destination = escape(self.destination.as_str().into());
        [
            ("chmod", self.permissions.as_ref()),
            ("chown", self.owner.as_ref()),
            ("chgrp", self.group.as_ref()),
        ]
        .into_iter()
        .filter_map(|(program, value)| {
            present(value)
                .map(|arg| format!("{program} {} {destination}", escape(arg.into())))
        })
        .collect()
    }
}

/// Validates `files` and returns the transfer plan in iteration order.
///
/// # Errors
///
/// Returns [`PlanErrors`] holding every problem found across all entries.
pub fn plan_files<'a>(files: impl IntoIterator<Item = &'a FileSpec>) -> Result<Vec<PlannedFile>, PlanErrors> {
    let mut planned = Vec::new();
    let mut errors = Vec::new();

    for file in files {
        match plan_one(file) {
            Ok(entry) => planned.push(entry),
            Err(mut found) => errors.append(&mut found),
        }
    }

    if errors.is_empty() {
        Ok(planned)
    } else {
        Err(PlanErrors(errors))
    }
}

fn plan_one(file: &FileSpec) -> Result<PlannedFile, Vec<PlanError>> {
    let mut errors = Vec::new();
    let destination = file.destination.clone();
    if destination.trim().is_empty() {
        errors.push(PlanError::MissingDestination);
    }

    let payload = match (present(file.source.as_ref()), present(file.content.as_ref())) {
        (Some(_), Some(_)) => {
            errors.push(PlanError::BothSourceAndContent {
                destination: destination.clone(),
            });
            None
        }
        (None, None) => {
            errors.push(PlanError::NeitherSourceNorContent {
                destination: destination.clone(),
            });
            None
        }
        (Some(source), None) => {
            let path = Utf8PathBuf::from(expand_tilde(source));
            match stat_source(&path) {
                Ok(size) => Some((FilePayload::Source(path), size)),
                Err(err) => {
                    errors.push(PlanError::Unreadable {
                        path: path.into_string(),
                        message: err.to_string(),
                    });
                    None
                }
            }
        }
        (None, Some(content)) => {
            let size = u64::try_from(content.len()).unwrap_or(u64::MAX);
            Some((FilePayload::Content(content.to_owned()), size))
        }
    };

    match payload {
        Some((resolved, size)) if errors.is_empty() => Ok(PlannedFile {
            payload: resolved,
            size,
            destination,
            permissions: file.permissions.clone(),
            owner: file.owner.clone(),
            group: file.group.clone(),
        }),
        _ => Err(errors),
    }
}

/// Opens `path` briefly to confirm it is a readable regular file and returns
/// its size. The handle is closed before returning.
fn stat_source(path: &Utf8Path) -> io::Result<u64> {
    let file = open_ambient(path)?;
    let metadata = file.metadata()?;
    if !metadata.is_file() {
        return Err(io::Error::other("not a regular file"));
    }
    Ok(metadata.len())
}

fn open_ambient(path: &Utf8Path) -> io::Result<cap_std::fs_utf8::File> {
    let (dir_path, file_path) = if path.is_absolute() {
        let parent = path
            .parent()
            .ok_or_else(|| io::Error::other(format!("path has no parent directory: {path}")))?;
        let file_name = path
            .file_name()
            .ok_or_else(|| io::Error::other(format!("path has no file name: {path}")))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path)
    };

    let dir = Dir::open_ambient_dir(dir_path, ambient_authority())?;
    dir.open(file_path)
}

/// Expands a leading `~/` prefix to the user's home directory.
///
/// Paths are returned unchanged when `HOME` is not set.
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

#[cfg(test)]
mod tests;
