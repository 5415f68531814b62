//! Durable session storage.
//!
//! One JSON file per finished session. Delivery state is encoded entirely in
//! the filename: a record is renamed with the `-up.json` suffix once the
//! collector confirms receipt, so a plain directory listing after a restart
//! fully recovers pipeline state without any index.
//!
//! Writes are atomic: the whole record is serialized, written to a `.tmp`
//! sibling, and renamed into place, so a reader never observes a
//! half-written record.

use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use crewlog_protocol::SessionRecord;
use thiserror::Error;
use uuid::Uuid;

/// Suffix replacing `.json` once a record is confirmed delivered.
pub const DELIVERED_SUFFIX: &str = "-up.json";

const PENDING_SUFFIX: &str = ".json";

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Filename deterministic from (creation time, session id prefix):
    /// sorts chronologically by name and cannot collide across concurrent
    /// sessions.
    pub fn file_name(started_at: DateTime<Utc>, session_id: Uuid) -> String {
        let stamp = started_at.format("%Y%m%d_%H%M%S");
        let id = session_id.simple().to_string();
        let prefix = &id[..8];
        format!("session_{stamp}_{prefix}{PENDING_SUFFIX}")
    }

    /// Serializes the whole record and writes it in a single atomic step.
    /// One attempt per session end; the caller logs and moves on if this
    /// fails.
    pub fn write(&self, record: &SessionRecord) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::CreateDir {
            dir: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(Self::file_name(record.started_at, record.session_id));
        let body = serde_json::to_vec_pretty(record).map_err(StoreError::Encode)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|source| StoreError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Rename {
            path: tmp.clone(),
            source,
        })?;
        Ok(path)
    }

    pub fn load(&self, path: &Path) -> Result<SessionRecord, StoreError> {
        let raw = fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Records not yet confirmed delivered, oldest first. Anything that is
    /// not a pending record file (delivered records, temp files, the
    /// installation id file) is ignored.
    pub fn pending(&self) -> Result<Vec<PathBuf>, StoreError> {
        Ok(self
            .scan()?
            .into_iter()
            .filter_map(|(path, delivered)| (!delivered).then_some(path))
            .collect())
    }

    /// Every record in the store with its delivery state, oldest first.
    pub fn entries(&self) -> Result<Vec<(PathBuf, bool)>, StoreError> {
        self.scan()
    }

    fn scan(&self) -> Result<Vec<(PathBuf, bool)>, StoreError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|source| StoreError::Read {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(OsStr::to_str) else {
                continue;
            };
            if name.ends_with(DELIVERED_SUFFIX) {
                entries.push((path, true));
            } else if name.ends_with(PENDING_SUFFIX) {
                entries.push((path, false));
            }
        }
        entries.sort();
        Ok(entries)
    }

    /// Renames a delivered record to its `-up.json` identity so later
    /// backlog scans skip it. Idempotent.
    pub fn mark_delivered(&self, path: &Path) -> Result<PathBuf, StoreError> {
        if Self::is_delivered(path) {
            return Ok(path.to_path_buf());
        }
        let Some(name) = path.file_name().and_then(OsStr::to_str) else {
            return Err(StoreError::Rename {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "non-utf8 file name"),
            });
        };
        let delivered_name = match name.strip_suffix(PENDING_SUFFIX) {
            Some(stem) => format!("{stem}{DELIVERED_SUFFIX}"),
            None => format!("{name}{DELIVERED_SUFFIX}"),
        };
        let delivered = path.with_file_name(delivered_name);
        fs::rename(path, &delivered).map_err(|source| StoreError::Rename {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(delivered)
    }

    pub fn is_delivered(path: &Path) -> bool {
        path.file_name()
            .and_then(OsStr::to_str)
            .is_some_and(|name| name.ends_with(DELIVERED_SUFFIX))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create storage dir {dir}: {source}")]
    CreateDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode session record: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to parse session record {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to rename {path}: {source}")]
    Rename {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
