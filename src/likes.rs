//! Liked days, persisted across sessions.
//!
//! On disk the set is a JSON array of `YYYY-MM-DD` strings. A missing file
//! is an empty set. Entries that are not valid day-keys are ignored for
//! lookups but written back unchanged on save, and a file that cannot be
//! read at all is never overwritten.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{DayKey, format_day, parse_day};

const LIKES_FILE: &str = "liked.json";

#[derive(Error, Debug)]
pub enum LikesError {
    #[error("Failed to access likes file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse likes file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Set of liked day-keys, optionally bound to a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LikedSet {
    days: BTreeSet<DayKey>,
    /// Entries from the file that are not day-keys, kept for the next save.
    unrecognized: Vec<serde_json::Value>,
    path: Option<PathBuf>,
}

impl LikedSet {
    /// In-memory set with no backing file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the likes file in the platform data dir.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("gov", "nasa", "apod-browse").map_or_else(
            || PathBuf::from(LIKES_FILE),
            |dirs| dirs.data_dir().join(LIKES_FILE),
        )
    }

    /// Load from `path`, starting empty if the file is absent.
    ///
    /// An unreadable or corrupt file yields an empty in-memory set that is
    /// not bound to `path`, so later saves leave the file alone.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::try_load(&path) {
            Ok(set) => set,
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "ignoring unreadable likes file; changes will not be saved"
                );
                Self::new()
            }
        }
    }

    /// Load from `path`; a missing file is an empty set, other failures are errors.
    pub fn try_load(path: &Path) -> Result<Self, LikesError> {
        let mut set = match std::fs::read_to_string(path) {
            Ok(content) => Self::from_json(&content)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::new(),
            Err(source) => {
                return Err(LikesError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        debug!(
            path = %path.display(),
            count = set.days.len(),
            unrecognized = set.unrecognized.len(),
            "loaded likes"
        );
        set.path = Some(path.to_path_buf());
        Ok(set)
    }

    /// Write the set to its backing file. No-op for an in-memory set.
    pub fn save(&self) -> Result<(), LikesError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| LikesError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, self.to_json()?).map_err(|source| LikesError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns true if the day was not already liked.
    pub fn like(&mut self, day: DayKey) -> bool {
        self.days.insert(day)
    }

    /// Returns true if the day was liked.
    pub fn unlike(&mut self, day: DayKey) -> bool {
        self.days.remove(&day)
    }

    /// Flip the like-state of `day`, returning the new state.
    pub fn toggle(&mut self, day: DayKey) -> bool {
        if self.days.remove(&day) {
            false
        } else {
            self.days.insert(day);
            true
        }
    }

    pub fn contains(&self, day: DayKey) -> bool {
        self.days.contains(&day)
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Liked days in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = DayKey> + '_ {
        self.days.iter().copied()
    }

    /// Entries kept from the file that are not valid day-keys.
    pub fn unrecognized(&self) -> &[serde_json::Value] {
        &self.unrecognized
    }

    /// Liked days as day-key strings, followed by any unrecognized entries.
    pub fn to_json(&self) -> Result<String, LikesError> {
        let entries: Vec<serde_json::Value> = self
            .days
            .iter()
            .map(|d| serde_json::Value::String(format_day(*d)))
            .chain(self.unrecognized.iter().cloned())
            .collect();
        Ok(serde_json::to_string(&entries)?)
    }

    /// Parse a JSON array of day-key strings. Invalid entries are set aside.
    pub fn from_json(content: &str) -> Result<Self, LikesError> {
        let raw: Vec<serde_json::Value> = serde_json::from_str(content)?;
        let mut set = Self::new();
        for value in raw {
            match value.as_str().map(parse_day) {
                Some(Ok(day)) => {
                    set.days.insert(day);
                }
                _ => {
                    debug!(entry = %value, "keeping unrecognized liked entry");
                    set.unrecognized.push(value);
                }
            }
        }
        Ok(set)
    }
}
