//! Persistent storage for aggregated readings.
//!
//! Uses JSON files organized by year/month for efficient lookup. The core
//! only ever appends via [`SnapshotStore::insert`] and reads back through
//! [`SnapshotStore::query_from`]; the query path serves the UI.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};

use crate::error::Result;
use crate::types::AggregateSnapshot;

/// Append/query capability for aggregated readings, keyed by timestamp.
pub trait SnapshotStore: Send + Sync {
    /// Appends one snapshot.
    fn insert(&self, snapshot: &AggregateSnapshot) -> Result<()>;

    /// Returns every stored snapshot with `timestamp >= from`, ascending.
    fn query_from(&self, from: DateTime<Utc>) -> Result<Vec<AggregateSnapshot>>;
}

/// File-backed storage for ringd data.
#[derive(Debug, Clone)]
pub struct Storage {
    data_dir: PathBuf,
}

impl Storage {
    /// Create a new storage instance rooted at `data_dir`.
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Open storage at the default location.
    ///
    /// On Linux: `/var/lib/ringd/`. Elsewhere (development):
    /// the platform data directory for `ringd`.
    pub fn open_default() -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            Ok(Self::new(PathBuf::from("/var/lib/ringd")))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let dirs = directories::ProjectDirs::from("", "", "ringd").ok_or_else(|| {
                crate::error::RingdError::PersistenceError("Cannot determine data directory".into())
            })?;
            Ok(Self::new(dirs.data_dir().to_path_buf()))
        }
    }

    fn readings_dir(&self) -> PathBuf {
        self.data_dir.join("readings")
    }

    fn month_path(&self, year: i32, month: u32) -> PathBuf {
        self.readings_dir()
            .join(format!("{year}"))
            .join(format!("{month:02}.json"))
    }

    fn load_month(&self, path: &Path) -> Result<Vec<AggregateSnapshot>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)?;
        let snapshots: Vec<AggregateSnapshot> = serde_json::from_str(&content)?;
        Ok(snapshots)
    }
}

impl SnapshotStore for Storage {
    fn insert(&self, snapshot: &AggregateSnapshot) -> Result<()> {
        let path = self.month_path(snapshot.timestamp.year(), snapshot.timestamp.month());
        let mut snapshots = self.load_month(&path)?;
        snapshots.push(snapshot.clone());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&snapshots)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn query_from(&self, from: DateTime<Utc>) -> Result<Vec<AggregateSnapshot>> {
        let readings_dir = self.readings_dir();
        if !readings_dir.exists() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for year_entry in std::fs::read_dir(&readings_dir)? {
            let year_dir = year_entry?.path();
            if !year_dir.is_dir() {
                continue;
            }
            // Skip whole years that end before the query window starts.
            if let Some(year) = year_dir
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.parse::<i32>().ok())
            {
                if year < from.year() {
                    continue;
                }
            }
            for month_entry in std::fs::read_dir(&year_dir)? {
                let month_path = month_entry?.path();
                if month_path.extension().map_or(true, |ext| ext != "json") {
                    continue;
                }
                for snapshot in self.load_month(&month_path)? {
                    if snapshot.timestamp >= from {
                        results.push(snapshot);
                    }
                }
            }
        }

        results.sort_by_key(|snapshot| snapshot.timestamp);
        Ok(results)
    }
}
