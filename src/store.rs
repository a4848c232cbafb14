//! File-backed, per-dormitory snapshot series.
//!
//! Layout under the data directory:
//!
//! ```text
//! <data_dir>/<dormitory_id>/<YYYY-MM-DD>.json   snapshots captured that day
//! <data_dir>/<dormitory_id>/latest.json         most recent snapshot
//! ```
//!
//! A series never holds two snapshots with the same (date, time) and never
//! more than `retention` snapshots; the oldest go first. `latest.json` is not
//! subject to trimming.

use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::locks::KeyedLocks;
use crate::models::Snapshot;

const LATEST_FILE: &str = "latest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppendOutcome {
    pub stored: bool,
}

#[derive(Debug)]
pub struct SnapshotStore {
    root: PathBuf,
    retention: usize,
    writers: KeyedLocks,
}

fn store_err(action: &str, path: &Path, err: impl std::fmt::Display) -> AppError {
    AppError::Store(format!("{} {}: {}", action, path.display(), err))
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            root: root.into(),
            retention: retention.max(1),
            writers: KeyedLocks::new(),
        }
    }

    /// Create the data directory if it does not exist yet.
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| store_err("creating", &self.root, e))
    }

    fn series_dir(&self, dormitory_id: &str) -> PathBuf {
        self.root.join(dormitory_id)
    }

    fn day_path(&self, dormitory_id: &str, date: NaiveDate) -> PathBuf {
        self.series_dir(dormitory_id)
            .join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    fn latest_path(&self, dormitory_id: &str) -> PathBuf {
        self.series_dir(dormitory_id).join(LATEST_FILE)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| store_err("decoding", path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(store_err("reading", path, e)),
        }
    }

    /// Write through a temp file and rename so readers never see a torn file.
    async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| store_err("encoding", path, e))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| store_err("writing", &tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| store_err("replacing", path, e))
    }

    async fn read_day(&self, dormitory_id: &str, date: NaiveDate) -> Result<Vec<Snapshot>> {
        Ok(Self::read_json(&self.day_path(dormitory_id, date))
            .await?
            .unwrap_or_default())
    }

    /// Dates that have a day file, oldest first.
    async fn days(&self, dormitory_id: &str) -> Result<Vec<NaiveDate>> {
        let dir = self.series_dir(dormitory_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(store_err("listing", &dir, e)),
        };

        let mut days = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| store_err("listing", &dir, e))?
        {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") {
                days.push(date);
            }
        }

        days.sort();
        Ok(days)
    }

    /// Append a snapshot unless one with the same (date, time) already exists.
    ///
    /// `stored` is false when nothing was kept: a duplicate, or a late
    /// snapshot older than everything in a series that is already full.
    pub async fn append(&self, snapshot: &Snapshot) -> Result<AppendOutcome> {
        let id = snapshot.dormitory_id.as_str();
        let _writer = self.writers.lock(id).await;

        let dir = self.series_dir(id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| store_err("creating", &dir, e))?;

        let mut day = self.read_day(id, snapshot.date).await?;
        if day.iter().any(|s| s.capture_key() == snapshot.capture_key()) {
            tracing::debug!(
                dormitory_id = %id,
                date = %snapshot.date,
                time = %snapshot.time,
                "snapshot already recorded, skipping"
            );
            return Ok(AppendOutcome { stored: false });
        }

        // A full series would trim a snapshot older than all it holds right away.
        let series = self.series(id).await?;
        let total: usize = series.iter().map(|(_, s)| s.len()).sum();
        let oldest = series.iter().find_map(|(_, s)| s.first());
        if total >= self.retention && oldest.is_some_and(|o| snapshot.timestamp < o.timestamp) {
            tracing::debug!(
                dormitory_id = %id,
                timestamp = %snapshot.timestamp,
                "snapshot older than the retained series, skipping"
            );
            return Ok(AppendOutcome { stored: false });
        }

        day.push(snapshot.clone());
        day.sort_by_key(|s| s.timestamp);
        Self::write_json(&self.day_path(id, snapshot.date), &day).await?;

        let newer = match self.latest(id).await? {
            Some(current) => snapshot.timestamp >= current.timestamp,
            None => true,
        };
        if newer {
            Self::write_json(&self.latest_path(id), snapshot).await?;
        }

        self.trim(id).await?;
        Ok(AppendOutcome { stored: true })
    }

    /// Every day file of a series, oldest first.
    async fn series(&self, dormitory_id: &str) -> Result<Vec<(NaiveDate, Vec<Snapshot>)>> {
        let days = self.days(dormitory_id).await?;
        let mut per_day = Vec::with_capacity(days.len());
        for date in days {
            let snapshots = self.read_day(dormitory_id, date).await?;
            per_day.push((date, snapshots));
        }
        Ok(per_day)
    }

    /// Drop the oldest snapshots until the series fits the retention cap.
    async fn trim(&self, dormitory_id: &str) -> Result<()> {
        let per_day = self.series(dormitory_id).await?;

        let total: usize = per_day.iter().map(|(_, s)| s.len()).sum();
        let mut excess = total.saturating_sub(self.retention);
        if excess == 0 {
            return Ok(());
        }

        for (date, mut snapshots) in per_day {
            if excess == 0 {
                break;
            }
            let path = self.day_path(dormitory_id, date);
            if snapshots.len() <= excess {
                excess -= snapshots.len();
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| store_err("removing", &path, e))?;
            } else {
                snapshots.drain(..excess);
                excess = 0;
                Self::write_json(&path, &snapshots).await?;
            }
        }

        tracing::debug!(
            dormitory_id = %dormitory_id,
            retention = self.retention,
            dropped = total - self.retention,
            "trimmed snapshot series"
        );
        Ok(())
    }

    pub async fn latest(&self, dormitory_id: &str) -> Result<Option<Snapshot>> {
        Self::read_json(&self.latest_path(dormitory_id)).await
    }

    /// Snapshots captured within the last `window_days` days, oldest first.
    pub async fn history(&self, dormitory_id: &str, window_days: u32) -> Result<Vec<Snapshot>> {
        self.history_at(dormitory_id, window_days, Utc::now()).await
    }

    pub async fn history_at(
        &self,
        dormitory_id: &str,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Snapshot>> {
        let cutoff = now
            .checked_sub_signed(Duration::days(i64::from(window_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        // Day files are labelled in local time, so allow one day of slack
        // before filtering on the exact instant.
        let first_day = cutoff
            .date_naive()
            .checked_sub_days(Days::new(1))
            .unwrap_or(NaiveDate::MIN);

        let mut history = Vec::new();
        for date in self.days(dormitory_id).await? {
            if date < first_day {
                continue;
            }
            history.extend(
                self.read_day(dormitory_id, date)
                    .await?
                    .into_iter()
                    .filter(|s| s.timestamp >= cutoff),
            );
        }

        history.sort_by_key(|s| s.timestamp);
        Ok(history)
    }

    /// Number of snapshots currently kept for a dormitory.
    #[cfg(test)]
    async fn len(&self, dormitory_id: &str) -> Result<usize> {
        let mut total = 0;
        for date in self.days(dormitory_id).await? {
            total += self.read_day(dormitory_id, date).await?.len();
        }
        Ok(total)
    }
}
