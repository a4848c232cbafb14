//! Collection runs: visit dormitories one by one, fetch a snapshot and append it.
//!
//! A failure for one dormitory is logged and recorded in the run summary; the
//! run moves on to the next one. Runs for the same dormitory never overlap,
//! whether they come from the schedule or from an API call.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::locks::KeyedLocks;
use crate::models::Snapshot;
use crate::portal::SnapshotSource;
use crate::registry::{Dormitory, DormitoryRegistry};
use crate::store::SnapshotStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    PartiallyFailed,
}

/// Where in the pipeline a dormitory's collection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureStage {
    Auth,
    Fetch,
    Store,
    Internal,
}

impl FailureStage {
    fn of(err: &AppError) -> Self {
        match err {
            AppError::Auth(_) => FailureStage::Auth,
            AppError::Fetch(_) | AppError::Http(_) => FailureStage::Fetch,
            AppError::Store(_) | AppError::Io(_) | AppError::Json(_) => FailureStage::Store,
            _ => FailureStage::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum EntityOutcome {
    Stored { snapshot: Box<Snapshot> },
    Duplicate { snapshot: Box<Snapshot> },
    Failed { stage: FailureStage, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityReport {
    pub dormitory_id: String,
    #[serde(flatten)]
    pub outcome: EntityOutcome,
}

impl EntityReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, EntityOutcome::Failed { .. })
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match &self.outcome {
            EntityOutcome::Stored { snapshot } | EntityOutcome::Duplicate { snapshot } => {
                Some(snapshot)
            }
            EntityOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<EntityReport>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_failure()).count()
    }
}

pub struct Collector {
    source: Arc<dyn SnapshotSource>,
    store: Arc<SnapshotStore>,
    registry: Arc<DormitoryRegistry>,
    locks: KeyedLocks,
    pacing: Duration,
    status: Mutex<RunStatus>,
}

impl Collector {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        store: Arc<SnapshotStore>,
        registry: Arc<DormitoryRegistry>,
        pacing: Duration,
    ) -> Self {
        Self {
            source,
            store,
            registry,
            locks: KeyedLocks::new(),
            pacing,
            status: Mutex::new(RunStatus::Idle),
        }
    }

    /// Status of the most recent full run.
    pub fn status(&self) -> RunStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: RunStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    /// Collect every registered dormitory, pausing between them.
    pub async fn run_all(&self) -> RunSummary {
        let started_at = Utc::now();
        self.set_status(RunStatus::Running);

        let dormitories = self.registry.list();
        tracing::info!(count = dormitories.len(), "collection run started");

        let mut results = Vec::with_capacity(dormitories.len());
        for (i, dormitory) in dormitories.iter().enumerate() {
            if i > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            results.push(self.collect(dormitory).await);
        }

        let status = if results.iter().any(EntityReport::is_failure) {
            RunStatus::PartiallyFailed
        } else {
            RunStatus::Completed
        };
        self.set_status(status);

        let summary = RunSummary {
            status,
            started_at,
            finished_at: Utc::now(),
            results,
        };

        tracing::info!(
            status = ?summary.status,
            total = summary.results.len(),
            failed = summary.failed(),
            "collection run finished"
        );
        summary
    }

    /// Collect a single dormitory by id.
    pub async fn collect_one(&self, dormitory_id: &str) -> Result<EntityReport> {
        let dormitory = self
            .registry
            .get(dormitory_id)
            .ok_or_else(|| AppError::NotFound(format!("dormitory {} not found", dormitory_id)))?;

        Ok(self.collect(&dormitory).await)
    }

    async fn collect(&self, dormitory: &Dormitory) -> EntityReport {
        let _run = self.locks.lock(&dormitory.id).await;

        let outcome = match self.fetch_and_store(dormitory).await {
            Ok((snapshot, true)) => {
                tracing::info!(
                    dormitory_id = %dormitory.id,
                    balance = snapshot.balance(),
                    "snapshot stored"
                );
                EntityOutcome::Stored {
                    snapshot: Box::new(snapshot),
                }
            }
            Ok((snapshot, false)) => EntityOutcome::Duplicate {
                snapshot: Box::new(snapshot),
            },
            Err(e) => {
                let stage = FailureStage::of(&e);
                tracing::warn!(
                    dormitory_id = %dormitory.id,
                    stage = ?stage,
                    error = %e,
                    "collection failed"
                );
                EntityOutcome::Failed {
                    stage,
                    message: e.to_string(),
                }
            }
        };

        EntityReport {
            dormitory_id: dormitory.id.clone(),
            outcome,
        }
    }

    async fn fetch_and_store(&self, dormitory: &Dormitory) -> Result<(Snapshot, bool)> {
        let snapshot = self.source.collect(dormitory).await?;
        let outcome = self.store.append(&snapshot).await?;
        Ok((snapshot, outcome.stored))
    }
}
