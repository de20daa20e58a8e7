//! In-process job registry for indexing runs
//!
//! Guarantees at most one active run per library, tracks run status through
//! explicit transitions, and hands out cancellation tokens. Status lives
//! behind a single mutex; there is no window where two runs can both claim
//! the same library.

use crate::error::{Error, Result};
use crate::models::{IndexingStats, RunStatus};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Snapshot of a job's state
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub library_id: String,
    pub status: RunStatus,
    pub stats: Option<IndexingStats>,
    pub error: Option<String>,
}

struct JobEntry {
    status: RunStatus,
    cancel: CancellationToken,
    stats: Option<IndexingStats>,
    error: Option<String>,
}

/// Claim on a running job; pass its token into the indexing run
pub struct JobClaim {
    pub library_id: String,
    pub cancel: CancellationToken,
}

/// Registry of indexing jobs, one slot per library
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the run slot for a library. Fails when a run is already active;
    /// a finished previous run is replaced.
    pub fn begin(&self, library_id: &str) -> Result<JobClaim> {
        let mut jobs = self.lock();

        if let Some(entry) = jobs.get(library_id) {
            if entry.status == RunStatus::Running {
                return Err(Error::JobAlreadyRunning(library_id.to_string()));
            }
        }

        let cancel = CancellationToken::new();
        jobs.insert(
            library_id.to_string(),
            JobEntry {
                status: RunStatus::Running,
                cancel: cancel.clone(),
                stats: None,
                error: None,
            },
        );

        Ok(JobClaim {
            library_id: library_id.to_string(),
            cancel,
        })
    }

    /// Record a finished run. The terminal status comes from the stats.
    pub fn finish(&self, library_id: &str, stats: IndexingStats) {
        let mut jobs = self.lock();
        if let Some(entry) = jobs.get_mut(library_id) {
            entry.status = stats.status;
            entry.stats = Some(stats);
        }
    }

    /// Record a run that failed before producing stats
    pub fn fail(&self, library_id: &str, error: &Error) {
        let mut jobs = self.lock();
        if let Some(entry) = jobs.get_mut(library_id) {
            entry.status = RunStatus::Error;
            entry.error = Some(error.to_string());
        }
    }

    /// Request cancellation of an active run. Returns false when no run is
    /// active for the library.
    pub fn cancel(&self, library_id: &str) -> bool {
        let jobs = self.lock();
        match jobs.get(library_id) {
            Some(entry) if entry.status == RunStatus::Running => {
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Current status of a library's most recent run
    pub fn status(&self, library_id: &str) -> Option<JobStatus> {
        let jobs = self.lock();
        jobs.get(library_id).map(|entry| JobStatus {
            library_id: library_id.to_string(),
            status: entry.status,
            stats: entry.stats.clone(),
            error: entry.error.clone(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, JobEntry>> {
        // A poisoned registry mutex means a panic mid-update; the map itself
        // stays usable
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}
