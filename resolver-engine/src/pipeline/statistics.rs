//! Batch run statistics
//!
//! Per-phase counters aggregated into the run report returned by the
//! trigger surface. Every phase returns its stats even on early abort.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Counters shared by every phase
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PhaseStats {
    /// Entities examined
    pub processed: usize,
    /// Merges performed (groups or performers)
    pub merged: usize,
    /// Rows created (groups, performers, links)
    pub created: usize,
    /// Entities skipped: already handled, constraint hits, no counterpart
    pub skipped: usize,
    /// Per-entity errors swallowed by the phase loop
    pub errors: usize,
}

impl PhaseStats {
    /// Fold a per-record outcome into the counters
    pub fn add(&mut self, other: PhaseStats) {
        self.processed += other.processed;
        self.merged += other.merged;
        self.created += other.created;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

impl std::fmt::Display for PhaseStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processed, {} merged, {} created, {} skipped, {} errors",
            self.processed, self.merged, self.created, self.skipped, self.errors
        )
    }
}

/// How a phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Ran to completion
    Completed,
    /// Never started: budget exhausted or excluded by the request
    Skipped,
    /// Started but stopped early (budget or consecutive-error cap)
    Aborted,
}

/// One phase's slice of the run report
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: &'static str,
    pub status: PhaseStatus,
    pub stats: PhaseStats,
    pub duration_ms: u64,
}

/// Full report for one batch run. Always produced, even when the run
/// fails: operator-visible failure is a structured result, never a bare
/// crash.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub mode: super::BatchMode,
    pub dry_run: bool,
    pub success: bool,
    /// Present when the run failed or aborted early
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub total_duration_ms: u64,
    pub phases: Vec<PhaseReport>,
    /// First phase that did not complete; re-invoking resumes there
    /// because every phase is re-entrant
    pub resume_from: Option<&'static str>,
}

impl BatchReport {
    /// Sum of counters across phases
    pub fn totals(&self) -> PhaseStats {
        let mut totals = PhaseStats::default();
        for phase in &self.phases {
            totals.add(phase.stats);
        }
        totals
    }
}
