//! Cross-source propagation & performer dedup pipeline
//!
//! An ordered sequence of idempotent phases, each safe to re-run and each
//! scoped, where possible, to the entities touched by earlier phases in
//! the same run. The orchestrator enforces a wall-clock budget, checked
//! at outer-loop granularity inside every phase, and aggregates per-phase
//! statistics into one report.
//!
//! # Phase order
//! resolution → lookup_links → propagation → key_dedup → fuzzy_dedup →
//! fake_merge → debut_backfill → stat_resync

mod phase_backfill;
mod phase_fake_merge;
mod phase_fuzzy_dedup;
mod phase_key_dedup;
mod phase_lookup_links;
mod phase_propagation;
mod phase_resolution;
mod phase_resync;
pub mod statistics;

pub use statistics::{BatchReport, PhaseReport, PhaseStats, PhaseStatus};

use crate::performers::PerformerStore;
use crate::resolver::ResolutionOrchestrator;
use chrono::Utc;
use resolver_common::{Config, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::time::Instant;
use uuid::Uuid;

/// Run mode for the trigger surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Process everything within the limit
    Full,
    /// Pick up from current table state; equivalent semantics, smaller
    /// default scope. A crashed run is resumed by simply re-invoking.
    Incremental,
}

/// Parameters accepted by the idempotent trigger entry point
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub mode: BatchMode,
    /// Per-phase record cap; defaults from config
    pub limit: Option<i64>,
    /// Restrict the resolution sweep to these sources
    #[serde(default)]
    pub target_sources: Option<Vec<String>>,
    /// Perform all reads and scoring but suppress writes
    #[serde(default)]
    pub dry_run: bool,
    /// Run matching and linking phases but skip performer merges
    #[serde(default)]
    pub skip_merge: bool,
}

/// Explicit accumulator of entities touched by earlier phases, threaded
/// through the run instead of ambient shared state. Later phases scope
/// their work to it when non-empty.
#[derive(Debug, Default)]
pub struct TouchedIds {
    pub performers: HashSet<i64>,
    pub products: HashSet<i64>,
}

/// Mutable state for one run
pub(crate) struct RunContext {
    pub deadline: Instant,
    pub dry_run: bool,
    pub skip_merge: bool,
    pub limit: i64,
    pub target_sources: Option<Vec<String>>,
    pub touched: TouchedIds,
    /// Performers consumed by a merge earlier in this run
    pub merged_this_run: HashSet<i64>,
    /// Consecutive per-record errors before a phase aborts
    pub error_cap: usize,
}

impl RunContext {
    pub fn over_budget(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Result of executing one phase body
pub(crate) struct PhaseOutcome {
    pub stats: PhaseStats,
    /// False when the phase stopped early on budget or the error cap
    pub completed: bool,
}

impl PhaseOutcome {
    pub fn completed(stats: PhaseStats) -> Self {
        Self { stats, completed: true }
    }

    pub fn aborted(stats: PhaseStats) -> Self {
        Self { stats, completed: false }
    }
}

const PHASE_NAMES: [&str; 8] = [
    "resolution",
    "lookup_links",
    "propagation",
    "key_dedup",
    "fuzzy_dedup",
    "fake_merge",
    "debut_backfill",
    "stat_resync",
];

/// Batch orchestrator: sequences phases, enforces the time budget,
/// retries transient store failures at phase boundaries and aggregates
/// statistics.
pub struct BatchOrchestrator {
    db: SqlitePool,
    config: Config,
    resolver: ResolutionOrchestrator,
    performers: PerformerStore,
}

impl BatchOrchestrator {
    pub fn new(db: SqlitePool, config: Config) -> Self {
        Self {
            resolver: ResolutionOrchestrator::new(db.clone(), config.clone()),
            performers: PerformerStore::new(db.clone()),
            db,
            config,
        }
    }

    /// Execute one batch run. Never panics outward: failures surface as
    /// a structured report with `success: false` and the statistics
    /// accumulated so far.
    pub async fn run(&self, request: BatchRequest) -> BatchReport {
        self.run_with_id(Uuid::new_v4(), request).await
    }

    /// As [`Self::run`], with a caller-supplied run id. The trigger
    /// surface assigns the id before spawning so it can answer status
    /// queries while the run is in flight.
    pub async fn run_with_id(&self, run_id: Uuid, request: BatchRequest) -> BatchReport {
        let started_at = Utc::now();
        let start = Instant::now();

        let limit = request.limit.unwrap_or(match request.mode {
            BatchMode::Full => self.config.batch.default_limit,
            BatchMode::Incremental => self.config.batch.default_limit / 10,
        });

        let mut ctx = RunContext {
            deadline: start + std::time::Duration::from_secs(self.config.batch.time_budget_secs),
            dry_run: request.dry_run,
            skip_merge: request.skip_merge,
            limit: limit.max(1),
            target_sources: request.target_sources.clone(),
            touched: TouchedIds::default(),
            merged_this_run: HashSet::new(),
            error_cap: self.config.batch.consecutive_error_cap,
        };

        tracing::info!(
            %run_id,
            mode = ?request.mode,
            limit = ctx.limit,
            dry_run = ctx.dry_run,
            skip_merge = ctx.skip_merge,
            "Starting batch run"
        );

        let mut phases = Vec::with_capacity(PHASE_NAMES.len());
        let mut resume_from = None;
        let mut run_error = None;

        for phase_name in PHASE_NAMES {
            if ctx.over_budget() || run_error.is_some() {
                phases.push(PhaseReport {
                    phase: phase_name,
                    status: PhaseStatus::Skipped,
                    stats: PhaseStats::default(),
                    duration_ms: 0,
                });
                resume_from.get_or_insert(phase_name);
                continue;
            }

            let phase_start = Instant::now();
            let outcome = self.run_phase_with_retry(phase_name, &mut ctx).await;
            let duration_ms = phase_start.elapsed().as_millis() as u64;

            match outcome {
                Ok(outcome) => {
                    let status = if outcome.completed {
                        PhaseStatus::Completed
                    } else {
                        resume_from.get_or_insert(phase_name);
                        PhaseStatus::Aborted
                    };
                    tracing::info!(
                        %run_id,
                        phase = phase_name,
                        status = ?status,
                        stats = %outcome.stats,
                        duration_ms,
                        "Phase finished"
                    );
                    phases.push(PhaseReport {
                        phase: phase_name,
                        status,
                        stats: outcome.stats,
                        duration_ms,
                    });
                }
                Err(e) => {
                    tracing::error!(%run_id, phase = phase_name, error = %e, "Phase failed");
                    phases.push(PhaseReport {
                        phase: phase_name,
                        status: PhaseStatus::Aborted,
                        stats: PhaseStats::default(),
                        duration_ms,
                    });
                    resume_from.get_or_insert(phase_name);
                    run_error = Some(format!("phase {phase_name} failed: {e}"));
                }
            }
        }

        let report = BatchReport {
            run_id,
            mode: request.mode,
            dry_run: request.dry_run,
            success: run_error.is_none(),
            error: run_error,
            started_at,
            total_duration_ms: start.elapsed().as_millis() as u64,
            phases,
            resume_from,
        };

        tracing::info!(
            %run_id,
            success = report.success,
            totals = %report.totals(),
            duration_ms = report.total_duration_ms,
            resume_from = report.resume_from.unwrap_or("-"),
            "Batch run finished"
        );

        report
    }

    /// Transient store errors are retried once at the phase boundary,
    /// never mid-transaction.
    async fn run_phase_with_retry(
        &self,
        phase_name: &'static str,
        ctx: &mut RunContext,
    ) -> Result<PhaseOutcome> {
        match self.dispatch_phase(phase_name, ctx).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::warn!(phase = phase_name, error = %e, "Phase failed, retrying once");
                self.dispatch_phase(phase_name, ctx).await
            }
        }
    }

    async fn dispatch_phase(
        &self,
        phase_name: &'static str,
        ctx: &mut RunContext,
    ) -> Result<PhaseOutcome> {
        match phase_name {
            "resolution" => self.phase_resolution(ctx).await,
            "lookup_links" => self.phase_lookup_links(ctx).await,
            "propagation" => self.phase_propagation(ctx).await,
            "key_dedup" => self.phase_key_dedup(ctx).await,
            "fuzzy_dedup" => self.phase_fuzzy_dedup(ctx).await,
            "fake_merge" => self.phase_fake_merge(ctx).await,
            "debut_backfill" => self.phase_backfill(ctx).await,
            "stat_resync" => self.phase_resync(ctx).await,
            other => unreachable!("unknown phase {other}"),
        }
    }
}
