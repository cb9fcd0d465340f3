//! Resolution orchestrator
//!
//! Runs the matchers in priority order for one candidate record and
//! invokes the group manager with the winning match. Every decision is
//! logged with method and score; no match is ever silently dropped.

use crate::groups::GroupManager;
use crate::matching::{CodeMatcher, FuzzyMatcher, MatchMethod, MatchResult};
use resolver_common::db::models::CandidateRecord;
use resolver_common::{Config, Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;

/// Outcome of resolving one record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ResolutionOutcome {
    /// Record already belongs to a group; resolution was skipped
    AlreadyGrouped { group_id: i64 },
    /// Record joined an existing or freshly seeded group via a match
    Matched {
        group_id: i64,
        confidence: u8,
        method: MatchMethod,
    },
    /// No match cleared the review threshold; a new group was created
    CreatedGroup { group_id: i64 },
}

/// Read-only matching decision for one record
#[derive(Debug, Clone)]
pub enum MatchDecision {
    /// Record already belongs to a group
    AlreadyGrouped { group_id: i64 },
    /// A match cleared the applicable threshold
    Match(MatchResult),
    /// Nothing cleared the review threshold
    NoMatch,
}

pub struct ResolutionOrchestrator {
    db: SqlitePool,
    config: Config,
    code_matcher: CodeMatcher,
    fuzzy_matcher: FuzzyMatcher,
    groups: GroupManager,
}

impl ResolutionOrchestrator {
    pub fn new(db: SqlitePool, config: Config) -> Self {
        Self {
            code_matcher: CodeMatcher::new(db.clone()),
            fuzzy_matcher: FuzzyMatcher::new(db.clone()),
            groups: GroupManager::new(db.clone(), config.clone()),
            db,
            config,
        }
    }

    pub fn group_manager(&self) -> &GroupManager {
        &self.groups
    }

    /// Score one record against the store without writing anything.
    ///
    /// This is the whole decision procedure; [`Self::resolve_record`]
    /// applies its result and a dry run reports it as-is, so live and
    /// dry decisions can never diverge.
    ///
    /// Code match clearing the auto-merge threshold wins outright. A
    /// fuzzy match clearing the review threshold is accepted unless the
    /// code match scored at least as high; an exact tie prefers the code
    /// match, which is the deterministic tie-break documented in
    /// DESIGN.md.
    pub async fn decide(&self, record: &CandidateRecord) -> Result<MatchDecision> {
        if let Some(info) = self.groups.get_product_group(record.id).await? {
            tracing::debug!(
                record_id = record.id,
                group_id = info.group_id,
                "Record already grouped, skipping"
            );
            return Ok(MatchDecision::AlreadyGrouped {
                group_id: info.group_id,
            });
        }

        let code_match = self.code_matcher.find_match(record, &self.config.matching).await?;

        if let Some(m) = &code_match {
            if m.confidence >= self.config.matching.auto_merge_threshold {
                return Ok(MatchDecision::Match(m.clone()));
            }
        }

        let fuzzy_match = self.fuzzy_matcher.find_match(record, &self.config.matching).await?;

        let review = self.config.matching.review_threshold;
        let best = match (&code_match, &fuzzy_match) {
            (Some(code), Some(fuzzy))
                if code.confidence >= fuzzy.confidence && code.confidence >= review =>
            {
                Some(code)
            }
            (_, Some(fuzzy)) if fuzzy.confidence >= review => Some(fuzzy),
            (Some(code), None) if code.confidence >= review => Some(code),
            _ => None,
        };

        Ok(match best {
            Some(m) => MatchDecision::Match(m.clone()),
            None => MatchDecision::NoMatch,
        })
    }

    /// Resolve one candidate record into a group
    pub async fn resolve_record(&self, record: &CandidateRecord) -> Result<ResolutionOutcome> {
        match self.decide(record).await? {
            MatchDecision::AlreadyGrouped { group_id } => {
                Ok(ResolutionOutcome::AlreadyGrouped { group_id })
            }
            MatchDecision::Match(m) => {
                tracing::info!(
                    record_id = record.id,
                    matched = m.record_id,
                    confidence = m.confidence,
                    method = m.method.as_str(),
                    similarity = m.title_similarity,
                    "Accepting match"
                );
                let group_id = self.accept_match(record, &m).await?;
                Ok(ResolutionOutcome::Matched {
                    group_id,
                    confidence: m.confidence,
                    method: m.method,
                })
            }
            MatchDecision::NoMatch => {
                let group_id = self.groups.create_group(record, MatchMethod::GroupSeed).await?;
                tracing::info!(record_id = record.id, group_id, "No match, created new group");
                Ok(ResolutionOutcome::CreatedGroup { group_id })
            }
        }
    }

    /// Extend the matched group, resolving the matched record's own group
    /// first when it is itself ungrouped.
    async fn accept_match(&self, record: &CandidateRecord, m: &MatchResult) -> Result<i64> {
        let group_id = match m.group_id {
            Some(group_id) => group_id,
            None => {
                // The matched record has no group yet: give it one, then
                // join it. Its own group lookup covers races where it was
                // grouped between matching and acceptance.
                match self.groups.get_product_group(m.record_id).await? {
                    Some(info) => info.group_id,
                    None => {
                        let matched = crate::db::fetch_record(&self.db, m.record_id)
                            .await?
                            .ok_or_else(|| {
                                Error::NotFound(format!("matched record {}", m.record_id))
                            })?;
                        self.groups.create_group(&matched, m.method).await?
                    }
                }
            }
        };

        self.groups.add_to_group(group_id, record, m).await?;
        Ok(group_id)
    }
}
