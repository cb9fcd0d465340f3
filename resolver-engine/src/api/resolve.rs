//! Single-record resolution endpoint
//!
//! POST /resolve runs the full decision procedure for one stored record.
//! With `dry_run` the decision is returned without any write; otherwise
//! the record is grouped exactly as the batch resolution phase would.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::matching::MatchResult;
use crate::resolver::{MatchDecision, ResolutionOrchestrator, ResolutionOutcome};
use crate::AppState;

/// POST /resolve request
#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub record_id: i64,
    #[serde(default)]
    pub dry_run: bool,
}

/// POST /resolve response
#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub record_id: i64,
    pub dry_run: bool,
    /// Applied outcome; absent on dry runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ResolutionOutcome>,
    /// The decision a live run would apply; only reported on dry runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<DecisionPreview>,
}

/// Serializable projection of the read-only decision
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum DecisionPreview {
    AlreadyGrouped { group_id: i64 },
    WouldMatch(MatchResult),
    WouldCreateGroup,
}

impl From<MatchDecision> for DecisionPreview {
    fn from(decision: MatchDecision) -> Self {
        match decision {
            MatchDecision::AlreadyGrouped { group_id } => {
                DecisionPreview::AlreadyGrouped { group_id }
            }
            MatchDecision::Match(m) => DecisionPreview::WouldMatch(m),
            MatchDecision::NoMatch => DecisionPreview::WouldCreateGroup,
        }
    }
}

/// POST /resolve
pub async fn resolve_record(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<ResolveResponse>> {
    let record = crate::db::fetch_record(&state.db, request.record_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("record {}", request.record_id)))?;

    let orchestrator = ResolutionOrchestrator::new(state.db.clone(), state.config.clone());

    let response = if request.dry_run {
        let decision = orchestrator.decide(&record).await?;
        ResolveResponse {
            record_id: record.id,
            dry_run: true,
            outcome: None,
            decision: Some(decision.into()),
        }
    } else {
        let outcome = orchestrator.resolve_record(&record).await?;
        ResolveResponse {
            record_id: record.id,
            dry_run: false,
            outcome: Some(outcome),
            decision: None,
        }
    };

    Ok(Json(response))
}

pub fn resolve_routes() -> Router<AppState> {
    Router::new().route("/resolve", post(resolve_record))
}
