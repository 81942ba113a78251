//! Session state machine and the display-layer result shape.
//!
//! The serialized field names in this module are an external contract: the
//! display layer already consumes `labelToModel`, `aggregateRankings`,
//! `finalResponse`, `usage.total_tokens` and `metadata.token_usage.total`
//! exactly as emitted here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::AggregateEntry;
use crate::anonymize::Label;
use crate::gateway::{ModelId, TokenUsage};

/// Errors from session bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionPhase,
        to: SessionPhase,
    },
}

/// Lifecycle of one council session.
///
/// Stages form a strict pipeline with fan-in barriers between them; `Failed`
/// is reachable from every non-terminal phase so partial-result recovery is
/// an explicit transition rather than a fallthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Pending,
    Stage1Complete,
    Stage2Complete,
    Complete,
    Failed,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    fn can_transition_to(&self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Pending, Stage1Complete)
                | (Stage1Complete, Stage2Complete)
                | (Stage2Complete, Complete)
                | (Pending, Failed)
                | (Stage1Complete, Failed)
                | (Stage2Complete, Failed)
        )
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Stage1Complete => "stage1_complete",
            Self::Stage2Complete => "stage2_complete",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Mutable session-scoped state owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: String,
    pub phase: SessionPhase,
    pub started_at: DateTime<Utc>,
    /// Sum of `total_tokens` over every gateway call in all three stages.
    pub token_usage_total: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            phase: SessionPhase::Pending,
            started_at: Utc::now(),
            token_usage_total: 0,
        }
    }

    /// Advance the phase, rejecting transitions the pipeline never makes.
    pub fn advance(&mut self, next: SessionPhase) -> Result<(), SessionError> {
        if !self.phase.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }

    pub fn add_usage(&mut self, usage: &TokenUsage) {
        self.token_usage_total += usage.total_tokens;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// One Stage-1 answer. Serializes as `{model, response, latency, usage}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage1Record {
    pub model: ModelId,
    #[serde(rename = "response")]
    pub text: String,
    #[serde(rename = "latency")]
    pub latency_seconds: f64,
    pub usage: TokenUsage,
}

/// One reviewer's Stage-2 output, raw and parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingRecord {
    pub model: ModelId,
    #[serde(rename = "ranking")]
    pub raw_text: String,
    pub parsed_ranking: Vec<Label>,
    pub usage: TokenUsage,
}

/// Everything Stage 2 produced, leaderboard pre-sorted ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage2Record {
    pub rankings: Vec<RankingRecord>,
    #[serde(rename = "labelToModel")]
    pub label_to_model: BTreeMap<Label, ModelId>,
    #[serde(rename = "aggregateRankings")]
    pub aggregate_rankings: Vec<AggregateEntry>,
}

/// The chairman's synthesized answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResponse {
    pub model: ModelId,
    #[serde(rename = "response")]
    pub text: String,
    #[serde(rename = "latency")]
    pub latency_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsageTotal {
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub token_usage: TokenUsageTotal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage3Record {
    #[serde(rename = "finalResponse")]
    pub final_response: FinalResponse,
    pub metadata: SessionMetadata,
}

/// The complete session result consumed by the display layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub stage1: Vec<Stage1Record>,
    pub stage2: Stage2Record,
    pub stage3: Stage3Record,
}

impl SessionResult {
    /// The leaderboard winner, if any reviewer produced usable rankings.
    pub fn winner(&self) -> Option<&ModelId> {
        self.stage2.aggregate_rankings.first().map(|e| &e.model)
    }
}

/// Stage 1/2 data preserved when the chairman call fails, so the caller can
/// still display a partial session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialSession {
    pub stage1: Vec<Stage1Record>,
    pub stage2: Stage2Record,
}
