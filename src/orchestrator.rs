//! Session orchestration — the three-stage council pipeline.
//!
//! Stage 1 fans the question out to every council member; Stage 2 anonymizes
//! the surviving answers and has the members rank each other; Stage 3 hands
//! everything, de-anonymized, to the chairman for synthesis. The leaderboard
//! winner gets a persistent win credited after the session completes.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aggregate::{aggregate, RankingSubmission};
use crate::anonymize::{anonymize, AnonymousResponse};
use crate::config::{ConfigError, CouncilConfig};
use crate::dispatch::{dispatch, DispatchError, DispatchOutcome};
use crate::gateway::{ModelGateway, ModelId};
use crate::parser::parse_ranking;
use crate::session::{
    PartialSession, RankingRecord, SessionError, SessionMetadata, SessionPhase, SessionResult,
    SessionState, Stage1Record, Stage2Record, Stage3Record, TokenUsageTotal,
};
use crate::synthesis::{synthesize, SynthesisError};
use crate::wins::SharedWinsStore;

/// Errors that fail a council session.
#[derive(Debug, thiserror::Error)]
pub enum CouncilError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no council member produced an answer ({} attempted)", failures.len())]
    NoStage1Responses { failures: Vec<(ModelId, String)> },

    #[error("chairman {model} failed: {reason}")]
    ChairmanFailed {
        model: ModelId,
        reason: String,
        /// Stage 1/2 data, preserved for partial display.
        partial: Box<PartialSession>,
    },

    #[error("session cancelled")]
    Cancelled,

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Result type for orchestrator operations.
pub type CouncilResult<T> = Result<T, CouncilError>;

/// Build the Stage-2 review prompt shown to every council member.
///
/// Only labels appear; the recipient cannot tell which answer is its own.
/// The ranking format requested here is the grammar `parse_ranking` accepts.
pub fn review_prompt(query: &str, responses: &[AnonymousResponse]) -> String {
    use std::fmt::Write as _;

    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Several anonymous assistants were asked the following question:"
    );
    let _ = writeln!(prompt, "\n{query}\n");
    let _ = writeln!(prompt, "Their answers:\n");

    for response in responses {
        let _ = writeln!(prompt, "### {}\n", response.label);
        let _ = writeln!(prompt, "{}\n", response.text);
    }

    let _ = writeln!(
        prompt,
        "Evaluate the answers for accuracy, completeness, and clarity. Then \
         rank ALL of them from best to worst as a numbered list, one label \
         per line, using the exact labels above:\n\
         1. <label of the best answer>\n\
         2. <label of the next best>\n\
         ...\n\
         End your reply with that list and nothing after it."
    );

    prompt
}

/// Drives council sessions over a gateway, a config, and a wins store.
pub struct CouncilOrchestrator {
    gateway: Arc<dyn ModelGateway>,
    config: CouncilConfig,
    wins: SharedWinsStore,
}

impl CouncilOrchestrator {
    /// Build an orchestrator, validating the config up front.
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        config: CouncilConfig,
        wins: SharedWinsStore,
    ) -> CouncilResult<Self> {
        config.validate()?;
        Ok(Self {
            gateway,
            config,
            wins,
        })
    }

    pub fn config(&self) -> &CouncilConfig {
        &self.config
    }

    /// Run one full session for `query`.
    pub async fn run_session(&self, query: &str) -> CouncilResult<SessionResult> {
        self.run_session_with_cancel(query, &CancellationToken::new())
            .await
    }

    /// Run one full session, abortable through `cancel`.
    pub async fn run_session_with_cancel(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> CouncilResult<SessionResult> {
        let mut state = SessionState::new();
        let timeout = self.config.per_call_timeout();
        info!(
            session = %state.id,
            members = self.config.council_models.len(),
            chairman = %self.config.chairman_model,
            "council session started"
        );

        // Stage 1: independent answers.
        let stage1_outcome = dispatch(
            self.gateway.clone(),
            query,
            &self.config.council_models,
            timeout,
            cancel,
        )
        .await
        .map_err(|e| match e {
            DispatchError::AllFailed { failures } => CouncilError::NoStage1Responses { failures },
            DispatchError::Cancelled => CouncilError::Cancelled,
        })?;

        let stage1: Vec<Stage1Record> = stage1_outcome
            .replies
            .iter()
            .map(|(model, reply)| Stage1Record {
                model: model.clone(),
                text: reply.text.clone(),
                latency_seconds: reply.latency_seconds,
                usage: reply.usage,
            })
            .collect();
        for record in &stage1 {
            state.add_usage(&record.usage);
        }
        state.advance(SessionPhase::Stage1Complete)?;
        info!(
            session = %state.id,
            answered = stage1.len(),
            failed = stage1_outcome.failures.len(),
            "stage 1 complete"
        );

        // Stage 2: anonymized peer ranking among the survivors.
        let pairs: Vec<(ModelId, String)> = stage1
            .iter()
            .map(|r| (r.model.clone(), r.text.clone()))
            .collect();
        let mut rng = match self.config.anonymizer_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (label_map, payload) = anonymize(&pairs, &mut rng);
        let valid_labels = label_map.labels();

        let reviewers = stage1_outcome.surviving_models();
        let prompt = review_prompt(query, &payload);
        let review_outcome = match dispatch(
            self.gateway.clone(),
            &prompt,
            &reviewers,
            timeout,
            cancel,
        )
        .await
        {
            Ok(outcome) => outcome,
            // Every reviewer failing leaves the leaderboard empty but the
            // session alive; the chairman can still synthesize.
            Err(DispatchError::AllFailed { failures }) => {
                warn!(session = %state.id, "no reviewer produced a ranking");
                DispatchOutcome {
                    replies: Vec::new(),
                    failures,
                }
            }
            Err(DispatchError::Cancelled) => return Err(CouncilError::Cancelled),
        };

        let mut rankings = Vec::new();
        let mut submissions = Vec::new();
        for (model, reply) in &review_outcome.replies {
            state.add_usage(&reply.usage);
            let parsed = parse_ranking(&reply.text, &valid_labels);
            if parsed.is_empty() {
                warn!(session = %state.id, reviewer = %model, "unparseable ranking");
            }
            rankings.push(RankingRecord {
                model: model.clone(),
                raw_text: reply.text.clone(),
                parsed_ranking: parsed.clone(),
                usage: reply.usage,
            });
            submissions.push(RankingSubmission {
                reviewer: model.clone(),
                raw_text: reply.text.clone(),
                parsed_ranking: parsed,
            });
        }

        let aggregate_rankings = aggregate(&submissions, &label_map);
        let stage2 = Stage2Record {
            rankings,
            label_to_model: label_map.as_btree().clone(),
            aggregate_rankings,
        };
        state.advance(SessionPhase::Stage2Complete)?;
        info!(
            session = %state.id,
            reviewers = stage2.rankings.len(),
            ranked = stage2.aggregate_rankings.len(),
            "stage 2 complete"
        );

        // Stage 3: chairman synthesis over de-anonymized material.
        let synthesis = synthesize(
            self.gateway.clone(),
            &self.config.chairman_model,
            query,
            &stage1,
            &stage2.aggregate_rankings,
            timeout,
            cancel,
        )
        .await;

        let (final_response, usage) = match synthesis {
            Ok(ok) => ok,
            Err(SynthesisError::Cancelled) => {
                state.advance(SessionPhase::Failed)?;
                return Err(CouncilError::Cancelled);
            }
            Err(e) => {
                state.advance(SessionPhase::Failed)?;
                return Err(CouncilError::ChairmanFailed {
                    model: self.config.chairman_model.clone(),
                    reason: e.to_string(),
                    partial: Box::new(PartialSession { stage1, stage2 }),
                });
            }
        };
        state.add_usage(&usage);
        state.advance(SessionPhase::Complete)?;

        // Win bookkeeping is post-hoc: a broken wins file must not fail a
        // session that already produced its answer.
        if let Some(winner) = stage2.aggregate_rankings.first().map(|e| e.model.clone()) {
            if let Err(e) = self.wins.record_win(&winner) {
                warn!(session = %state.id, winner = %winner, error = %e, "win not recorded");
            }
        }

        info!(
            session = %state.id,
            total_tokens = state.token_usage_total,
            "council session complete"
        );

        Ok(SessionResult {
            stage1,
            stage2,
            stage3: Stage3Record {
                final_response,
                metadata: SessionMetadata {
                    token_usage: TokenUsageTotal {
                        total: state.token_usage_total,
                    },
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anonymize::LabelMap;

    fn payload(entries: &[(&str, &str)]) -> Vec<AnonymousResponse> {
        entries
            .iter()
            .map(|(label, text)| AnonymousResponse {
                label: label.to_string(),
                text: text.to_string(),
            })
            .collect()
    }

    #[test]
    fn review_prompt_shows_labels_not_models() {
        let responses = payload(&[("Response A", "alpha text"), ("Response B", "beta text")]);
        let prompt = review_prompt("the question", &responses);

        assert!(prompt.contains("the question"));
        assert!(prompt.contains("### Response A"));
        assert!(prompt.contains("alpha text"));
        assert!(prompt.contains("### Response B"));
        assert!(prompt.contains("numbered list"));
    }

    #[test]
    fn review_prompt_example_contains_no_real_label() {
        // The format example must not inject rankable labels into the text
        // a sloppy reviewer might echo back.
        let responses = payload(&[("Response A", "x")]);
        let prompt = review_prompt("q", &responses);

        let example_section = prompt
            .split("best to worst")
            .nth(1)
            .expect("instructions present");
        assert!(!example_section.contains("Response A"));
    }

    #[test]
    fn label_map_view_matches_session_shape() {
        let map = LabelMap::from_pairs([
            ("Response A".to_string(), ModelId::new("a/one")),
            ("Response B".to_string(), ModelId::new("b/two")),
        ]);
        assert_eq!(
            map.as_btree().get("Response B"),
            Some(&ModelId::new("b/two"))
        );
    }
}
