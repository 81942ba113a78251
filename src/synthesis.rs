//! Stage 3 — chairman synthesis.
//!
//! One de-anonymized call: the chairman sees the original question, every
//! surviving answer attributed to its real model, and the peer leaderboard,
//! and produces the single answer the caller receives.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::aggregate::AggregateEntry;
use crate::gateway::{GatewayError, ModelGateway, ModelId, TokenUsage};
use crate::session::{FinalResponse, Stage1Record};

/// Errors from the synthesis call.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("chairman call timed out after {0}s")]
    Timeout(u64),

    #[error("synthesis cancelled")]
    Cancelled,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Result type for synthesis operations.
pub type SynthesisResult<T> = Result<T, SynthesisError>;

/// Build the chairman's prompt.
///
/// Unlike the review prompt, this one names models: anonymity only protects
/// the ranking stage, and attribution lets the chairman weigh answers by
/// their peer standing.
pub fn chairman_prompt(
    query: &str,
    stage1: &[Stage1Record],
    leaderboard: &[AggregateEntry],
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are the chairman of a council of language models. The council \
         was asked the following question:"
    );
    let _ = writeln!(prompt, "\n{query}\n");
    let _ = writeln!(
        prompt,
        "Each member answered independently, then the members ranked each \
         other's answers anonymously. The answers, attributed to their \
         authors, are below.\n"
    );

    for record in stage1 {
        let _ = writeln!(prompt, "### Answer from {}\n", record.model);
        let _ = writeln!(prompt, "{}\n", record.text);
    }

    if !leaderboard.is_empty() {
        let _ = writeln!(prompt, "### Peer ranking (best first)\n");
        for (position, entry) in leaderboard.iter().enumerate() {
            let _ = writeln!(
                prompt,
                "{}. {} (average rank {:.2}, ranked first {} time{})",
                position + 1,
                entry.model,
                entry.average_rank,
                entry.first_place_count,
                if entry.first_place_count == 1 { "" } else { "s" },
            );
        }
        prompt.push('\n');
    }

    let _ = writeln!(
        prompt,
        "Synthesize the council's work into a single, final answer to the \
         original question. Draw on the strongest answers, resolve \
         disagreements explicitly, and do not mention the council or this \
         process in your reply."
    );

    prompt
}

/// Run the chairman call under its own timeout, abortable through `cancel`.
///
/// Failure here is fatal to the session; the caller is responsible for
/// preserving Stage 1/2 data for partial display.
pub async fn synthesize(
    gateway: Arc<dyn ModelGateway>,
    chairman: &ModelId,
    query: &str,
    stage1: &[Stage1Record],
    leaderboard: &[AggregateEntry],
    per_call_timeout: Duration,
    cancel: &CancellationToken,
) -> SynthesisResult<(FinalResponse, TokenUsage)> {
    let prompt = chairman_prompt(query, stage1, leaderboard);

    let reply = tokio::select! {
        _ = cancel.cancelled() => return Err(SynthesisError::Cancelled),
        res = tokio::time::timeout(per_call_timeout, gateway.send(chairman, &prompt)) => {
            res.map_err(|_| SynthesisError::Timeout(per_call_timeout.as_secs()))??
        }
    };

    info!(
        chairman = %chairman,
        latency_s = reply.latency_seconds,
        tokens = reply.usage.total_tokens,
        "synthesis complete"
    );

    Ok((
        FinalResponse {
            model: chairman.clone(),
            text: reply.text,
            latency_seconds: reply.latency_seconds,
        },
        reply.usage,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayResult, ModelReply};
    use async_trait::async_trait;

    struct StaticGateway {
        text: String,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl ModelGateway for StaticGateway {
        async fn send(&self, _model: &ModelId, _prompt: &str) -> GatewayResult<ModelReply> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(ModelReply {
                text: self.text.clone(),
                usage: TokenUsage::from_counts(200, 100),
                latency_seconds: 0.5,
            })
        }
    }

    fn stage1_fixture() -> Vec<Stage1Record> {
        vec![
            Stage1Record {
                model: ModelId::new("a/one"),
                text: "first answer".to_string(),
                latency_seconds: 1.0,
                usage: TokenUsage::from_counts(10, 5),
            },
            Stage1Record {
                model: ModelId::new("b/two"),
                text: "second answer".to_string(),
                latency_seconds: 1.5,
                usage: TokenUsage::from_counts(12, 6),
            },
        ]
    }

    fn leaderboard_fixture() -> Vec<AggregateEntry> {
        vec![
            AggregateEntry {
                model: ModelId::new("b/two"),
                average_rank: 1.0,
                first_place_count: 2,
            },
            AggregateEntry {
                model: ModelId::new("a/one"),
                average_rank: 2.0,
                first_place_count: 0,
            },
        ]
    }

    #[test]
    fn prompt_names_models_and_leaderboard() {
        let prompt = chairman_prompt("What is up?", &stage1_fixture(), &leaderboard_fixture());

        assert!(prompt.contains("What is up?"));
        assert!(prompt.contains("Answer from a/one"));
        assert!(prompt.contains("first answer"));
        assert!(prompt.contains("Answer from b/two"));
        // Leaderboard order, not council order.
        let b_pos = prompt.find("1. b/two").expect("ranked list present");
        let a_pos = prompt.find("2. a/one").expect("ranked list present");
        assert!(b_pos < a_pos);
        assert!(prompt.contains("ranked first 2 times"));
    }

    #[test]
    fn prompt_omits_leaderboard_when_empty() {
        let prompt = chairman_prompt("q", &stage1_fixture(), &[]);
        assert!(!prompt.contains("Peer ranking"));
        assert!(prompt.contains("Answer from a/one"));
    }

    #[tokio::test]
    async fn synthesize_returns_final_response_and_usage() {
        let gateway = Arc::new(StaticGateway {
            text: "the final word".to_string(),
            delay: None,
        });

        let (final_response, usage) = synthesize(
            gateway,
            &ModelId::new("c/chair"),
            "q",
            &stage1_fixture(),
            &leaderboard_fixture(),
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(final_response.model, ModelId::new("c/chair"));
        assert_eq!(final_response.text, "the final word");
        assert_eq!(usage.total_tokens, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_chairman_times_out() {
        let gateway = Arc::new(StaticGateway {
            text: "late".to_string(),
            delay: Some(Duration::from_secs(600)),
        });

        let err = synthesize(
            gateway,
            &ModelId::new("c/chair"),
            "q",
            &stage1_fixture(),
            &[],
            Duration::from_secs(30),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SynthesisError::Timeout(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_in_flight_chairman_call() {
        let gateway = Arc::new(StaticGateway {
            text: "never delivered".to_string(),
            delay: Some(Duration::from_secs(600)),
        });
        let cancel = CancellationToken::new();

        let chairman = ModelId::new("c/chair");
        let stage1 = stage1_fixture();
        let call = synthesize(
            gateway,
            &chairman,
            "q",
            &stage1,
            &[],
            Duration::from_secs(3_000),
            &cancel,
        );
        tokio::pin!(call);

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(100)) => cancel.cancel(),
            _ = &mut call => panic!("call resolved before cancellation"),
        }

        assert!(matches!(call.await, Err(SynthesisError::Cancelled)));
    }
}
