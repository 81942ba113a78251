//! Concurrent fan-out/fan-in over the model gateway.
//!
//! One call per model, all in flight at once, each bounded by the per-call
//! timeout. A failing or timed-out model is recorded and excluded from the
//! success set; the dispatch as a whole fails only when nothing succeeds.
//!
//! Used unchanged by Stage 1 (answers) and Stage 2 (peer reviews).

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::gateway::{ModelGateway, ModelId, ModelReply};

/// Errors that abort a dispatch outright.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("all {} model calls failed", failures.len())]
    AllFailed { failures: Vec<(ModelId, String)> },

    #[error("dispatch cancelled")]
    Cancelled,
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Fan-in result: successes in the caller's model order, plus error markers
/// for every model that did not produce a reply.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub replies: Vec<(ModelId, ModelReply)>,
    pub failures: Vec<(ModelId, String)>,
}

impl DispatchOutcome {
    /// Models that produced a reply, in dispatch order.
    pub fn surviving_models(&self) -> Vec<ModelId> {
        self.replies.iter().map(|(m, _)| m.clone()).collect()
    }
}

/// Fan a prompt out to every model concurrently and collect the results.
///
/// Cancelling `cancel` aborts the in-flight calls of this dispatch only.
pub async fn dispatch(
    gateway: Arc<dyn ModelGateway>,
    prompt: &str,
    models: &[ModelId],
    per_call_timeout: Duration,
    cancel: &CancellationToken,
) -> DispatchResult<DispatchOutcome> {
    let prompt: Arc<str> = Arc::from(prompt);
    let mut join_set: JoinSet<(usize, ModelId, Result<ModelReply, String>)> = JoinSet::new();

    for (index, model) in models.iter().cloned().enumerate() {
        let gateway = gateway.clone();
        let prompt = prompt.clone();
        let cancel = cancel.clone();

        join_set.spawn(async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err("cancelled".to_string()),
                res = tokio::time::timeout(per_call_timeout, gateway.send(&model, &prompt)) => {
                    match res {
                        Ok(Ok(reply)) => Ok(reply),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => Err(format!(
                            "timed out after {}s",
                            per_call_timeout.as_secs()
                        )),
                    }
                }
            };
            (index, model, outcome)
        });
    }

    // Fan-in barrier: nothing downstream starts until every call resolved.
    let mut slots: Vec<Option<(ModelId, Result<ModelReply, String>)>> =
        (0..models.len()).map(|_| None).collect();

    while let Some(res) = join_set.join_next().await {
        match res {
            Ok((index, model, outcome)) => {
                slots[index] = Some((model, outcome));
            }
            Err(e) => {
                // Panicked worker task; its slot stays empty and the model
                // counts as failed below.
                warn!(error = %e, "dispatch worker panicked");
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(DispatchError::Cancelled);
    }

    let mut replies = Vec::new();
    let mut failures = Vec::new();
    for (index, slot) in slots.into_iter().enumerate() {
        match slot {
            Some((model, Ok(reply))) => {
                debug!(model = %model, latency_s = reply.latency_seconds, "model replied");
                replies.push((model, reply));
            }
            Some((model, Err(reason))) => {
                warn!(model = %model, reason, "model call failed");
                failures.push((model, reason));
            }
            None => {
                let model = models[index].clone();
                failures.push((model, "worker panicked".to_string()));
            }
        }
    }

    if replies.is_empty() {
        return Err(DispatchError::AllFailed { failures });
    }

    Ok(DispatchOutcome { replies, failures })
}
