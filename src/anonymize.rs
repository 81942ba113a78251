//! Label assignment for anonymous peer review.
//!
//! Each surviving Stage-1 answer gets a neutral label ("Response A", ...) so
//! reviewers cannot see whose answer they are ranking. Assignment order is
//! shuffled so the payload order carries no information about the configured
//! council order; the rng is injected so tests can pin the permutation.

use std::collections::{BTreeMap, HashMap};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::gateway::ModelId;

/// Neutral token identifying one Stage-1 answer within a session.
pub type Label = String;

/// Session-scoped bidirectional label↔model mapping.
///
/// Total bijection over the answers present in the session; never exposed to
/// the reviewing call itself, only to post-processing and display.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    label_to_model: BTreeMap<Label, ModelId>,
    model_to_label: HashMap<ModelId, Label>,
}

impl LabelMap {
    /// Rebuild a map from explicit pairs (deserialized sessions, tests).
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Label, ModelId)>) -> Self {
        let mut map = Self::default();
        for (label, model) in pairs {
            map.insert(label, model);
        }
        map
    }

    fn insert(&mut self, label: Label, model: ModelId) {
        self.model_to_label.insert(model.clone(), label.clone());
        self.label_to_model.insert(label, model);
    }

    pub fn model_for(&self, label: &str) -> Option<&ModelId> {
        self.label_to_model.get(label)
    }

    pub fn label_for(&self, model: &ModelId) -> Option<&Label> {
        self.model_to_label.get(model)
    }

    /// All labels, in label order.
    pub fn labels(&self) -> Vec<Label> {
        self.label_to_model.keys().cloned().collect()
    }

    /// Label-keyed view, the shape the display layer consumes.
    pub fn as_btree(&self) -> &BTreeMap<Label, ModelId> {
        &self.label_to_model
    }

    pub fn len(&self) -> usize {
        self.label_to_model.len()
    }

    pub fn is_empty(&self) -> bool {
        self.label_to_model.is_empty()
    }
}

/// One anonymized answer as presented to reviewers: label + text, never the
/// originating model.
#[derive(Debug, Clone, Serialize)]
pub struct AnonymousResponse {
    pub label: Label,
    pub text: String,
}

/// Assign shuffled labels to `(model, answer)` pairs.
///
/// Returns the session's `LabelMap` and the payload in label order. Models
/// that failed Stage 1 must not be passed in; they receive no label and are
/// excluded from peer review.
pub fn anonymize<R: Rng>(
    responses: &[(ModelId, String)],
    rng: &mut R,
) -> (LabelMap, Vec<AnonymousResponse>) {
    let mut order: Vec<usize> = (0..responses.len()).collect();
    order.shuffle(rng);

    let mut map = LabelMap::default();
    let mut payload = Vec::with_capacity(responses.len());

    for (position, index) in order.into_iter().enumerate() {
        let (model, text) = &responses[index];
        let label = response_label(position);
        map.insert(label.clone(), model.clone());
        payload.push(AnonymousResponse {
            label,
            text: text.clone(),
        });
    }

    (map, payload)
}

/// `0 → "Response A"`, `25 → "Response Z"`, `26 → "Response AA"`, ...
fn response_label(index: usize) -> Label {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push((b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    letters.reverse();
    format!("Response {}", letters.iter().collect::<String>())
}
