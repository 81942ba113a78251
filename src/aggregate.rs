//! Borda-style rank aggregation.
//!
//! Converts per-reviewer label orderings into a single leaderboard sorted by
//! average rank. Deterministic by construction: ties break on first-place
//! count, then on model id, and the result is independent of submission
//! order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::anonymize::{Label, LabelMap};
use crate::gateway::ModelId;

/// One reviewer's contribution to Stage 2.
#[derive(Debug, Clone)]
pub struct RankingSubmission {
    pub reviewer: ModelId,
    pub raw_text: String,
    /// May be empty — a parse failure means this reviewer contributes
    /// nothing, not that the session failed.
    pub parsed_ranking: Vec<Label>,
}

/// One leaderboard row. Lower `average_rank` is better; rank 1 is best.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateEntry {
    pub model: ModelId,
    pub average_rank: f64,
    pub first_place_count: u32,
}

#[derive(Default)]
struct Tally {
    rank_sum: u64,
    mentions: u32,
    first_places: u32,
}

/// Aggregate all submissions into a sorted leaderboard.
///
/// Labels that do not resolve via `label_map` are dropped from a submission
/// before positions are assigned, so the surviving labels keep a contiguous
/// 1-based ranking. Models mentioned by zero submissions are excluded — no
/// mean exists for them. The entry at index 0 is the session's winner.
pub fn aggregate(submissions: &[RankingSubmission], label_map: &LabelMap) -> Vec<AggregateEntry> {
    let mut tallies: BTreeMap<ModelId, Tally> = BTreeMap::new();

    for submission in submissions {
        let resolved: Vec<&ModelId> = submission
            .parsed_ranking
            .iter()
            .filter_map(|label| label_map.model_for(label))
            .collect();

        for (position, model) in resolved.into_iter().enumerate() {
            let tally = tallies.entry(model.clone()).or_default();
            tally.rank_sum += (position + 1) as u64;
            tally.mentions += 1;
            if position == 0 {
                tally.first_places += 1;
            }
        }
    }

    let mut entries: Vec<AggregateEntry> = tallies
        .into_iter()
        .filter(|(_, tally)| tally.mentions > 0)
        .map(|(model, tally)| AggregateEntry {
            model,
            average_rank: tally.rank_sum as f64 / tally.mentions as f64,
            first_place_count: tally.first_places,
        })
        .collect();

    entries.sort_by(|a, b| {
        a.average_rank
            .partial_cmp(&b.average_rank)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.first_place_count.cmp(&a.first_place_count))
            .then(a.model.cmp(&b.model))
    });

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn map_for(pairs: &[(&str, &str)]) -> LabelMap {
        LabelMap::from_pairs(
            pairs
                .iter()
                .map(|(label, model)| (label.to_string(), ModelId::new(*model))),
        )
    }

    fn submission(reviewer: &str, labels: &[&str]) -> RankingSubmission {
        RankingSubmission {
            reviewer: ModelId::new(reviewer),
            raw_text: String::new(),
            parsed_ranking: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn abc_map() -> LabelMap {
        map_for(&[
            ("Response A", "x/alpha"),
            ("Response B", "x/beta"),
            ("Response C", "x/gamma"),
        ])
    }

    #[test]
    fn three_reviewer_scenario_matches_expected_leaderboard() {
        // Reviewer alpha ranks [B, C]; beta ranks [A, B, C]; gamma ranks
        // [B, A, C].
        let map = abc_map();
        let submissions = vec![
            submission("x/alpha", &["Response B", "Response C"]),
            submission("x/beta", &["Response A", "Response B", "Response C"]),
            submission("x/gamma", &["Response B", "Response A", "Response C"]),
        ];

        let entries = aggregate(&submissions, &map);

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].model, ModelId::new("x/beta"));
        assert_eq!(entries[1].model, ModelId::new("x/alpha"));
        assert_eq!(entries[2].model, ModelId::new("x/gamma"));

        assert!((entries[0].average_rank - 4.0 / 3.0).abs() < EPS);
        assert!((entries[1].average_rank - 1.5).abs() < EPS);
        assert!((entries[2].average_rank - 8.0 / 3.0).abs() < EPS);

        assert_eq!(entries[0].first_place_count, 2);
        assert_eq!(entries[1].first_place_count, 1);
        assert_eq!(entries[2].first_place_count, 0);
    }

    #[test]
    fn aggregation_is_order_independent() {
        let map = abc_map();
        let mut submissions = vec![
            submission("x/alpha", &["Response B", "Response C"]),
            submission("x/beta", &["Response A", "Response B", "Response C"]),
            submission("x/gamma", &["Response B", "Response A", "Response C"]),
        ];

        let forward = aggregate(&submissions, &map);
        submissions.reverse();
        let backward = aggregate(&submissions, &map);

        let order = |entries: &[AggregateEntry]| {
            entries.iter().map(|e| e.model.clone()).collect::<Vec<_>>()
        };
        assert_eq!(order(&forward), order(&backward));
    }

    #[test]
    fn tie_breaks_on_first_place_then_model_id() {
        let map = map_for(&[("Response A", "x/zeta"), ("Response B", "x/eta")]);

        // Each model ranked first once and second once: full tie.
        let submissions = vec![
            submission("r/one", &["Response A", "Response B"]),
            submission("r/two", &["Response B", "Response A"]),
        ];
        let entries = aggregate(&submissions, &map);

        // Equal average rank and equal first places: model id ascending.
        assert!((entries[0].average_rank - entries[1].average_rank).abs() < EPS);
        assert_eq!(entries[0].first_place_count, entries[1].first_place_count);
        assert_eq!(entries[0].model, ModelId::new("x/eta"));
        assert_eq!(entries[1].model, ModelId::new("x/zeta"));
    }

    #[test]
    fn first_place_count_breaks_average_ties() {
        let map = map_for(&[
            ("Response A", "x/a"),
            ("Response B", "x/b"),
            ("Response C", "x/c"),
        ]);

        // x/a: ranks 1, 2 → 1.5 with one first place.
        // x/b: ranks 1, 1, 2, 2 → 1.5 with two first places.
        let submissions = vec![
            submission("r/1", &["Response A", "Response B"]),
            submission("r/2", &["Response B", "Response A"]),
            submission("r/3", &["Response B", "Response C"]),
            submission("r/4", &["Response C", "Response B"]),
        ];
        let entries = aggregate(&submissions, &map);

        assert_eq!(entries[0].model, ModelId::new("x/b"));
        assert_eq!(entries[0].first_place_count, 2);
        assert_eq!(entries[1].model, ModelId::new("x/a"));
    }

    #[test]
    fn unresolvable_labels_drop_before_positions_assigned() {
        let map = map_for(&[("Response A", "x/a"), ("Response B", "x/b")]);

        // "Response Z" resolves to nothing; Response A must still get rank 1.
        let submissions = vec![submission("r/1", &["Response Z", "Response A", "Response B"])];
        let entries = aggregate(&submissions, &map);

        assert_eq!(entries[0].model, ModelId::new("x/a"));
        assert!((entries[0].average_rank - 1.0).abs() < EPS);
        assert_eq!(entries[0].first_place_count, 1);
    }

    #[test]
    fn unmentioned_models_are_excluded() {
        let map = map_for(&[("Response A", "x/a"), ("Response B", "x/b")]);
        let submissions = vec![submission("r/1", &["Response A"])];

        let entries = aggregate(&submissions, &map);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].model, ModelId::new("x/a"));
    }

    #[test]
    fn no_usable_submissions_yield_empty_leaderboard() {
        let map = map_for(&[("Response A", "x/a")]);
        let submissions = vec![submission("r/1", &[])];
        assert!(aggregate(&submissions, &map).is_empty());
    }
}
