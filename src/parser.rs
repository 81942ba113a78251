//! Free-text rank extraction.
//!
//! Reviewers are asked for a numbered list, but LLM output drifts. The parser
//! accepts a narrow grammar — numbered or bulleted list lines containing a
//! known label — and treats everything else as "no data". No best-effort
//! heuristics: a misparse would silently misrank, an empty parse just means
//! this reviewer contributes nothing.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::anonymize::Label;

/// A list line starts with `1.` / `2)` / `3:` or a `-` / `*` / `•` bullet.
fn list_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:\d+\s*[.):]|[-*•])\s*").expect("valid regex"))
}

/// Extract an ordered label sequence from a reviewer's raw ranking text.
///
/// Labels outside `valid_labels` are ignored; duplicates keep the first
/// occurrence's position; text with no rankable list lines yields an empty
/// sequence (a recoverable condition, not an error).
pub fn parse_ranking(raw: &str, valid_labels: &[Label]) -> Vec<Label> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut ordered = Vec::new();

    for line in raw.lines() {
        if !list_line_re().is_match(line) {
            continue;
        }

        // A well-formed line names one label, but take any present in
        // left-to-right order so "1. Response B (over Response C)" still
        // reads as B first.
        let mut found: Vec<(usize, &Label)> = valid_labels
            .iter()
            .filter_map(|label| find_label(line, label).map(|pos| (pos, label)))
            .collect();
        found.sort_by_key(|(pos, _)| *pos);

        for (_, label) in found {
            if seen.insert(label.as_str()) {
                ordered.push(label.clone());
            }
        }
    }

    ordered
}

/// Position of `label` in `line`, requiring the label to end at a word
/// boundary so "Response A" cannot match inside "Response AA".
fn find_label(line: &str, label: &str) -> Option<usize> {
    let mut start = 0;
    while let Some(offset) = line[start..].find(label) {
        let pos = start + offset;
        let end = pos + label.len();
        let bounded = line[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_ascii_alphanumeric());
        if bounded {
            return Some(pos);
        }
        start = end;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<Label> {
        names.iter().map(|n| format!("Response {n}")).collect()
    }

    #[test]
    fn numbered_list_parses_in_order() {
        let valid = labels(&["A", "B", "C"]);
        let raw = "My ranking:\n1. Response B\n2. Response C\n3. Response A\n";
        assert_eq!(
            parse_ranking(raw, &valid),
            labels(&["B", "C", "A"])
        );
    }

    #[test]
    fn bullets_and_paren_numbers_accepted() {
        let valid = labels(&["A", "B"]);
        let raw = "- Response B is strongest\n2) Response A\n";
        assert_eq!(parse_ranking(raw, &valid), labels(&["B", "A"]));
    }

    #[test]
    fn unknown_labels_ignored() {
        let valid = labels(&["A", "B"]);
        let raw = "1. Response Q\n2. Response B\n3. Response A\n";
        assert_eq!(parse_ranking(raw, &valid), labels(&["B", "A"]));
    }

    #[test]
    fn duplicates_keep_first_position() {
        let valid = labels(&["A", "B"]);
        let raw = "1. Response A\n2. Response B\n3. Response A again\n";
        assert_eq!(parse_ranking(raw, &valid), labels(&["A", "B"]));
    }

    #[test]
    fn multiple_labels_on_one_line_read_left_to_right() {
        let valid = labels(&["A", "B", "C"]);
        let raw = "1. Response B (clearly ahead of Response C)\n2. Response A\n";
        assert_eq!(parse_ranking(raw, &valid), labels(&["B", "C", "A"]));
    }

    #[test]
    fn prose_without_list_yields_nothing() {
        let valid = labels(&["A", "B"]);
        let raw = "I think Response A was the best, then Response B.";
        assert!(parse_ranking(raw, &valid).is_empty());
    }

    #[test]
    fn markdown_emphasis_does_not_break_matching() {
        let valid = labels(&["A", "B"]);
        let raw = "1. **Response B** - concise and correct\n2. *Response A*\n";
        assert_eq!(parse_ranking(raw, &valid), labels(&["B", "A"]));
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(parse_ranking("", &labels(&["A"])).is_empty());
    }

    #[test]
    fn prefix_labels_do_not_shadow_longer_ones() {
        // Past 26 responses the label sequence reaches "Response AA", which
        // contains "Response A" as a prefix.
        let valid = labels(&["A", "B", "AA"]);
        let raw = "1. Response AA\n2. Response B\n3. Response A\n";
        assert_eq!(parse_ranking(raw, &valid), labels(&["AA", "B", "A"]));
    }
}
