//! Majority-vote aggregation. Answer normalisation is a hand-written text
//! scan rather than a single monolithic regex.

use std::collections::HashMap;

use serde_json::json;

use crate::error::{Error, Result};
use crate::types::Candidate;

use super::{AggregationOutcome, Aggregator};

const TERMINAL_MARKERS: &[&str] = &[
    "Answer:",
    "Therefore:",
    "Thus:",
    "So:",
    "The answer is:",
    "Result:",
];

/// Extract a normalised, comparable answer from raw candidate content
///.
pub fn normalize_answer(content: &str) -> String {
    let working = blank_line_preceded_marker(content)
        .unwrap_or_else(|| last_line(content).to_string());
    let working = strip_marker_prefix(&working);
    let working = quoted_value(content).unwrap_or(working);
    canonicalize(&working)
}

fn last_line(content: &str) -> &str {
    content
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
}

/// Find a terminal marker whose line is immediately preceded by a blank
/// line; returns the text from just after the marker to the end of
/// content.
fn blank_line_preceded_marker(content: &str) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            continue;
        }
        if !lines[i - 1].trim().is_empty() {
            continue;
        }
        let trimmed = line.trim_start();
        for marker in TERMINAL_MARKERS {
            if trimmed.len() >= marker.len() && trimmed[..marker.len()].eq_ignore_ascii_case(marker) {
                let after_marker = trimmed[marker.len()..].trim();
                let rest_of_content = lines[i + 1..].join("\n");
                let combined = if rest_of_content.trim().is_empty() {
                    after_marker.to_string()
                } else {
                    format!("{after_marker} {}", rest_of_content.trim())
                };
                return Some(combined.trim().to_string());
            }
        }
    }
    None
}

fn strip_marker_prefix(line: &str) -> String {
    let trimmed = line.trim_start();
    for marker in TERMINAL_MARKERS {
        if trimmed.len() >= marker.len() && trimmed[..marker.len()].eq_ignore_ascii_case(marker) {
            return trimmed[marker.len()..].trim().to_string();
        }
    }
    line.to_string()
}

/// A `"…"` quoted span anywhere in the content overrides any other
/// extraction.
fn quoted_value(content: &str) -> Option<String> {
    let start = content.find('"')?;
    let end = content[start + 1..].find('"')? + start + 1;
    Some(content[start + 1..end].to_string())
}

fn canonicalize(s: &str) -> String {
    let lowered = s.to_lowercase();
    let collapsed: String = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c.is_ascii_punctuation())
        .to_string()
}

#[derive(Debug, Clone, Default)]
pub struct MajorityVote;

impl MajorityVote {
    pub fn new() -> Self {
        Self
    }
}

impl Aggregator for MajorityVote {
    fn aggregate(&self, candidates: &[Candidate]) -> Result<AggregationOutcome> {
        if candidates.is_empty() {
            return Err(Error::NoCandidates);
        }

        let normalized: Vec<String> = candidates
            .iter()
            .map(|c| normalize_answer(c.content.as_deref().unwrap_or("")))
            .collect();

        // First-seen order determines tie-breaking: track insertion order
        // alongside counts.
        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, i64> = HashMap::new();
        for answer in &normalized {
            if !counts.contains_key(answer) {
                order.push(answer.clone());
            }
            *counts.entry(answer.clone()).or_insert(0) += 1;
        }

        // `order` is first-occurrence order; scan it directly rather than
        // `max_by_key` (which returns the *last* max on a tie) so ties go
        // to whichever answer appeared first.
        let mut winner = order.first().cloned().unwrap_or_default();
        let mut winner_count = counts.get(&winner).copied().unwrap_or(0);
        for answer in &order {
            let count = counts[answer];
            if count > winner_count {
                winner = answer.clone();
                winner_count = count;
            }
        }
        let winning_votes = counts[&winner];
        let total_votes = candidates.len() as i64;

        let winner_index = normalized
            .iter()
            .position(|a| a == &winner)
            .expect("winner must come from normalized set");
        let best_candidate = candidates[winner_index].clone();

        let mut metadata = HashMap::new();
        metadata.insert(
            "confidence".to_string(),
            json!(winning_votes as f64 / total_votes as f64),
        );
        metadata.insert("winning_votes".to_string(), json!(winning_votes));
        metadata.insert("total_votes".to_string(), json!(total_votes));
        metadata.insert("vote_distribution".to_string(), json!(counts));

        Ok(AggregationOutcome {
            best_candidate,
            metadata,
        })
    }

    fn distribution(&self, candidates: &[Candidate]) -> HashMap<String, i64> {
        let mut counts = HashMap::new();
        for c in candidates {
            let answer = normalize_answer(c.content.as_deref().unwrap_or(""));
            *counts.entry(answer).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(content: &str) -> Candidate {
        Candidate::new().with_content(content)
    }

    #[test]
    fn normalizes_inline_terminal_marker() {
        assert_eq!(normalize_answer("The answer is: 42"), "42");
        assert_eq!(normalize_answer("the answer is: 41"), "41");
    }

    #[test]
    fn normalizes_blank_line_preceded_marker() {
        let content = "Let me think about this.\n\nAnswer: 42";
        assert_eq!(normalize_answer(content), "42");
    }

    #[test]
    fn quoted_value_overrides_extraction() {
        let content = "The answer is: \"forty-two\"";
        assert_eq!(normalize_answer(content), "forty-two");
    }

    #[test]
    fn falls_back_to_last_line() {
        let content = "Step 1: compute\nStep 2: verify\n7";
        assert_eq!(normalize_answer(content), "7");
    }

    #[test]
    fn majority_vote_end_to_end_scenario() {
        let candidates = vec![
            candidate("The answer is: 42"),
            candidate("The answer is: 42"),
            candidate("the answer is: 41"),
        ];
        let aggregator = MajorityVote::new();
        let outcome = aggregator.aggregate(&candidates).unwrap();
        assert_eq!(normalize_answer(outcome.best_candidate.content.as_deref().unwrap()), "42");
        assert_eq!(outcome.metadata["winning_votes"], json!(2));
        assert_eq!(outcome.metadata["total_votes"], json!(3));
    }

    #[test]
    fn empty_candidates_is_no_candidates_error() {
        let aggregator = MajorityVote::new();
        assert!(matches!(aggregator.aggregate(&[]), Err(Error::NoCandidates)));
    }

    #[test]
    fn ties_broken_by_first_occurrence() {
        let candidates = vec![candidate("Answer: a"), candidate("Answer: b"), candidate("Answer: a"), candidate("Answer: b")];
        let aggregator = MajorityVote::new();
        let outcome = aggregator.aggregate(&candidates).unwrap();
        assert_eq!(normalize_answer(outcome.best_candidate.content.as_deref().unwrap()), "a");
    }
}
