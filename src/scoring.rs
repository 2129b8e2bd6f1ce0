//! Keyword-overlap scoring engine.
//!
//! Deliberately simplistic: the engine compares keyword sets, not meaning.
//! It hides behind [`DecisionScorer`] so a better model can replace it
//! without touching the transactional submission coordinator.

use std::collections::HashSet;

/// A team's submitted decision and rationale.
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    /// The decision text; may be empty on the auto-submit path.
    pub decision: &'a str,
    /// The rationale text; may be empty on the auto-submit path.
    pub rationale: &'a str,
}

/// The scenario's reference answer and rationale.
#[derive(Debug, Clone, Copy)]
pub struct Reference<'a> {
    /// Reference answer text.
    pub answer: &'a str,
    /// Reference rationale text.
    pub rationale: &'a str,
}

/// Pure, deterministic, total scoring function. Never performs I/O and never
/// fails; unusable input simply scores zero.
pub trait DecisionScorer: Send + Sync {
    /// Score a submission against the scenario reference material.
    fn score(&self, submission: Submission<'_>, reference: Reference<'_>) -> u32;
}

/// Common English filler words excluded from the keyword sets.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "if",
    "in", "into", "is", "it", "its", "no", "not", "of", "on", "or", "our", "should", "that",
    "the", "their", "then", "there", "these", "they", "this", "to", "was", "we", "were", "will",
    "with", "would", "you", "your",
];

/// Score thresholds mapping overlap ratio to awarded points, highest first.
const SCORE_BANDS: &[(f64, u32)] = &[(0.8, 15), (0.6, 12), (0.4, 10), (0.2, 7), (0.1, 5)];

/// Default scorer: keyword overlap with substring containment matching.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordOverlapScorer;

impl DecisionScorer for KeywordOverlapScorer {
    fn score(&self, submission: Submission<'_>, reference: Reference<'_>) -> u32 {
        let submitted = keywords(&format!("{} {}", submission.decision, submission.rationale));
        if submitted.is_empty() {
            return 0;
        }

        let expected = keywords(&format!("{} {}", reference.answer, reference.rationale));
        let matched = expected
            .iter()
            .filter(|keyword| {
                submitted
                    .iter()
                    .any(|candidate| candidate.contains(*keyword) || keyword.contains(candidate))
            })
            .count();

        let ratio = matched as f64 / expected.len().max(1) as f64;
        SCORE_BANDS
            .iter()
            .find(|(threshold, _)| ratio >= *threshold)
            .map(|(_, points)| *points)
            .unwrap_or(0)
    }
}

/// Lower-cased, punctuation-stripped, stop-word-filtered keyword set.
fn keywords(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() > 1 && !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE: Reference<'_> = Reference {
        answer: "Evacuate the building immediately and account for all staff",
        rationale: "Safety of personnel outweighs equipment recovery",
    };

    fn score(decision: &str, rationale: &str) -> u32 {
        KeywordOverlapScorer.score(
            Submission {
                decision,
                rationale,
            },
            REFERENCE,
        )
    }

    #[test]
    fn scoring_is_deterministic() {
        let first = score("evacuate staff for safety", "personnel first");
        for _ in 0..10 {
            assert_eq!(score("evacuate staff for safety", "personnel first"), first);
        }
    }

    #[test]
    fn empty_submission_scores_zero() {
        assert_eq!(score("", ""), 0);
        assert_eq!(score("   ", "\t\n"), 0);
    }

    #[test]
    fn full_overlap_scores_top_band() {
        assert_eq!(
            score(
                "Evacuate the building immediately and account for all staff",
                "Safety of personnel outweighs equipment recovery",
            ),
            15
        );
    }

    #[test]
    fn unrelated_submission_scores_zero() {
        assert_eq!(score("reboot the router", "network latency spike"), 0);
    }

    #[test]
    fn partial_overlap_lands_in_a_middle_band() {
        let points = score("evacuate everyone, staff safety first", "personnel matter most");
        assert!(points > 0 && points < 15, "got {points}");
    }

    #[test]
    fn substring_containment_matches_both_directions() {
        // "evacuate" in the reference matched by the longer "evacuated".
        let with_inflection = score("we evacuated all staff for safety", "personnel protected");
        let exact = score("we evacuate all staff for safety", "personnel protected");
        assert_eq!(with_inflection, exact);
    }

    #[test]
    fn stop_words_never_count_as_matches() {
        assert_eq!(score("the and of to with", "for that their"), 0);
    }
}
