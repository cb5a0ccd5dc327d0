//! Fuzzy matching of raw source values against a concept pool.
//!
//! Scoring is a token-set ratio: both strings are normalized, split
//! into unique tokens, and the best pairwise ratio of the shared-token
//! string against each full-token string wins. Word order and repeated
//! tokens do not affect the score, which suits free-text source values
//! like chart labels.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use omop_model::{Concept, EtlError, Result};
use rapidfuzz::fuzz;
use regex::Regex;
use tracing::debug;

use crate::store::VocabularyStore;

/// Characters stripped from both sides before tokenizing. These show
/// up in chart labels and vocabulary names as markup, not meaning.
static STRIP_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[$\{\}()\[\]^+/]").expect("strip pattern is valid"));

/// Lowercase, strip markup characters and collapse everything that is
/// not alphanumeric into token breaks.
fn normalize(raw: &str) -> String {
    let stripped = STRIP_CHARS.replace_all(raw, "");
    let mut out = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Token-set ratio in `0.0..=100.0`.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let normalized_a = normalize(a);
    let normalized_b = normalize(b);
    if normalized_a.is_empty() || normalized_b.is_empty() {
        return 0.0;
    }

    let tokens_a: BTreeSet<&str> = normalized_a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = normalized_b.split_whitespace().collect();

    let shared: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    let sect = shared.join(" ");
    let sect_a = join_full(&sect, &only_a);
    let sect_b = join_full(&sect, &only_b);

    let pairs = [
        fuzz::ratio(sect.chars(), sect_a.chars()),
        fuzz::ratio(sect.chars(), sect_b.chars()),
        fuzz::ratio(sect_a.chars(), sect_b.chars()),
    ];
    // `fuzz::ratio` is normalized to 0.0..=1.0; scale to this module's
    // documented 0.0..=100.0 range.
    pairs.into_iter().fold(0.0, f64::max) * 100.0
}

fn join_full(sect: &str, rest: &[&str]) -> String {
    let rest = rest.join(" ");
    if sect.is_empty() {
        rest
    } else if rest.is_empty() {
        sect.to_string()
    } else {
        format!("{sect} {rest}")
    }
}

/// Best fuzzy match for a single source value.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub concept_id: i64,
    pub concept_name: String,
    pub concept_code: String,
    pub score: f64,
}

/// Matcher over a fixed candidate pool from one vocabulary, domain and
/// concept class.
///
/// The pool is materialized once; matching is then pure, so equal
/// inputs always produce equal outputs. Ties go to the candidate that
/// appears first in the pool.
pub struct FuzzyConceptMatcher {
    candidates: Vec<MatchCandidate>,
    key_phrase: Option<String>,
}

struct MatchCandidate {
    concept_id: i64,
    concept_name: String,
    concept_code: String,
}

impl FuzzyConceptMatcher {
    /// Build a matcher for the given pool. An empty pool is a fatal
    /// configuration error: silently matching nothing would fill the
    /// output with spurious sentinel concepts.
    pub fn for_pool(
        store: &VocabularyStore,
        vocabulary_id: &str,
        domain_id: &str,
        concept_class_id: &str,
        key_phrase: Option<&str>,
    ) -> Result<Self> {
        let candidates: Vec<MatchCandidate> = store
            .match_candidates(vocabulary_id, domain_id, concept_class_id)
            .into_iter()
            .map(MatchCandidate::from_concept)
            .collect();
        if candidates.is_empty() {
            return Err(EtlError::NoMatchCandidates {
                vocabulary_id: vocabulary_id.to_string(),
                domain_id: domain_id.to_string(),
                concept_class_id: concept_class_id.to_string(),
            });
        }
        debug!(
            vocabulary_id,
            domain_id,
            concept_class_id,
            candidates = candidates.len(),
            "built fuzzy match pool"
        );
        Ok(Self {
            candidates,
            key_phrase: key_phrase.map(str::to_string),
        })
    }

    /// Score every candidate against the source value (with the key
    /// phrase appended, when configured) and return the best. The
    /// first candidate at the maximum score wins.
    pub fn best_match(&self, source_value: &str) -> MatchOutcome {
        let query = match &self.key_phrase {
            Some(phrase) => format!("{source_value} {phrase}"),
            None => source_value.to_string(),
        };

        let mut best_index = 0;
        let mut best_score = f64::MIN;
        for (index, candidate) in self.candidates.iter().enumerate() {
            let score = token_set_ratio(&query, &candidate.concept_name);
            if score > best_score {
                best_score = score;
                best_index = index;
            }
        }

        let winner = &self.candidates[best_index];
        MatchOutcome {
            concept_id: winner.concept_id,
            concept_name: winner.concept_name.clone(),
            concept_code: winner.concept_code.clone(),
            score: best_score,
        }
    }
}

impl MatchCandidate {
    fn from_concept(concept: &Concept) -> Self {
        Self {
            concept_id: concept.concept_id,
            concept_name: concept.concept_name.clone(),
            concept_code: concept.concept_code.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use omop_model::StandardConcept;

    use super::*;

    fn unit_concept(id: i64, name: &str) -> Concept {
        Concept {
            concept_id: id,
            concept_name: name.to_string(),
            domain_id: "Unit".to_string(),
            vocabulary_id: "UCUM".to_string(),
            concept_class_id: "Unit".to_string(),
            standard_concept: Some(StandardConcept::Standard),
            concept_code: name.to_string(),
            valid_start_date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            valid_end_date: NaiveDate::from_ymd_opt(2099, 12, 31).unwrap(),
            invalid_reason: None,
        }
    }

    #[test]
    fn normalization_strips_markup() {
        assert_eq!(normalize("mg/dL (serum) [x]"), "mgdl serum x");
        assert_eq!(normalize("  ^+$  "), "");
    }

    #[test]
    fn token_order_does_not_matter() {
        let forward = token_set_ratio("blood pressure systolic", "systolic blood pressure");
        assert!((forward - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn subset_scores_full() {
        // Shared tokens against the shared-token string score 100.
        let score = token_set_ratio("heart rate", "heart rate monitored");
        assert!((score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_input_scores_zero() {
        assert_eq!(token_set_ratio("", "anything"), 0.0);
        assert_eq!(token_set_ratio("()[]", "anything"), 0.0);
    }

    #[test]
    fn empty_pool_is_an_error() {
        let store = VocabularyStore::new();
        let matcher = FuzzyConceptMatcher::for_pool(&store, "UCUM", "Unit", "Unit", None);
        assert!(matches!(
            matcher,
            Err(EtlError::NoMatchCandidates { .. })
        ));
    }

    #[test]
    fn ties_break_to_first_candidate() {
        let mut store = VocabularyStore::new();
        store.add_concept(unit_concept(1, "exact name"));
        store.add_concept(unit_concept(2, "exact name"));
        let matcher =
            FuzzyConceptMatcher::for_pool(&store, "UCUM", "Unit", "Unit", None).unwrap();
        let outcome = matcher.best_match("exact name");
        assert_eq!(outcome.concept_id, 1);
        assert!((outcome.score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn key_phrase_steers_matching() {
        let mut store = VocabularyStore::new();
        store.add_concept(unit_concept(1, "degree Celsius temperature"));
        store.add_concept(unit_concept(2, "degree angle"));
        let matcher =
            FuzzyConceptMatcher::for_pool(&store, "UCUM", "Unit", "Unit", Some("temperature"))
                .unwrap();
        let outcome = matcher.best_match("degree celsius");
        assert_eq!(outcome.concept_id, 1);
    }
}
