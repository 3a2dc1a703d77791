//! Near-duplicate rule removal
//!
//! Retrieval frequently returns the same rule several times: once from the
//! authoritative rulebook and again from summaries or guidance notes. Two
//! rules are duplicates when any of these hold:
//!
//! - normalised title + description are identical
//! - title similarity > 0.6 and description similarity > 0.5
//! - description similarity > 0.7
//! - one normalised description contains the other
//!
//! Similarity is Jaccard over the set of lowercase words longer than three
//! characters. The kept rule is chosen by a fixed preference order
//! (non-synthetic id, then longer description, then higher severity), with
//! every remaining field as a tie-break. The result depends only on the input
//! set and running it twice changes nothing.

use shared_types::Rule;
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::search::RuleMatch;

pub const TITLE_SIMILARITY_THRESHOLD: f64 = 0.6;
pub const COMBINED_DESCRIPTION_THRESHOLD: f64 = 0.5;
pub const DESCRIPTION_SIMILARITY_THRESHOLD: f64 = 0.7;

/// Prefix of identifiers generated for rules that arrived without one
pub const SYNTHETIC_ID_PREFIX: &str = "synthetic-";

/// Words of this length or shorter are ignored by the similarity measure
const MIN_WORD_LEN: usize = 4;

pub fn is_synthetic_id(id: &str) -> bool {
    id.is_empty() || id.starts_with(SYNTHETIC_ID_PREFIX)
}

/// Remove near-duplicate rules
pub fn deduplicate(rules: Vec<Rule>) -> Vec<Rule> {
    deduplicate_by(rules, |rule| rule)
}

/// Remove near-duplicate matches, then restore descending score order
pub fn deduplicate_matches(matches: Vec<RuleMatch>) -> Vec<RuleMatch> {
    let mut kept = deduplicate_by(matches, |m| &m.rule);
    kept.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.rule.id.cmp(&b.rule.id))
    });
    kept
}

fn deduplicate_by<T>(items: Vec<T>, rule_of: impl Fn(&T) -> &Rule) -> Vec<T> {
    let mut candidates: Vec<(T, Fingerprint)> = items
        .into_iter()
        .map(|item| {
            let fingerprint = Fingerprint::of(rule_of(&item));
            (item, fingerprint)
        })
        .collect();

    candidates.sort_by(|(a, fa), (b, fb)| preference(rule_of(a), fa, rule_of(b), fb));

    let mut kept: Vec<(T, Fingerprint)> = Vec::with_capacity(candidates.len());
    for (item, fingerprint) in candidates {
        if kept.iter().any(|(_, existing)| existing.duplicates(&fingerprint)) {
            continue;
        }
        kept.push((item, fingerprint));
    }

    kept.into_iter().map(|(item, _)| item).collect()
}

/// Ordering in which candidates are considered; earlier ones win
fn preference(a: &Rule, fa: &Fingerprint, b: &Rule, fb: &Fingerprint) -> Ordering {
    is_synthetic_id(&a.id)
        .cmp(&is_synthetic_id(&b.id))
        .then_with(|| fb.description.len().cmp(&fa.description.len()))
        .then_with(|| a.severity.cmp(&b.severity))
        .then_with(|| a.id.cmp(&b.id))
        .then_with(|| fa.title.cmp(&fb.title))
        .then_with(|| fa.description.cmp(&fb.description))
        .then_with(|| a.category.cmp(&b.category))
        .then_with(|| a.source_document.cmp(&b.source_document))
}

/// Precomputed normalised text and word sets of a rule
struct Fingerprint {
    title: String,
    description: String,
    title_words: HashSet<String>,
    description_words: HashSet<String>,
}

impl Fingerprint {
    fn of(rule: &Rule) -> Self {
        let title = normalize(&rule.title);
        let description = normalize(&rule.description);
        Self {
            title_words: significant_words(&title),
            description_words: significant_words(&description),
            title,
            description,
        }
    }

    fn duplicates(&self, other: &Fingerprint) -> bool {
        if self.title == other.title && self.description == other.description {
            return true;
        }

        if !self.description.is_empty()
            && !other.description.is_empty()
            && (self.description.contains(&other.description)
                || other.description.contains(&self.description))
        {
            return true;
        }

        let description_similarity = jaccard(&self.description_words, &other.description_words);
        if description_similarity > DESCRIPTION_SIMILARITY_THRESHOLD {
            return true;
        }

        let title_similarity = jaccard(&self.title_words, &other.title_words);
        title_similarity > TITLE_SIMILARITY_THRESHOLD
            && description_similarity > COMBINED_DESCRIPTION_THRESHOLD
    }
}

/// Lowercase, strip punctuation, collapse whitespace
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn significant_words(normalized: &str) -> HashSet<String> {
    normalized
        .split_whitespace()
        .filter(|w| w.chars().count() >= MIN_WORD_LEN)
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two word sets; zero when both are empty
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Jaccard similarity of two free-text strings
pub fn text_similarity(a: &str, b: &str) -> f64 {
    jaccard(&significant_words(&normalize(a)), &significant_words(&normalize(b)))
}
