//! Keyword lists and placeholder detection

use lazy_static::lazy_static;
use regex::Regex;

/// Longest placeholder token reported back to the user
pub const MAX_PLACEHOLDER_DISPLAY: usize = 40;

lazy_static! {
    static ref BRACKETED: Regex = Regex::new(r"\[[^\[\]\n]*\]").unwrap();
    static ref MARKERS: Regex =
        Regex::new(r"(?i)\b(?:TBD|X{3,}|PLACEHOLDER|INSERT\s+[A-Za-z0-9_]+)\b").unwrap();
}

/// Title keywords routing a subsection to the risk checker
pub const RISK_TITLE_KEYWORDS: &[&str] = &["risk", "uncertaint", "hazard", "exposure"];

/// Title keywords routing a subsection to the financial checker
pub const FINANCIAL_TITLE_KEYWORDS: &[&str] = &[
    "financial",
    "finance",
    "revenue",
    "income",
    "profit",
    "earnings",
    "accounts",
    "balance sheet",
    "cash flow",
    "results of operations",
    "discussion and analysis",
    "dividend",
];

/// Title keywords routing a subsection to the governance checker
pub const GOVERNANCE_TITLE_KEYWORDS: &[&str] = &[
    "governance",
    "board",
    "director",
    "committee",
    "shareholder",
];

/// Modal / forward-looking words expected in risk prose
pub const MODAL_KEYWORDS: &[&str] = &["may", "could", "can", "might"];

/// Consequence words expected in risk prose
pub const CONSEQUENCE_KEYWORDS: &[&str] = &["impact", "affect", "result"];

/// Terms a financial subsection must discuss at least one of
pub const FINANCIAL_TERMS: &[&str] = &["revenue", "expense", "expenditure", "profit"];

pub const BOARD_KEYWORDS: &[&str] = &["board"];
pub const DIRECTOR_KEYWORDS: &[&str] = &["director"];
pub const COMMITTEE_KEYWORDS: &[&str] = &["committee"];

/// Find unfinished-content markers in `text`.
///
/// Detects bracketed tokens (`[...]`), `TBD`, runs of three or more `X`,
/// `PLACEHOLDER` and `INSERT <word>`, all case-insensitive. Matches are
/// returned once each, in order of first appearance, truncated to
/// [`MAX_PLACEHOLDER_DISPLAY`] characters. Markers inside a bracketed token
/// are reported as part of that token only.
pub fn detect_placeholders(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut spans: Vec<(usize, usize)> = BRACKETED
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();

    for m in MARKERS.find_iter(text) {
        let inside_bracket = spans
            .iter()
            .any(|(start, end)| m.start() >= *start && m.end() <= *end);
        if !inside_bracket {
            spans.push((m.start(), m.end()));
        }
    }
    spans.sort_unstable();

    let mut found: Vec<String> = Vec::new();
    for (start, end) in spans {
        let token = truncate_display(&text[start..end]);
        if !found.contains(&token) {
            found.push(token);
        }
    }
    found
}

fn truncate_display(token: &str) -> String {
    if token.chars().count() <= MAX_PLACEHOLDER_DISPLAY {
        return token.to_string();
    }
    let mut truncated: String = token.chars().take(MAX_PLACEHOLDER_DISPLAY - 3).collect();
    truncated.push_str("...");
    truncated
}

/// True when `keyword` occurs in `text` as a whole word
pub fn contains_word(text: &str, keyword: &str) -> bool {
    find_bounded(text, keyword, true)
}

/// True when a word in `text` starts with `stem` ("director" matches "directors")
pub fn contains_stem(text: &str, stem: &str) -> bool {
    find_bounded(text, stem, false)
}

pub fn contains_any_word(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| contains_word(text, kw))
}

pub fn contains_any_stem(text: &str, stems: &[&str]) -> bool {
    stems.iter().any(|kw| contains_stem(text, kw))
}

fn find_bounded(text: &str, keyword: &str, require_end: bool) -> bool {
    if keyword.is_empty() {
        return false;
    }
    let haystack = text.to_lowercase();
    let needle = keyword.to_lowercase();

    let mut offset = 0;
    while let Some(pos) = haystack[offset..].find(&needle) {
        let start = offset + pos;
        let end = start + needle.len();

        let starts_word = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let ends_word = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());

        if starts_word && (!require_end || ends_word) {
            return true;
        }
        offset = start + needle.chars().next().map_or(1, char::len_utf8);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_detects_insert_placeholder() {
        let found = detect_placeholders("Revenue grew [INSERT PERCENT]% this year.");
        assert_eq!(found, vec!["[INSERT PERCENT]".to_string()]);
    }

    #[test]
    fn test_detects_each_marker_family() {
        assert_eq!(detect_placeholders("Dividend policy is tbd."), vec!["tbd"]);
        assert_eq!(detect_placeholders("Contact XXXXX for details"), vec!["XXXXX"]);
        assert_eq!(detect_placeholders("PLACEHOLDER text"), vec!["PLACEHOLDER"]);
        assert_eq!(detect_placeholders("please insert date here"), vec!["insert date"]);
    }

    #[test]
    fn test_returns_unique_matches_in_order() {
        let found = detect_placeholders("TBD and [name] then TBD and [name] and [date]");
        assert_eq!(found, vec!["TBD", "[name]", "[date]"]);
    }

    #[test]
    fn test_long_tokens_are_truncated() {
        let text = format!("[{}]", "a".repeat(100));
        let found = detect_placeholders(&text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].chars().count(), MAX_PLACEHOLDER_DISPLAY);
        assert!(found[0].ends_with("..."));
    }

    #[test]
    fn test_complete_text_has_no_placeholders() {
        assert!(detect_placeholders("").is_empty());
        assert!(detect_placeholders("The board comprises seven directors.").is_empty());
        // two X's and words merely containing the markers do not count
        assert!(detect_placeholders("XX-ray results; outstanding placeholders").is_empty());
    }

    #[test]
    fn test_word_matching() {
        assert!(contains_word("Prices may fall", "may"));
        assert!(!contains_word("The mayor spoke", "may"));
        assert!(contains_stem("Seven directors serve", "director"));
        assert!(!contains_stem("Codirector notes", "director"));
        assert!(contains_any_stem("This impacts margins", CONSEQUENCE_KEYWORDS));
    }

    proptest! {
        #[test]
        fn bracketed_token_is_always_detected(
            prefix in "[a-z ]{0,30}",
            inner in "[A-Za-z0-9 ]{0,20}",
            suffix in "[a-z ]{0,30}",
        ) {
            let text = format!("{}[{}]{}", prefix, inner, suffix);
            prop_assert!(!detect_placeholders(&text).is_empty());
        }

        #[test]
        fn plain_lowercase_words_have_no_placeholders(text in "[a-w ]{0,80}") {
            // no brackets and no x; the word markers are filtered out
            prop_assume!(!text.contains("tbd"));
            prop_assume!(!text.contains("insert"));
            prop_assume!(!text.contains("placeholder"));
            prop_assert!(detect_placeholders(&text).is_empty());
        }

        #[test]
        fn detection_is_deterministic(text in ".{0,120}") {
            prop_assert_eq!(detect_placeholders(&text), detect_placeholders(&text));
        }
    }
}
