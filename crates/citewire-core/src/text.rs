//! Text heuristics shared by search, validation, and citation repair.
//!
//! Everything here is pure and synchronous so the claim/citation edge cases
//! stay unit-testable without any I/O.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Stop words filtered out of search terms and trend keywords.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "and", "or", "but", "of", "in", "on", "at", "to", "for", "with", "is",
        "are", "was", "were", "be", "been", "being", "it", "its", "this", "that", "these", "those",
        "what", "which", "who", "whom", "when", "where", "why", "how", "all", "any", "both",
        "each", "few", "more", "most", "other", "some", "such", "not", "only", "same", "so",
        "than", "too", "very", "can", "will", "just", "about", "into", "over", "after", "before",
        "up", "down", "out", "as", "by", "from", "has", "have", "had", "do", "does", "did",
        "their", "there", "they", "them", "then", "new", "news", "latest",
    ]
    .into_iter()
    .collect()
});

/// Sentence openers exempt from the uncited-claim check. These introduce
/// transitions or summaries rather than standalone factual assertions.
static TRANSITION_WORDS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "however",
        "overall",
        "in summary",
        "in conclusion",
        "additionally",
        "furthermore",
        "meanwhile",
        "moreover",
        "that said",
        "on the other hand",
        "in short",
        "notably",
        "finally",
    ]
});

/// `[Source N]` citation marker.
static CITATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[Source\s+(\d+)\]").expect("citation regex"));

/// `[Source N]` marker plus the whitespace run before it, for removal.
static CITATION_WITH_LEAD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\[Source\s+(\d+)\]").expect("citation strip regex"));

/// A percentage or a dollar amount, the shapes a factual market claim
/// usually takes.
static FACTUAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?\s*%)|(\$\s?\d[\d,]*(?:\.\d+)?)").expect("factual regex")
});

/// Sanitize raw question text: collapse whitespace, strip control characters
/// and characters that would confuse tsquery construction, lowercase.
pub fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || matches!(c, '$' | '%' | '.' | '-') {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Extract stop-word-filtered search terms from sanitized text.
pub fn search_terms(sanitized: &str) -> Vec<String> {
    sanitized
        .split_whitespace()
        .filter(|w| w.len() > 1 && !STOP_WORDS.contains(*w))
        .map(|w| w.trim_matches(|c: char| c == '.' || c == '-').to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

/// True when `word` is a stop word.
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}

/// Split answer text into sentences longer than `min_len` characters.
///
/// Splitting is deliberately simple (terminal punctuation followed by
/// whitespace); citation markers stay attached to their sentence.
pub fn split_sentences(text: &str, min_len: usize) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            // Keep a trailing citation marker with its sentence.
            let at_boundary = chars.peek().map(|n| n.is_whitespace()).unwrap_or(true);
            if at_boundary {
                let trimmed = current.trim();
                if trimmed.len() > min_len {
                    sentences.push(trimmed.to_string());
                }
                current.clear();
            }
        }
    }
    let trimmed = current.trim();
    if trimmed.len() > min_len {
        sentences.push(trimmed.to_string());
    }
    sentences
}

/// True when the sentence opens with a transition word and is exempt from
/// the uncited-claim check.
pub fn starts_with_transition(sentence: &str) -> bool {
    let lower = sentence.trim_start().to_lowercase();
    TRANSITION_WORDS.iter().any(|t| lower.starts_with(t))
}

/// True when the sentence contains at least one `[Source N]` marker.
pub fn has_citation_marker(sentence: &str) -> bool {
    CITATION_RE.is_match(sentence)
}

/// All citation ordinals appearing in `text`, deduplicated, in first-seen
/// order.
pub fn citation_ordinals(text: &str) -> Vec<usize> {
    let mut seen = HashSet::new();
    let mut ordinals = Vec::new();
    for cap in CITATION_RE.captures_iter(text) {
        if let Ok(n) = cap[1].parse::<usize>() {
            if seen.insert(n) {
                ordinals.push(n);
            }
        }
    }
    ordinals
}

/// Remove `[Source N]` markers whose ordinal falls outside
/// `1..=total_sources`, along with the whitespace run before them. Valid
/// markers pass through untouched.
pub fn strip_invalid_citations(text: &str, total_sources: usize) -> String {
    CITATION_WITH_LEAD_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            match caps[1].parse::<usize>() {
                Ok(n) if n >= 1 && n <= total_sources => caps[0].to_string(),
                _ => String::new(),
            }
        })
        .into_owned()
}

/// Heuristic for whether a sentence asserts a checkable fact: a percentage,
/// a dollar amount, or a capitalized token past the first word (a proper
/// noun), or simple length beyond `factual_len`.
pub fn looks_factual(sentence: &str, factual_len: usize) -> bool {
    if FACTUAL_RE.is_match(sentence) {
        return true;
    }
    // First word is skipped: ordinary sentence-initial capitalization.
    let has_proper_noun = sentence
        .split_whitespace()
        .skip(1)
        .filter(|w| !has_citation_marker(w))
        .any(|w| {
            w.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
                && w.chars().any(|c| c.is_lowercase())
        });
    has_proper_noun || sentence.len() > factual_len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_punctuation_and_lowercases() {
        assert_eq!(
            sanitize("What's new with Bitcoin today?!"),
            "what s new with bitcoin today"
        );
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize("  eth \t price\n today "), "eth price today");
    }

    #[test]
    fn test_sanitize_keeps_amounts() {
        assert_eq!(sanitize("BTC above $60,000?"), "btc above $60 000");
        assert_eq!(sanitize("up 12% today"), "up 12% today");
    }

    #[test]
    fn test_search_terms_filters_stop_words() {
        let terms = search_terms("what is the latest news about bitcoin etf inflows");
        assert_eq!(terms, vec!["bitcoin", "etf", "inflows"]);
    }

    #[test]
    fn test_search_terms_empty_after_filtering() {
        let terms = search_terms("what is the");
        assert!(terms.is_empty());
    }

    #[test]
    fn test_split_sentences_minimum_length() {
        let sentences = split_sentences("Short. This sentence is long enough to count.", 20);
        assert_eq!(sentences.len(), 1);
        assert!(sentences[0].starts_with("This sentence"));
    }

    #[test]
    fn test_split_sentences_no_terminal_punctuation() {
        let sentences = split_sentences("a trailing fragment that never terminates", 20);
        assert_eq!(sentences.len(), 1);
    }

    #[test]
    fn test_split_sentences_decimal_not_boundary() {
        let sentences = split_sentences("Bitcoin rose 3.5 percent before the close today.", 20);
        assert_eq!(sentences.len(), 1);
    }

    #[test]
    fn test_transition_exemption() {
        assert!(starts_with_transition("However, prices kept falling."));
        assert!(starts_with_transition("In summary, the market was flat."));
        assert!(!starts_with_transition("Bitcoin fell 5% overnight."));
    }

    #[test]
    fn test_citation_ordinals_deduplicated_in_order() {
        let text = "A [Source 2]. B [Source 1]. C [Source 2].";
        assert_eq!(citation_ordinals(text), vec![2, 1]);
    }

    #[test]
    fn test_citation_ordinals_none() {
        assert!(citation_ordinals("no markers here").is_empty());
    }

    #[test]
    fn test_strip_invalid_citations_removes_out_of_range_markers() {
        let text = "BTC rose 4% [Source 1]. ETH followed [Source 7].";
        assert_eq!(
            strip_invalid_citations(text, 2),
            "BTC rose 4% [Source 1]. ETH followed."
        );
    }

    #[test]
    fn test_strip_invalid_citations_keeps_valid_markers() {
        let text = "A [Source 1] and B [Source 2].";
        assert_eq!(strip_invalid_citations(text, 2), text);
    }

    #[test]
    fn test_strip_invalid_citations_zero_sources_drops_everything() {
        assert_eq!(strip_invalid_citations("Flat day [Source 1].", 0), "Flat day.");
    }

    #[test]
    fn test_has_citation_marker() {
        assert!(has_citation_marker("Prices rose [Source 3]."));
        assert!(!has_citation_marker("Prices rose."));
    }

    #[test]
    fn test_looks_factual_percentage() {
        assert!(looks_factual("XRP surged 12% after the ruling.", 50));
    }

    #[test]
    fn test_looks_factual_dollar_amount() {
        assert!(looks_factual("it traded near $64,000 overnight.", 50));
    }

    #[test]
    fn test_looks_factual_proper_noun() {
        assert!(looks_factual("The move followed remarks from Powell.", 50));
    }

    #[test]
    fn test_looks_factual_length_fallback() {
        assert!(looks_factual(
            "the broader market kept drifting sideways without direction all session",
            50
        ));
        assert!(!looks_factual("the market drifted.", 50));
    }
}
