//! Mechanical citation validation. No LLM involved.

use tracing::{debug, instrument};

use citewire_core::defaults::{
    CLAIM_MIN_SENTENCE_LEN, ISSUE_PENALTY, UNCITED_CLAIM_TOLERANCE, VALIDATION_THRESHOLD,
};
use citewire_core::text::{
    citation_ordinals, has_citation_marker, split_sentences, starts_with_transition,
};
use citewire_core::ValidationOutput;

/// Verify citation integrity of generated answer text against the number
/// of available sources.
///
/// Two issue classes: `invalid_citation` for any ordinal outside
/// `[1, total_sources]`, and `uncited_claims` when more than the
/// tolerated number of substantive sentences carry no marker. Sentences
/// opening with a transition word are exempt; they continue an already
/// cited thought.
#[instrument(skip(answer), fields(
    subsystem = "agents",
    component = "validator",
    op = "validate",
    total_sources,
))]
pub fn validate_citations(answer: &str, total_sources: usize) -> ValidationOutput {
    let ordinals = citation_ordinals(answer);
    let mut issues = Vec::new();

    let citations_total = ordinals.len();
    let mut citations_valid = 0;
    for n in &ordinals {
        if *n >= 1 && *n <= total_sources {
            citations_valid += 1;
        } else {
            issues.push(format!(
                "invalid_citation: [Source {}] with only {} sources",
                n, total_sources
            ));
        }
    }

    let uncited = split_sentences(answer, CLAIM_MIN_SENTENCE_LEN)
        .into_iter()
        .filter(|s| !has_citation_marker(s) && !starts_with_transition(s))
        .count();
    if uncited > UNCITED_CLAIM_TOLERANCE {
        issues.push(format!("uncited_claims: {} sentences lack citations", uncited));
    }

    let confidence = 100u8.saturating_sub(ISSUE_PENALTY.saturating_mul(issues.len() as u8));

    let output = ValidationOutput {
        confidence,
        is_valid: confidence >= VALIDATION_THRESHOLD,
        issues,
        citations_valid,
        citations_total,
    };

    debug!(
        confidence = output.confidence,
        is_valid = output.is_valid,
        citations_valid = output.citations_valid,
        citations_total = output.citations_total,
        "Citations validated"
    );
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fully_cited_answer_is_valid() {
        let answer = "Bitcoin ETF inflows rose sharply this week [Source 1]. \
            Institutional demand drove most of the movement [Source 2].";
        let v = validate_citations(answer, 2);
        assert_eq!(v.confidence, 100);
        assert!(v.is_valid);
        assert!(v.issues.is_empty());
        assert_eq!(v.citations_valid, 2);
        assert_eq!(v.citations_total, 2);
    }

    #[test]
    fn test_out_of_range_ordinal_is_flagged() {
        let answer = "Inflows rose [Source 1]. Outflows fell sharply as well [Source 9].";
        let v = validate_citations(answer, 5);
        assert_eq!(v.issues.len(), 1);
        assert!(v.issues[0].starts_with("invalid_citation"));
        assert_eq!(v.confidence, 85);
        assert!(v.is_valid);
        assert_eq!(v.citations_valid, 1);
        assert_eq!(v.citations_total, 2);
    }

    #[test]
    fn test_duplicate_markers_counted_once() {
        let answer = "Inflows rose [Source 1]. They kept rising later in the week [Source 1].";
        let v = validate_citations(answer, 1);
        assert_eq!(v.citations_total, 1);
        assert_eq!(v.citations_valid, 1);
    }

    #[test]
    fn test_tolerated_uncited_sentences() {
        // Two uncited substantive sentences are within tolerance.
        let answer = "Bitcoin inflows rose sharply this week [Source 1]. \
            The broader market followed the same pattern. \
            Trading volumes were elevated across exchanges.";
        let v = validate_citations(answer, 1);
        assert!(v.issues.is_empty());
    }

    #[test]
    fn test_excess_uncited_sentences_flagged() {
        let answer = "Bitcoin inflows rose sharply this week. \
            The broader market followed the same pattern overnight. \
            Trading volumes were elevated across exchanges. \
            Derivatives positioning shifted toward longs as well.";
        let v = validate_citations(answer, 1);
        assert_eq!(v.issues.len(), 1);
        assert!(v.issues[0].starts_with("uncited_claims"));
        assert_eq!(v.confidence, 85);
    }

    #[test]
    fn test_transition_sentences_exempt() {
        let answer = "Inflows rose sharply this week [Source 1]. \
            However, the pace slowed towards the weekend. \
            Overall, the direction remains clearly positive. \
            In summary, demand is holding up well for now.";
        let v = validate_citations(answer, 1);
        assert!(v.issues.is_empty());
    }

    #[test]
    fn test_confidence_floors_at_zero() {
        let answer = "A [Source 7]. B [Source 8]. C [Source 9]. D [Source 10]. \
            E [Source 11]. F [Source 12]. G [Source 13]. H [Source 14].";
        let v = validate_citations(answer, 1);
        assert_eq!(v.confidence, 0);
        assert!(!v.is_valid);
    }

    #[test]
    fn test_no_citations_no_sources() {
        let v = validate_citations("Nothing relevant was found for this question.", 0);
        assert_eq!(v.citations_total, 0);
        // One uncited sentence is within tolerance.
        assert!(v.issues.is_empty());
    }
}
