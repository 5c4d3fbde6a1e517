//! Intent routing: retrieval vs analysis, plus lookback resolution.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use citewire_core::defaults::DEFAULT_LOOKBACK_DAYS;
use citewire_core::{GenerationBackend, QueryIntent};
use citewire_inference::complete_structured;

/// Phrases that mark a question as analytical regardless of phrasing.
const ANALYSIS_MARKERS: &[&str] = &[
    "trend",
    "sentiment",
    "predict",
    "forecast",
    "outlook",
    "analyze",
    "analyse",
    "analysis",
    "overall",
    "compare",
    "big picture",
    "how is the market",
];

/// Phrases that mark a question as plain fact retrieval.
const RETRIEVAL_MARKERS: &[&str] = &[
    "what happened",
    "what's new",
    "whats new",
    "latest news",
    "did ",
    "when ",
    "who ",
    "how much",
];

static LAST_N_DAYS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:last|past)\s+(\d{1,3})\s+day").expect("lookback regex"));
static LAST_N_WEEKS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:last|past)\s+(\d{1,2})\s+week").expect("lookback regex"));
static OVER_N_DAYS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"over\s+(\d{1,3})\s+day").expect("lookback regex"));

const CLASSIFY_SYSTEM: &str = "You classify crypto news questions. Respond with JSON only: \
    {\"intent\": \"retrieval\" or \"analysis\", \"lookback_days\": integer}. \
    Use \"analysis\" for trend, sentiment, or cross-article synthesis questions; \
    \"retrieval\" for specific facts.";

#[derive(Debug, Deserialize)]
struct IntentClassification {
    intent: QueryIntent,
    lookback_days: Option<u32>,
}

/// Classified routing decision for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutedIntent {
    pub intent: QueryIntent,
    pub lookback_days: u32,
}

/// Intent classifier with a keyword fast path and an LLM fallback.
pub struct IntentClassifier {
    backend: Option<Arc<dyn GenerationBackend>>,
}

impl IntentClassifier {
    /// Heuristic-only classifier.
    pub fn heuristic() -> Self {
        Self { backend: None }
    }

    /// Classifier that falls back to the LLM when keywords are inconclusive.
    pub fn with_backend(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Classify a sanitized question and resolve its lookback window.
    ///
    /// The keyword heuristic short-circuits when it matches; otherwise the
    /// LLM is consulted when available. An LLM failure degrades to the
    /// retrieval default rather than failing the turn.
    #[instrument(skip(self), fields(
        subsystem = "agents",
        component = "intent",
        op = "classify",
        query = %sanitized,
    ))]
    pub async fn classify(&self, sanitized: &str) -> RoutedIntent {
        let explicit_lookback = resolve_lookback(sanitized);

        if let Some(intent) = classify_keywords(sanitized) {
            let routed = RoutedIntent {
                intent,
                lookback_days: explicit_lookback.unwrap_or(DEFAULT_LOOKBACK_DAYS),
            };
            debug!(intent = %routed.intent, lookback_days = routed.lookback_days, fast_path = true, "Intent classified");
            return routed;
        }

        if let Some(backend) = &self.backend {
            match complete_structured::<IntentClassification>(
                backend.as_ref(),
                CLASSIFY_SYSTEM,
                sanitized,
            )
            .await
            {
                Ok(c) => {
                    let routed = RoutedIntent {
                        intent: c.intent,
                        lookback_days: explicit_lookback
                            .or(c.lookback_days)
                            .unwrap_or(DEFAULT_LOOKBACK_DAYS),
                    };
                    debug!(intent = %routed.intent, lookback_days = routed.lookback_days, fast_path = false, "Intent classified");
                    return routed;
                }
                Err(e) => {
                    warn!(error_msg = %e, "LLM intent classification failed, defaulting to retrieval");
                }
            }
        }

        RoutedIntent {
            intent: QueryIntent::Retrieval,
            lookback_days: explicit_lookback.unwrap_or(DEFAULT_LOOKBACK_DAYS),
        }
    }
}

/// Keyword fast path. Returns `None` when no marker matches.
fn classify_keywords(sanitized: &str) -> Option<QueryIntent> {
    if ANALYSIS_MARKERS.iter().any(|m| sanitized.contains(m)) {
        return Some(QueryIntent::Analysis);
    }
    if RETRIEVAL_MARKERS.iter().any(|m| sanitized.contains(m)) {
        return Some(QueryIntent::Retrieval);
    }
    None
}

/// Resolve an explicit time reference in the question to days.
pub fn resolve_lookback(sanitized: &str) -> Option<u32> {
    if let Some(caps) = LAST_N_DAYS_RE
        .captures(sanitized)
        .or_else(|| OVER_N_DAYS_RE.captures(sanitized))
    {
        return caps[1].parse().ok();
    }
    if let Some(caps) = LAST_N_WEEKS_RE.captures(sanitized) {
        return caps[1].parse::<u32>().ok().map(|w| w * 7);
    }
    if sanitized.contains("today") || sanitized.contains("last 24 hours") {
        return Some(1);
    }
    if sanitized.contains("this week") || sanitized.contains("past week") {
        return Some(7);
    }
    if sanitized.contains("this month") || sanitized.contains("past month") {
        return Some(30);
    }
    None
}
