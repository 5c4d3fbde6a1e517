//! Follow-up routing at turn entry.
//!
//! Decides whether an incoming message is a fresh question, a
//! clarification of the previous answer (answered from prior sources,
//! no new search), or a refinement of an earlier topic. Ambiguity is
//! resolved carefully: low confidence always routes as a new query,
//! the safe choice.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, instrument, warn};

use citewire_core::defaults::FOLLOWUP_MIN_CONFIDENCE;
use citewire_core::text::search_terms;
use citewire_core::{ConversationContext, GenerationBackend};
use citewire_inference::complete_structured;

/// How the incoming message relates to the conversation so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowupKind {
    NewQuery,
    Clarification,
    Refinement,
}

/// Routing decision for the turn's entry state.
#[derive(Debug, Clone)]
pub struct FollowupDecision {
    pub kind: FollowupKind,
    pub confidence: f32,
    /// Rewritten standalone query for a refinement.
    pub refined: Option<String>,
}

impl FollowupDecision {
    fn new_query() -> Self {
        Self {
            kind: FollowupKind::NewQuery,
            confidence: 1.0,
            refined: None,
        }
    }
}

/// Patterns that mark a clarification of the previous answer.
const CLARIFICATION_PATTERNS: &[&str] = &[
    "are you sure",
    "really?",
    "what do you mean",
    "can you explain that",
    "why do you say that",
    "source for that",
];

/// Leading phrases that mark a refinement of the prior topic.
const REFINEMENT_PREFIXES: &[&str] = &["what about", "how about", "and what", "also ", "and for"];

const ROUTE_SYSTEM: &str = "You route messages in a news Q&A conversation. Respond with JSON \
    only: {\"kind\": \"new_query\" | \"clarification\" | \"refinement\", \
    \"confidence\": number 0-1, \"refined_query\": string or null}. A clarification questions \
    the previous answer; a refinement narrows or shifts the prior topic and must include a \
    standalone rewritten query.";

#[derive(Debug, Deserialize)]
struct RoutedFollowup {
    kind: FollowupKind,
    confidence: f32,
    refined_query: Option<String>,
}

/// Follow-up router with a pattern fast path and an LLM fallback.
pub struct FollowupRouter {
    backend: Option<Arc<dyn GenerationBackend>>,
}

impl FollowupRouter {
    pub fn heuristic() -> Self {
        Self { backend: None }
    }

    pub fn with_backend(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Route a message against the loaded conversation context.
    #[instrument(skip(self, context), fields(
        subsystem = "agents",
        component = "followup",
        op = "route",
        turn_count = context.turns.len(),
    ))]
    pub async fn route(&self, message: &str, context: &ConversationContext) -> FollowupDecision {
        if context.turns.is_empty() {
            return FollowupDecision::new_query();
        }

        if let Some(decision) = route_patterns(message, context) {
            debug!(kind = ?decision.kind, confidence = decision.confidence, fast_path = true, "Follow-up routed");
            return decision;
        }

        if let Some(backend) = &self.backend {
            match self.route_llm(backend.as_ref(), message, context).await {
                Ok(decision) => {
                    debug!(kind = ?decision.kind, confidence = decision.confidence, fast_path = false, "Follow-up routed");
                    return decision;
                }
                Err(e) => {
                    warn!(error_msg = %e, "LLM follow-up routing failed, treating as new query");
                }
            }
        }

        FollowupDecision::new_query()
    }

    async fn route_llm(
        &self,
        backend: &dyn GenerationBackend,
        message: &str,
        context: &ConversationContext,
    ) -> citewire_core::Result<FollowupDecision> {
        let history: String = context
            .turns
            .iter()
            .map(|t| format!("{:?}: {}\n", t.role, t.content))
            .collect();
        let prompt = format!("Conversation so far:\n{}\nNew message: {}", history, message);

        let routed = complete_structured::<RoutedFollowup>(backend, ROUTE_SYSTEM, &prompt).await?;

        // Below the confidence floor the safe choice is a fresh search.
        if routed.confidence < FOLLOWUP_MIN_CONFIDENCE {
            return Ok(FollowupDecision::new_query());
        }

        let refined = match routed.kind {
            FollowupKind::Refinement => Some(
                routed
                    .refined_query
                    .filter(|q| !q.trim().is_empty())
                    .unwrap_or_else(|| recover_topic(message, context)),
            ),
            _ => None,
        };

        Ok(FollowupDecision {
            kind: routed.kind,
            confidence: routed.confidence,
            refined,
        })
    }
}

/// Pattern fast path. Returns `None` when no pattern matches.
fn route_patterns(message: &str, context: &ConversationContext) -> Option<FollowupDecision> {
    let lower = message.trim().to_lowercase();

    if CLARIFICATION_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(FollowupDecision {
            kind: FollowupKind::Clarification,
            confidence: 0.9,
            refined: None,
        });
    }

    if REFINEMENT_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return Some(FollowupDecision {
            kind: FollowupKind::Refinement,
            confidence: 0.9,
            refined: Some(recover_topic(message, context)),
        });
    }

    None
}

/// Build a standalone query for an implicit refinement by folding in
/// topic terms from the first turn of history.
fn recover_topic(message: &str, context: &ConversationContext) -> String {
    let Some(first) = context.first_user_content() else {
        return message.to_string();
    };

    let message_lower = message.to_lowercase();
    let topic_terms: Vec<String> = search_terms(&first.to_lowercase())
        .into_iter()
        .filter(|t| !message_lower.contains(t.as_str()))
        .collect();

    if topic_terms.is_empty() {
        message.to_string()
    } else {
        format!("{} {}", message.trim(), topic_terms.join(" "))
    }
}
