//! Supervisor: the per-turn finite-state machine.
//!
//! One instance of execution per user turn. Phases run strictly in
//! sequence; every retry or repair path is gated by a counter capped at
//! one, so a turn terminates within a small constant number of LLM
//! calls.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use citewire_core::defaults::{CONTEXT_MAX_TURNS, MAX_RETRIEVAL_RETRIES, NOT_FOUND_ANSWER};
use citewire_core::text::{sanitize, strip_invalid_citations};
use citewire_core::{
    AnalysisOutput, AnswerEvent, ConversationContext, ConversationRepository, ConversationTurn,
    Error, FinalResponse, GenerationBackend, Query, QueryIntent, ResponseMetadata, Result, Source,
    TurnRole, ValidationOutput,
};

use crate::analysis::AnalysisAgent;
use crate::evidence::ClaimEvidenceFinder;
use crate::events::EventSink;
use crate::followup::{FollowupKind, FollowupRouter};
use crate::intent::IntentClassifier;
use crate::pause::IngestGate;
use crate::retrieval::{RetrievalAgent, RetrievalOutcome};
use crate::validator::validate_citations;

const CLARIFY_SYSTEM: &str = "You answer a follow-up question about your previous answer using \
    only the numbered sources provided. Cite them with their markers, e.g. [Source 1]. If the \
    sources do not cover the question, say so plainly.";

/// Phase of a running turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    RouteFollowup,
    Clarify,
    RouteIntent,
    Retrieve,
    ValidateRetrieval,
    Analyze,
    ValidateAnalysis,
    RepairCitations,
    Finalize,
    Done,
}

/// Mutable state record threaded through the phases of one turn.
pub struct TurnRecord {
    pub message: String,
    pub thread_id: Option<Uuid>,
    pub context: ConversationContext,
    pub query: Option<Query>,
    pub followup_kind: Option<FollowupKind>,
    pub retrieval: Option<RetrievalOutcome>,
    pub analysis: Option<AnalysisOutput>,
    pub validation: Option<ValidationOutput>,
    /// Clarification answer, produced without a new search.
    pub clarification: Option<(String, Vec<Source>)>,
    pub retrieval_attempts: u32,
    pub repair_attempted: bool,
    pub response: Option<FinalResponse>,
}

impl TurnRecord {
    pub fn new(message: impl Into<String>, thread_id: Option<Uuid>) -> Self {
        Self {
            message: message.into(),
            thread_id,
            context: ConversationContext::default(),
            query: None,
            followup_kind: None,
            retrieval: None,
            analysis: None,
            validation: None,
            clarification: None,
            retrieval_attempts: 0,
            repair_attempted: false,
            response: None,
        }
    }
}

/// Top-level orchestrator composing routing, agents, validation, and
/// repair into one conversation turn.
pub struct Supervisor {
    followup: FollowupRouter,
    intent: IntentClassifier,
    retrieval: RetrievalAgent,
    analysis: AnalysisAgent,
    evidence: ClaimEvidenceFinder,
    generator: Arc<dyn GenerationBackend>,
    conversations: Arc<dyn ConversationRepository>,
    gate: IngestGate,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        followup: FollowupRouter,
        intent: IntentClassifier,
        retrieval: RetrievalAgent,
        analysis: AnalysisAgent,
        evidence: ClaimEvidenceFinder,
        generator: Arc<dyn GenerationBackend>,
        conversations: Arc<dyn ConversationRepository>,
        gate: IngestGate,
    ) -> Self {
        Self {
            followup,
            intent,
            retrieval,
            analysis,
            evidence,
            generator,
            conversations,
            gate,
        }
    }

    /// Answer one question, streaming progress through `sink`.
    ///
    /// Ingestion is paused for the duration of the turn so the corpus is
    /// never read half-written.
    #[instrument(skip(self, sink), fields(
        subsystem = "agents",
        component = "supervisor",
        op = "answer",
        thread_id = ?thread_id,
    ))]
    pub async fn answer(
        &self,
        question: &str,
        thread_id: Option<Uuid>,
        sink: &EventSink,
    ) -> Result<FinalResponse> {
        let _pause = self.gate.acquire();

        let mut record = TurnRecord::new(question, thread_id);
        let mut phase = TurnPhase::RouteFollowup;

        while phase != TurnPhase::Done {
            debug!(phase = ?phase, "Turn phase");
            phase = self.step(phase, &mut record, sink).await?;
        }

        let response = record
            .response
            .ok_or_else(|| Error::Internal("turn finished without a response".to_string()))?;
        sink.emit(AnswerEvent::Final {
            response: response.clone(),
        });
        Ok(response)
    }

    /// Apply one phase transition. Exposed so transitions are testable in
    /// isolation.
    pub async fn step(
        &self,
        phase: TurnPhase,
        record: &mut TurnRecord,
        sink: &EventSink,
    ) -> Result<TurnPhase> {
        match phase {
            TurnPhase::RouteFollowup => self.route_followup(record, sink).await,
            TurnPhase::Clarify => self.clarify(record).await,
            TurnPhase::RouteIntent => self.route_intent(record).await,
            TurnPhase::Retrieve => self.retrieve(record, sink).await,
            TurnPhase::ValidateRetrieval => self.validate_retrieval(record),
            TurnPhase::Analyze => self.analyze(record, sink).await,
            TurnPhase::ValidateAnalysis => self.validate_analysis(record),
            TurnPhase::RepairCitations => self.repair_citations(record, sink).await,
            TurnPhase::Finalize => self.finalize(record, sink).await,
            TurnPhase::Done => Ok(TurnPhase::Done),
        }
    }

    async fn route_followup(&self, record: &mut TurnRecord, sink: &EventSink) -> Result<TurnPhase> {
        if let Some(thread_id) = record.thread_id {
            let turns = self
                .conversations
                .last_turns(thread_id, CONTEXT_MAX_TURNS)
                .await?;
            record.context = ConversationContext {
                thread_id: Some(thread_id),
                turns,
            };
        }

        let decision = self.followup.route(&record.message, &record.context).await;
        record.followup_kind = Some(decision.kind);

        match decision.kind {
            // No prior sources means there is nothing to clarify against.
            FollowupKind::Clarification if record.context.last_assistant_sources().is_some() => {
                sink.status("answering from previous sources");
                Ok(TurnPhase::Clarify)
            }
            FollowupKind::Refinement => {
                record.query = Some(Query {
                    raw: record.message.clone(),
                    sanitized: sanitize(&record.message),
                    intent: QueryIntent::Retrieval,
                    lookback_days: 0,
                    refined: decision.refined.map(|r| sanitize(&r)),
                });
                Ok(TurnPhase::RouteIntent)
            }
            _ => Ok(TurnPhase::RouteIntent),
        }
    }

    /// Answer a clarification from the previous turn's stored sources.
    /// No new search happens.
    async fn clarify(&self, record: &mut TurnRecord) -> Result<TurnPhase> {
        let sources: Vec<Source> = record
            .context
            .last_assistant_sources()
            .unwrap_or_default()
            .to_vec();

        let mut prompt = String::from("Sources from the previous answer:\n");
        for (i, s) in sources.iter().enumerate() {
            prompt.push_str(&format!("[Source {}] {}: {}\n", i + 1, s.title, s.quote));
        }
        prompt.push_str(&format!("\nFollow-up: {}\n", record.message));

        let answer = self
            .generator
            .generate_with_system(CLARIFY_SYSTEM, &prompt)
            .await?;
        record.validation = Some(validate_citations(&answer, sources.len()));
        record.clarification = Some((answer, sources));
        Ok(TurnPhase::Finalize)
    }

    async fn route_intent(&self, record: &mut TurnRecord) -> Result<TurnPhase> {
        let sanitized = sanitize(&record.message);
        let routed = self.intent.classify(&sanitized).await;

        let refined = record.query.take().and_then(|q| q.refined);
        record.query = Some(Query {
            raw: record.message.clone(),
            sanitized,
            intent: routed.intent,
            lookback_days: routed.lookback_days,
            refined,
        });

        info!(intent = %routed.intent, lookback_days = routed.lookback_days, "Intent routed");
        match routed.intent {
            QueryIntent::Retrieval => Ok(TurnPhase::Retrieve),
            QueryIntent::Analysis => Ok(TurnPhase::Analyze),
        }
    }

    async fn retrieve(&self, record: &mut TurnRecord, sink: &EventSink) -> Result<TurnPhase> {
        let query = record
            .query
            .as_ref()
            .ok_or_else(|| Error::Internal("retrieve without a routed query".to_string()))?;

        record.retrieval_attempts += 1;
        let outcome = if record.retrieval_attempts == 1 {
            sink.status("searching");
            self.retrieval.run(query).await?
        } else {
            sink.status("refining answer");
            let issues = record
                .validation
                .as_ref()
                .map(|v| v.issues.clone())
                .unwrap_or_default();
            self.retrieval.retry(query, &issues).await?
        };

        record.retrieval = Some(outcome);
        Ok(TurnPhase::ValidateRetrieval)
    }

    fn validate_retrieval(&self, record: &mut TurnRecord) -> Result<TurnPhase> {
        let outcome = record
            .retrieval
            .as_ref()
            .ok_or_else(|| Error::Internal("validate without a retrieval".to_string()))?;

        let validation =
            validate_citations(&outcome.output.summary, outcome.output.sources.len());
        let retry = !validation.is_valid
            && record.retrieval_attempts <= MAX_RETRIEVAL_RETRIES
            && outcome.output.summary != NOT_FOUND_ANSWER;
        record.validation = Some(validation);

        if retry {
            info!(attempts = record.retrieval_attempts, "Validation failed, retrying retrieval");
            Ok(TurnPhase::Retrieve)
        } else {
            Ok(TurnPhase::Finalize)
        }
    }

    async fn analyze(&self, record: &mut TurnRecord, sink: &EventSink) -> Result<TurnPhase> {
        let query = record
            .query
            .as_ref()
            .ok_or_else(|| Error::Internal("analyze without a routed query".to_string()))?;

        sink.status("analyzing articles");
        let output = self.analysis.run(query, sink).await?;
        record.analysis = Some(output);
        Ok(TurnPhase::ValidateAnalysis)
    }

    fn validate_analysis(&self, record: &mut TurnRecord) -> Result<TurnPhase> {
        let output = record
            .analysis
            .as_ref()
            .ok_or_else(|| Error::Internal("validate without an analysis".to_string()))?;

        let validation = validate_citations(&output.summary, output.sources.len());
        let repair = !validation.is_valid && !record.repair_attempted;
        record.validation = Some(validation);

        if repair {
            Ok(TurnPhase::RepairCitations)
        } else {
            // Analysis never re-runs the map-reduce; an invalid answer
            // past the repair bound ships with its low confidence.
            Ok(TurnPhase::Finalize)
        }
    }

    async fn repair_citations(&self, record: &mut TurnRecord, sink: &EventSink) -> Result<TurnPhase> {
        let output = record
            .analysis
            .as_mut()
            .ok_or_else(|| Error::Internal("repair without an analysis".to_string()))?;

        sink.status("verifying citations");
        record.repair_attempted = true;

        let repaired = self.evidence.repair(&output.summary, &output.sources).await;
        output.summary = repaired.answer;
        output.sources.extend(repaired.new_sources);
        output.citation_count += repaired.citations_added;

        info!(citations_added = repaired.citations_added, "Citation repair applied");
        Ok(TurnPhase::ValidateAnalysis)
    }

    async fn finalize(&self, record: &mut TurnRecord, sink: &EventSink) -> Result<TurnPhase> {
        // The analysis agent already streamed its narrative during the
        // map-reduce; the other paths deliver their full answer here.
        let (answer, sources, confidence, validated, streamed) = match record.followup_kind {
            Some(FollowupKind::Clarification) if record.clarification.is_some() => {
                let (answer, sources) = record.clarification.take().unwrap_or_default();
                let v = record.validation.as_ref();
                let confidence = v.map(|v| v.confidence).unwrap_or(0);
                let validated = v.map(|v| v.is_valid).unwrap_or(false);
                (answer, sources, confidence, validated, false)
            }
            _ => match &record.analysis {
                Some(output) => {
                    let v = record.validation.as_ref();
                    // An empty window ships the plain not-found text with no
                    // sentiment annotations.
                    let answer = if output.articles_analyzed == 0 {
                        output.summary.clone()
                    } else {
                        annotate_analysis(output)
                    };
                    (
                        answer,
                        output.sources.clone(),
                        v.map(|v| v.confidence).unwrap_or(output.confidence),
                        v.map(|v| v.is_valid).unwrap_or(false),
                        true,
                    )
                }
                None => {
                    let outcome = record.retrieval.as_ref().ok_or_else(|| {
                        Error::Internal("finalize without any agent output".to_string())
                    })?;
                    let v = record.validation.as_ref();
                    (
                        outcome.output.summary.clone(),
                        outcome.output.sources.clone(),
                        v.map(|v| v.confidence).unwrap_or(outcome.confidence.score),
                        v.map(|v| v.is_valid).unwrap_or(false),
                        false,
                    )
                }
            },
        };

        // Markers that survived the retry and repair budget but point past
        // the source list never reach the client. Confidence keeps the
        // pre-strip validation score.
        let answer = strip_invalid_citations(&answer, sources.len());
        if !streamed {
            deliver(sink, &answer);
        }

        sink.emit(AnswerEvent::Sources {
            sources: sources.clone(),
        });

        let response = FinalResponse {
            answer,
            sources,
            confidence,
            validated,
            metadata: ResponseMetadata {
                retries_used: record.retrieval_attempts.saturating_sub(1)
                    + u32::from(record.repair_attempted),
                timestamp: Utc::now(),
            },
        };

        self.append_history(record, &response).await?;
        record.response = Some(response);
        Ok(TurnPhase::Done)
    }

    /// Append the finished turn to the conversation log, when threaded.
    async fn append_history(&self, record: &TurnRecord, response: &FinalResponse) -> Result<()> {
        let Some(thread_id) = record.thread_id else {
            return Ok(());
        };
        let now = Utc::now();
        self.conversations
            .append_turn(
                thread_id,
                &ConversationTurn {
                    role: TurnRole::User,
                    content: record.message.clone(),
                    sources: None,
                    created_at: now,
                },
            )
            .await?;
        self.conversations
            .append_turn(
                thread_id,
                &ConversationTurn {
                    role: TurnRole::Assistant,
                    content: response.answer.clone(),
                    sources: Some(response.sources.clone()),
                    created_at: now,
                },
            )
            .await
    }
}

/// Stream an already complete answer out in incremental deltas.
fn deliver(sink: &EventSink, text: &str) {
    use citewire_core::defaults::DELIVERY_CHUNK_WORDS;
    let words: Vec<&str> = text.split_whitespace().collect();
    for chunk in words.chunks(DELIVERY_CHUNK_WORDS) {
        if sink.is_closed() {
            return;
        }
        sink.delta(format!("{} ", chunk.join(" ")));
    }
}

/// Analysis answers carry sentiment, trend, and disclaimer annotations
/// under the narrative.
fn annotate_analysis(output: &AnalysisOutput) -> String {
    let mut answer = output.summary.clone();
    answer.push_str(&format!(
        "\n\nSentiment: {} ({:.0}% bullish / {:.0}% bearish / {:.0}% neutral across {} articles)",
        output.sentiment.overall,
        output.sentiment.bullish_pct,
        output.sentiment.bearish_pct,
        output.sentiment.neutral_pct,
        output.articles_analyzed,
    ));
    if !output.trends.is_empty() {
        answer.push_str(&format!("\nTrending: {}", output.trends.join(", ")));
    }
    answer.push_str("\n\nThis is news analysis, not financial advice.");
    answer
}
