//! Follow-up handling across threaded turns: clarifications answered
//! from stored sources, refinements re-grounded in the prior topic.

mod helpers;

use citewire_agents::EventSink;
use citewire_inference::MockInferenceBackend;
use uuid::Uuid;

use helpers::{assistant_turn, chunk_hit, harness, source, user_turn};

#[tokio::test]
async fn test_clarification_answers_from_prior_sources_without_search() {
    let backend = MockInferenceBackend::new()
        .with_fixed_response("Yes, the approval was confirmed in the filing [Source 1].");
    let h = harness(backend, Vec::new());

    let thread_id = Uuid::new_v4();
    h.conversations.seed(
        thread_id,
        vec![
            user_turn("what happened with the bitcoin etf"),
            assistant_turn(
                "It was approved this week [Source 1].",
                vec![source("ETF approval confirmed")],
            ),
        ],
    );
    let (sink, _rx) = EventSink::channel();

    let response = h
        .supervisor
        .answer("Are you sure about that?", Some(thread_id), &sink)
        .await
        .unwrap();

    // No embedding means no new search ran.
    assert_eq!(h.backend.embed_call_count(), 0);
    assert_eq!(h.backend.generate_call_count(), 1);
    assert!(response.validated);
    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].title, "ETF approval confirmed");
    assert_eq!(h.conversations.turn_count(thread_id), 4);
}

#[tokio::test]
async fn test_refinement_recovers_prior_topic_terms() {
    let backend = MockInferenceBackend::new()
        .with_fixed_response("Engineers restored block production within hours [Source 1].");
    let h = harness(
        backend,
        vec![chunk_hit(
            "Solana outage recovery developments and timeline",
            "The Solana outage recovery developments followed a clear timeline.",
            0.8,
            3,
        )],
    );

    let thread_id = Uuid::new_v4();
    h.conversations.seed(
        thread_id,
        vec![
            user_turn("solana outage recovery timeline"),
            assistant_turn(
                "Validators restarted the network [Source 1].",
                vec![source("Solana restart")],
            ),
        ],
    );
    let (sink, _rx) = EventSink::channel();

    let response = h
        .supervisor
        .answer("What about the latest developments?", Some(thread_id), &sink)
        .await
        .unwrap();

    assert!(response.validated);
    assert!(response.answer.contains("[Source 1]"));

    // A new search ran, grounded in the recovered topic.
    assert!(h.backend.embed_call_count() >= 1);
    let answer_prompt = h
        .backend
        .get_calls()
        .into_iter()
        .filter(|c| c.operation == "generate_with_system")
        .last()
        .expect("an answer generation call");
    assert!(answer_prompt.input.contains("solana"));
}
