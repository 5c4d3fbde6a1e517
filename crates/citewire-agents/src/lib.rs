//! Agent layer for citewire.
//!
//! Routing (follow-up and intent), the retrieval and analysis agents,
//! citation validation and repair, and the supervisor state machine
//! that composes them into one conversation turn.

pub mod analysis;
pub mod cache;
pub mod events;
pub mod evidence;
pub mod followup;
pub mod intent;
pub mod pause;
pub mod retrieval;
pub mod supervisor;
pub mod validator;

pub use analysis::AnalysisAgent;
pub use cache::{Clock, SystemClock, TtlCache};
pub use events::EventSink;
pub use evidence::{ClaimEvidenceFinder, RepairResult};
pub use followup::{FollowupDecision, FollowupKind, FollowupRouter};
pub use intent::{IntentClassifier, RoutedIntent};
pub use pause::{IngestGate, IngestPauseGuard};
pub use retrieval::{RetrievalAgent, RetrievalOutcome};
pub use supervisor::{Supervisor, TurnPhase, TurnRecord};
pub use validator::validate_citations;
