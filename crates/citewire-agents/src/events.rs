//! Event delivery from a running turn to the transport layer.

use tokio::sync::mpsc;
use tracing::debug;

use citewire_core::AnswerEvent;

/// Sending half of a turn's event stream.
///
/// A closed receiver means the client disconnected; emission becomes a
/// no-op and the turn keeps running to completion, observing the
/// disconnect cooperatively between chunks. Sending never errors.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<AnswerEvent>,
}

impl EventSink {
    /// Create a sink and its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AnswerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event. Silently dropped after client disconnect.
    pub fn emit(&self, event: AnswerEvent) {
        if self.tx.send(event).is_err() {
            debug!("Event receiver closed, dropping event");
        }
    }

    /// Emit a human-readable stage marker.
    pub fn status(&self, message: impl Into<String>) {
        self.emit(AnswerEvent::Status {
            message: message.into(),
        });
    }

    /// Emit an incremental answer fragment.
    pub fn delta(&self, text: impl Into<String>) {
        self.emit(AnswerEvent::Delta { text: text.into() });
    }

    /// True once the client has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
