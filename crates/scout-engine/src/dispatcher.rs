//! Session stream dispatcher.
//!
//! Drains one turn's queue in arrival order and forwards a client
//! notification for each event on the session's outbound channel.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use scout_core::notifications::{Notification, Sender};
use scout_core::{ArtifactId, MessageId, StreamEvent};

use crate::queue::TurnStream;

/// How a dispatch ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// `Done` was reached.
    Completed,
    /// The outbound channel closed; the rest of the turn was not delivered.
    Abandoned,
    /// `Done` was reached after the turn had been cancelled.
    Cancelled,
    /// The queue ended without `Done`.
    QueueClosed,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
            Self::Cancelled => "cancelled",
            Self::QueueClosed => "queue_closed",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct DispatchReport {
    pub outcome: DispatchOutcome,
    /// Notifications delivered to the outbound channel.
    pub notifications: usize,
    /// Accumulated chat or error text.
    pub chat_text: String,
    pub message_id: Option<MessageId>,
    pub sender: Option<Sender>,
    pub artifacts: usize,
    pub violations: usize,
}

impl DispatchReport {
    /// Report for a turn whose queue was never drained.
    pub fn skipped(outcome: DispatchOutcome) -> Self {
        Self {
            outcome,
            notifications: 0,
            chat_text: String::new(),
            message_id: None,
            sender: None,
            artifacts: 0,
            violations: 0,
        }
    }
}

enum Step {
    Emit(Notification),
    Skip,
    Finish(Option<Notification>),
}

/// Per-turn translation state.
#[derive(Default)]
struct TurnState {
    open_artifact: Option<ArtifactId>,
    message_id: Option<MessageId>,
    text: String,
    saw_error: bool,
    artifacts: usize,
    violations: usize,
}

impl TurnState {
    fn translate(&mut self, event: StreamEvent) -> Step {
        match event {
            StreamEvent::ArtifactStart {
                artifact_id,
                artifact_type,
                metadata,
            } => {
                if let Some(open) = &self.open_artifact {
                    let reason = format!("start while {open} is open");
                    return self.violation(&artifact_id, reason);
                }
                self.open_artifact = Some(artifact_id.clone());
                self.artifacts += 1;
                Step::Emit(Notification::ArtifactStreamStart {
                    artifact_id,
                    artifact_type,
                    metadata,
                })
            }
            StreamEvent::ArtifactChunk { artifact_id, payload } => {
                if self.open_artifact.as_ref() != Some(&artifact_id) {
                    return self.violation(&artifact_id, "chunk for an artifact that is not open".into());
                }
                Step::Emit(Notification::ArtifactStreamChunk {
                    artifact_id,
                    chunk_data: payload,
                })
            }
            StreamEvent::ArtifactEnd { artifact_id } => {
                if self.open_artifact.as_ref() != Some(&artifact_id) {
                    return self.violation(&artifact_id, "end for an artifact that is not open".into());
                }
                self.open_artifact = None;
                Step::Emit(Notification::ArtifactStreamEnd { artifact_id })
            }
            StreamEvent::ChatChunk { text } => Step::Emit(self.message_chunk(text, Sender::Ai)),
            StreamEvent::Error { message } => {
                self.saw_error = true;
                Step::Emit(self.message_chunk(message, Sender::AiError))
            }
            StreamEvent::Done => Step::Finish(self.message_end()),
        }
    }

    fn message_chunk(&mut self, text: String, sender: Sender) -> Notification {
        let is_first_chunk = self.message_id.is_none();
        let id = self.message_id.get_or_insert_with(MessageId::new).clone();
        self.text.push_str(&text);
        Notification::AiMessageChunk {
            id,
            text,
            sender,
            is_first_chunk,
        }
    }

    fn message_end(&self) -> Option<Notification> {
        let id = self.message_id.clone()?;
        Some(Notification::AiMessageEnd {
            id,
            sender: self.end_sender(),
            full_response: self.text.clone(),
        })
    }

    fn end_sender(&self) -> Sender {
        if self.saw_error || self.text.starts_with("ERROR:") {
            Sender::AiError
        } else {
            Sender::Ai
        }
    }

    fn violation(&mut self, artifact_id: &ArtifactId, reason: String) -> Step {
        self.violations += 1;
        warn!(artifact_id = %artifact_id, reason = %reason, "protocol violation, skipping event");
        Step::Skip
    }
}

/// Drain `stream` until `Done`, forwarding notifications to `outbound`.
///
/// Cancellation does not interrupt the drain: the producer observes the same
/// token and still closes its queue, so open artifacts and messages are ended
/// for the client.
pub async fn dispatch_turn(
    outbound: &mpsc::Sender<Notification>,
    mut stream: TurnStream,
    cancel: &CancellationToken,
) -> DispatchReport {
    let mut state = TurnState::default();
    let mut delivered = 0usize;

    let outcome = loop {
        let Some(event) = stream.recv().await else {
            warn!("turn queue ended without Done");
            break DispatchOutcome::QueueClosed;
        };
        let kind = event.event_type();

        let (notification, finished) = match state.translate(event) {
            Step::Emit(n) => (Some(n), false),
            Step::Skip => (None, false),
            Step::Finish(n) => (n, true),
        };

        if let Some(n) = notification {
            if outbound.send(n).await.is_err() {
                debug!(event = kind, "outbound channel closed, abandoning turn");
                break DispatchOutcome::Abandoned;
            }
            delivered += 1;
        }

        if finished {
            break if cancel.is_cancelled() {
                DispatchOutcome::Cancelled
            } else {
                DispatchOutcome::Completed
            };
        }
    };

    let sender = state.message_id.as_ref().map(|_| state.end_sender());
    DispatchReport {
        outcome,
        notifications: delivered,
        chat_text: state.text,
        message_id: state.message_id,
        sender,
        artifacts: state.artifacts,
        violations: state.violations,
    }
}
