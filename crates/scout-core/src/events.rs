use serde::{Deserialize, Serialize};

use crate::artifacts::{ArtifactMetadata, ArtifactPayload, ArtifactType};
use crate::ids::ArtifactId;

/// Events pushed onto a turn's queue by the producer. Ordering contract:
///
/// (ArtifactStart → ArtifactChunk* → ArtifactEnd)* → (ChatChunk* | Error) → Done
///
/// `Done` is always last and appears exactly once per turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stream_type", rename_all = "snake_case")]
pub enum StreamEvent {
    ArtifactStart {
        artifact_id: ArtifactId,
        artifact_type: ArtifactType,
        metadata: ArtifactMetadata,
    },
    ArtifactChunk {
        artifact_id: ArtifactId,
        payload: ArtifactPayload,
    },
    ArtifactEnd {
        artifact_id: ArtifactId,
    },
    ChatChunk {
        text: String,
    },
    Error {
        message: String,
    },
    Done,
}

impl StreamEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ArtifactStart { .. } => "artifact_start",
            Self::ArtifactChunk { .. } => "artifact_chunk",
            Self::ArtifactEnd { .. } => "artifact_end",
            Self::ChatChunk { .. } => "chat_chunk",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_done_is_terminal() {
        assert!(StreamEvent::Done.is_terminal());
        assert!(!StreamEvent::ChatChunk { text: "x".into() }.is_terminal());
        assert!(!StreamEvent::Error { message: "x".into() }.is_terminal());
    }

    #[test]
    fn serde_tag_matches_event_type() {
        let event = StreamEvent::ChatChunk { text: "Hi".into() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["stream_type"], event.event_type());
        assert_eq!(json["text"], "Hi");

        let done = serde_json::to_value(StreamEvent::Done).unwrap();
        assert_eq!(done, serde_json::json!({"stream_type": "done"}));
    }
}
