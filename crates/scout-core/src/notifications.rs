//! Wire types exchanged with chat clients.
//!
//! Every frame is an envelope `{ "type": <kind>, "data": { ... } }`. The kinds
//! mirror the event names the web client listens for.

use serde::{Deserialize, Serialize};

use crate::artifacts::{ArtifactMetadata, ArtifactPayload, ArtifactType};
use crate::ids::{ArtifactId, MessageId, SessionId};

/// Author tag attached to chat message notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Ai,
    AiError,
}

/// Server → client notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Notification {
    Connected {
        session_id: SessionId,
    },
    ArtifactStreamStart {
        artifact_id: ArtifactId,
        artifact_type: ArtifactType,
        metadata: ArtifactMetadata,
    },
    ArtifactStreamChunk {
        artifact_id: ArtifactId,
        chunk_data: ArtifactPayload,
    },
    ArtifactStreamEnd {
        artifact_id: ArtifactId,
    },
    AiMessageChunk {
        id: MessageId,
        text: String,
        sender: Sender,
        is_first_chunk: bool,
    },
    AiMessageEnd {
        id: MessageId,
        sender: Sender,
        full_response: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::ArtifactStreamStart { .. } => "artifact_stream_start",
            Self::ArtifactStreamChunk { .. } => "artifact_stream_chunk",
            Self::ArtifactStreamEnd { .. } => "artifact_stream_end",
            Self::AiMessageChunk { .. } => "ai_message_chunk",
            Self::AiMessageEnd { .. } => "ai_message_end",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Client → server frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    SendChatMessage { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_envelope_shape() {
        let id = MessageId::from_raw("msg_1");
        let n = Notification::AiMessageChunk {
            id,
            text: "Hi".into(),
            sender: Sender::Ai,
            is_first_chunk: true,
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "ai_message_chunk",
                "data": {"id": "msg_1", "text": "Hi", "sender": "ai", "is_first_chunk": true}
            })
        );
        assert_eq!(json["type"], n.kind());
    }

    #[test]
    fn error_sender_is_snake_case() {
        let n = Notification::AiMessageEnd {
            id: MessageId::from_raw("msg_2"),
            sender: Sender::AiError,
            full_response: "ERROR: x".into(),
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["data"]["sender"], "ai_error");
    }

    #[test]
    fn artifact_chunk_uses_chunk_data_field() {
        let n = Notification::ArtifactStreamChunk {
            artifact_id: ArtifactId::from_raw("art_1"),
            chunk_data: ArtifactPayload::Line("x = 1\n".into()),
        };
        let json: serde_json::Value = serde_json::from_str(&n.to_json().unwrap()).unwrap();
        assert_eq!(json["data"]["chunk_data"], "x = 1\n");
        assert_eq!(json["data"]["artifact_id"], "art_1");
    }

    #[test]
    fn parse_send_chat_message() {
        let raw = r#"{"type":"send_chat_message","data":{"message":"hello"}}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg, ClientMessage::SendChatMessage { message: "hello".into() });
    }

    #[test]
    fn unknown_client_frame_is_rejected() {
        let raw = r#"{"type":"delete_everything","data":{}}"#;
        assert!(serde_json::from_str::<ClientMessage>(raw).is_err());
    }
}
