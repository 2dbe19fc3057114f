//! Shared types for the Scout chat backend: ids, turn stream events,
//! outbound notifications, provider messages and the completion provider trait.

pub mod artifacts;
pub mod errors;
pub mod events;
pub mod ids;
pub mod messages;
pub mod notifications;
pub mod provider;

pub use errors::GatewayError;
pub use events::StreamEvent;
pub use ids::{ArtifactId, MessageId, SessionId, TurnId};
