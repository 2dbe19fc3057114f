//! Turn engine for the Scout chat backend.
//!
//! Each user message becomes a turn: a [`producer::TurnProducer`] pushes
//! stream events onto a per-turn queue while [`dispatcher::dispatch_turn`]
//! drains it into client notifications. The [`coordinator::TurnCoordinator`]
//! ties both to the session registry.

pub mod catalog;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod producer;
pub mod queue;
pub mod registry;

pub use catalog::{ArtifactCatalog, ArtifactRule, LookupEntry, WholeArtifact};
pub use coordinator::{TurnCoordinator, TurnHandle, TurnReport};
pub use dispatcher::{dispatch_turn, DispatchOutcome, DispatchReport};
pub use error::EngineError;
pub use producer::{ProducerConfig, TurnProducer};
pub use queue::{turn_queue, QueueError, TurnSink, TurnStream};
pub use registry::{SessionHandle, SessionRegistry};
