//! Completion providers: an OpenAI-compatible streaming client and a
//! scripted mock for tests.

pub mod mock;
pub mod openai;
pub mod sse;

pub use mock::{MockProvider, MockResponse};
pub use openai::{OpenAiCompatConfig, OpenAiCompatProvider};
