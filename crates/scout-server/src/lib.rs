pub mod api;
pub mod client;
pub mod context;
pub mod error;
pub mod server;

pub use context::{build_provider, AppContext};
pub use error::ApiError;
pub use server::{build_router, start, ServerConfig, ServerHandle};
