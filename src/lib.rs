pub mod auth;
pub mod breaker;
pub mod chaining;
pub mod config;
pub mod engine;
pub mod http;
pub mod models;
pub mod offsets;
pub mod runtime;
pub mod template;

// Convenient re-exports for tests and external callers
pub use auth::*;
pub use breaker::*;
pub use chaining::*;
pub use config::*;
pub use engine::*;
pub use models::*;
pub use offsets::*;
pub use runtime::*;
