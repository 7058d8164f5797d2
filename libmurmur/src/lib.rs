//! Murmur - anonymous message relay agent for the Fediverse
//!
//! This library implements a bot that listens to a user's streaming feed,
//! detects direct messages requesting anonymous forwarding to a third
//! party, and republishes the content to the intended recipient with the
//! sender identity stripped. It also welcomes new followers and relays
//! abuse reports to moderators with a bookmark audit trail.

pub mod agent;
pub mod api;
pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod executor;
pub mod logging;
pub mod rate_limiter;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use agent::Agent;
pub use config::Config;
pub use error::{MurmurError, Result};
pub use types::{Account, Action, Event, Status};
