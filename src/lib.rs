#![forbid(unsafe_code)]

//! Shared-filesystem task coordination for local and cloud automation
//! agents.
//!
//! Task files move through stage directories of a vault; agents claim work
//! by atomic rename, route it through a closed dispatch table, and replicate
//! the vault between machines over git.

pub mod adapters;
pub mod claim;
pub mod config;
pub mod errors;
pub mod journal;
pub mod mode;
pub mod orchestrator;
pub mod resilience;
pub mod router;
pub mod scheduler;
pub mod signals;
pub mod store;
pub mod sync;
pub mod watchdog;
pub mod watchers;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
pub use mode::AgentMode;
