//! Engine crate – client-side logic for the CNC maintenance backend.
//!
//! Everything a UI shell needs sits here behind plain Rust types: the HTTP
//! client and resource services, the persisted session with its expiry
//! monitor, the role guard, the PDF import workflow and the command
//! registry the CLI drives. It carries no UI runtime, so the headless CLI
//! and any front end share the same behaviour.

pub mod cache;
pub mod client;
pub mod commands;
pub mod config;
pub mod context;
pub mod dashboard;
pub mod error;
pub mod format;
pub mod guard;
pub mod import;
pub mod model;
pub mod monitor;
pub mod platform;
pub mod probes;
pub mod retry;
pub mod scenario;
pub mod services;
pub mod session;
pub mod token;
pub mod traits;
pub mod types;
pub mod validation;

// Re-exports for convenience
pub use commands::CommandRegistry;
pub use config::EngineConfig;
pub use context::AppContext;
pub use error::{ApiError, ApiResult};
pub use types::{CommandResult, ErrorCode, ErrorInfo, Run, Status};
