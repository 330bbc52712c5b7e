pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod transport;

pub use core::{RunSummary, SyncEngine, SyncOptions};
pub use error::{ApiError, SyncError};
