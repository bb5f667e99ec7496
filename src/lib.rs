pub mod api;
pub mod config;
pub mod dedup;
pub mod error;
pub mod log;
pub mod notify;
pub mod orchestrator;
pub mod status;
pub mod validate;

pub use error::{RelayError, Result};
