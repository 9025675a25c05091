//! An agent that answers in the terminal and reaches out to an MCP tool
//! server whenever the model asks for a tool.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to bring the same loop into your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod session;

pub use config::{AppConfig, ConfigError};
pub use session::{BootstrapError, Session, SessionBuilder};

/// Re-exports of [`toolbridge_core`] crate.
pub mod core {
    pub use toolbridge_core::*;
}
