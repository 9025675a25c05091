//! A provider-neutral protocol between the agent and language models.
//!
//! The agent never talks to a concrete model API directly. Instead, every
//! provider implements [`ModelProvider`] and streams its answer back as a
//! sequence of [`ModelResponseEvent`]s, which the agent folds into a single
//! turn.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
