//! Server-sent events over a stream of byte chunks.
//!
//! Both the model provider and the tool server client receive their
//! responses as `text/event-stream` bodies, and they share this reader.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod chunks;
mod sse;

pub use chunks::{Chunks, Error as ChunksError};
pub use sse::{Error as SseError, Event, Sse};
