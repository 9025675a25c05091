use std::fmt::{self, Display};

use crate::chunks::{Chunks, Error as ChunksError};

/// Errors from [`Sse::next_event`].
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Reading the underlying chunks failed.
    ChunksError(ChunksError),
    /// An event block was not valid UTF-8.
    InvalidPayload,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ChunksError(err) => write!(f, "{err}"),
            Error::InvalidPayload => write!(f, "invalid event payload"),
        }
    }
}

impl std::error::Error for Error {}

/// A dispatched server-sent event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Event {
    /// The `event` field, if the server named the event type.
    pub event: Option<String>,
    /// All `data` fields of the event, joined by line feeds.
    pub data: String,
    /// The `id` field, if any.
    pub id: Option<String>,
}

impl Event {
    /// Returns the event type, which defaults to `message`.
    #[inline]
    pub fn event_type(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// A type for reading server-sent events from a chunk stream.
pub struct Sse {
    buf: Vec<u8>,
    chunks: Chunks,
}

impl Sse {
    /// Creates a reader over `chunks`.
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: Vec::new(),
            chunks,
        }
    }

    /// Reads the next event.
    ///
    /// Returns `Ok(None)` once the stream ends. An incomplete event at the
    /// end of the stream is discarded.
    pub async fn next_event(&mut self) -> Result<Option<Event>, Error> {
        loop {
            // Drain whatever is already buffered before reading more, so a
            // chunk carrying several events doesn't stall on the network.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                return Ok(None);
            };
            self.buf.extend_from_slice(&bytes);
        }
    }

    fn try_parse_event(&mut self) -> Result<Option<Event>, Error> {
        // event         = *( comment / field ) end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        // end-of-line   = ( cr lf / lf )
        while let Some((block_len, consumed)) = find_blank_line(&self.buf) {
            let block: Vec<u8> =
                self.buf.drain(..consumed).take(block_len).collect();
            let Ok(block) = String::from_utf8(block) else {
                return Err(Error::InvalidPayload);
            };
            if let Some(event) = parse_block(&block) {
                return Ok(Some(event));
            }
            trace!("skipped an event block without data");
        }
        Ok(None)
    }
}

/// Finds the first blank line, returning the length of the block before it
/// and the number of bytes to consume including the blank line.
fn find_blank_line(buf: &[u8]) -> Option<(usize, usize)> {
    let mut line_start = 0;
    for (idx, byte) in buf.iter().enumerate() {
        if *byte != b'\n' {
            continue;
        }
        let line = &buf[line_start..idx];
        if line.is_empty() || line == b"\r" {
            return Some((line_start, idx + 1));
        }
        line_start = idx + 1;
    }
    None
}

fn parse_block(block: &str) -> Option<Event> {
    let mut event = Event::default();
    let mut has_data = false;

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => {
                (field, value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        match field {
            "event" => event.event = Some(value.to_owned()),
            "data" => {
                if has_data {
                    event.data.push('\n');
                }
                event.data.push_str(value);
                has_data = true;
            }
            "id" => event.id = Some(value.to_owned()),
            // `retry` and unknown fields are ignored.
            _ => {}
        }
    }

    has_data.then_some(event)
}
