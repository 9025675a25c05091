use std::collections::VecDeque;
use std::fmt::{self, Display};

use bytes::Bytes;
use reqwest::Response;

/// The underlying body failed while streaming.
#[derive(Debug, PartialEq, Eq)]
pub struct Error;

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to read the next chunk")
    }
}

impl std::error::Error for Error {}

/// An adapter for streaming byte chunks.
pub enum Chunks {
    /// Chunks pulled from an HTTP response body.
    Response(Response),
    /// Chunks that are already in memory.
    Buffered(VecDeque<Bytes>),
}

impl Chunks {
    /// Streams the body of `response`.
    #[inline]
    pub fn from_response(response: Response) -> Self {
        Chunks::Response(response)
    }

    /// Replays the given chunks in order. Mostly useful in tests.
    #[inline]
    pub fn from_vec_deque(vec: VecDeque<Bytes>) -> Self {
        Chunks::Buffered(vec)
    }

    /// Returns the next chunk, or `None` when the body is exhausted.
    #[inline]
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Response(response) => match response.chunk().await {
                Ok(chunk) => Ok(chunk),
                Err(err) => {
                    debug!("error reading response body: {err}");
                    Err(Error)
                }
            },
            Chunks::Buffered(vec) => Ok(vec.pop_front()),
        }
    }
}
