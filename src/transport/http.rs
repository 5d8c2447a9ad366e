//! Chunked HTTP response bodies as fragment sources.

use bytes::Bytes;
use futures::{Stream, StreamExt, stream};

use crate::{error::QueryError, stream::FragmentSource};

/// Incremental UTF-8 decoding across chunk boundaries.
///
/// A multi-byte character split between two chunks is held back until the
/// next chunk completes it.
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn decode(&mut self, chunk: &[u8]) -> Result<String, QueryError> {
        self.pending.extend_from_slice(chunk);
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let text = text.to_owned();
                self.pending.clear();
                Ok(text)
            }
            Err(error) if error.error_len().is_none() => {
                let valid = error.valid_up_to();
                let text = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
                self.pending.drain(..valid);
                Ok(text)
            }
            Err(error) => Err(QueryError::Utf8(error)),
        }
    }

    fn finish(&self) -> Option<QueryError> {
        if self.pending.is_empty() {
            return None;
        }
        std::str::from_utf8(&self.pending)
            .err()
            .map(QueryError::Utf8)
    }
}

/// Adapt a chunked body into a fragment source, one fragment per chunk.
///
/// Accepts any byte-chunk stream, typically
/// [`reqwest::Response::bytes_stream`]. The source ends after the first
/// error.
pub fn chunk_fragments<S, E>(body: S) -> FragmentSource
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
    QueryError: From<E>,
{
    let state = (Box::pin(body), Utf8Carry::default(), false);
    stream::unfold(state, |(mut body, mut carry, failed)| async move {
        if failed {
            return None;
        }
        match body.next().await {
            Some(Ok(chunk)) => {
                let fragment = carry.decode(&chunk);
                let failed = fragment.is_err();
                Some((fragment, (body, carry, failed)))
            }
            Some(Err(error)) => Some((Err(QueryError::from(error)), (body, carry, true))),
            None => carry
                .finish()
                .map(|error| (Err(error), (body, carry, true))),
        }
    })
    .boxed()
}
