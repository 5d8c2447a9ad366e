//! Incremental decoder for the elements of a streamed JSON array.
//!
//! [`JsonArrayCodec`] implements [`Decoder`] over a byte buffer holding an
//! unterminated JSON array. Array framing between elements (`[`, `]`, `,`
//! and whitespace) is skipped; each call yields the next complete element or
//! asks for more input when the element is still incomplete.
//!
//! Incoming bytes are scanned once. The codec tracks nesting depth and string
//! state across calls and only hands a value to `serde_json` after its
//! closing byte has arrived.

use bytes::{Buf, BytesMut};
use serde_json::Value;
use tokio_util::codec::Decoder;

use crate::error::FramingError;

/// Default limit on the size of an incomplete value (8 MiB).
pub const DEFAULT_MAX_BUFFERED: usize = 8 * 1024 * 1024;

/// Decoder yielding the elements of a streamed JSON array.
///
/// Elements are expected to be objects, as they are in query responses.
/// Scalars are accepted but only yielded once a delimiter or the end of
/// input shows they are complete.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use querywire::frame::JsonArrayCodec;
/// use tokio_util::codec::Decoder;
///
/// let mut codec = JsonArrayCodec::default();
/// let mut buf = BytesMut::from(&b"[{\"row\":{\"columns\":[1]}},\n{\"row\""[..]);
///
/// let first = codec.decode(&mut buf).unwrap().expect("first element");
/// assert_eq!(first["row"]["columns"][0], 1);
/// assert!(codec.decode(&mut buf).unwrap().is_none());
/// ```
#[derive(Clone, Debug)]
pub struct JsonArrayCodec {
    max_buffered: usize,
    scan: Scan,
}

impl JsonArrayCodec {
    /// Create a codec that rejects incomplete values larger than
    /// `max_buffered` bytes.
    #[must_use]
    pub fn new(max_buffered: usize) -> Self {
        Self {
            max_buffered,
            scan: Scan::default(),
        }
    }

    /// Returns the buffer limit.
    #[must_use]
    pub fn max_buffered(&self) -> usize { self.max_buffered }
}

impl Default for JsonArrayCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_BUFFERED) }
}

/// Progress through the value at the front of the buffer.
#[derive(Clone, Debug, Default)]
struct Scan {
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Scan {
    /// Resume scanning `src`, returning the length of the leading value once
    /// its end is known.
    fn advance(&mut self, src: &[u8]) -> Option<usize> {
        while let Some(&byte) = src.get(self.scanned) {
            let at = self.scanned;
            self.scanned += 1;

            if self.in_string {
                match byte {
                    _ if self.escaped => self.escaped = false,
                    b'\\' => self.escaped = true,
                    b'"' => {
                        self.in_string = false;
                        if self.depth == 0 {
                            return Some(self.scanned);
                        }
                    }
                    _ => {}
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' if self.depth > 0 => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        return Some(self.scanned);
                    }
                }
                // A scalar ends at the next delimiter, which stays buffered.
                b',' | b']' if self.depth == 0 => return Some(at),
                _ if byte.is_ascii_whitespace() && self.depth == 0 => return Some(at),
                // A stray closing brace is left for the parser to reject.
                b'}' if self.depth == 0 => return Some(self.scanned),
                _ => {}
            }
        }
        None
    }
}

fn skip_framing(src: &mut BytesMut) {
    let framing = src
        .iter()
        .take_while(|byte| matches!(byte, b'[' | b']' | b',') || byte.is_ascii_whitespace())
        .count();
    src.advance(framing);
}

fn malformed(src: &[u8], source: serde_json::Error) -> FramingError {
    FramingError::Malformed {
        text: String::from_utf8_lossy(src).into_owned(),
        source,
    }
}

impl Decoder for JsonArrayCodec {
    type Item = Value;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.scan.scanned == 0 {
            skip_framing(src);
        }
        if src.is_empty() {
            return Ok(None);
        }

        let Some(end) = self.scan.advance(src) else {
            if src.len() > self.max_buffered {
                return Err(FramingError::Oversized {
                    max: self.max_buffered,
                });
            }
            return Ok(None);
        };

        self.scan = Scan::default();
        let value = serde_json::from_slice::<Value>(&src[..end])
            .map_err(|error| malformed(&src[..end], error))?;
        src.advance(end);
        Ok(Some(value))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(value) = self.decode(src)? {
            return Ok(Some(value));
        }
        if src.is_empty() {
            return Ok(None);
        }

        self.scan = Scan::default();
        match serde_json::from_slice::<Value>(src) {
            Ok(value) => {
                src.clear();
                Ok(Some(value))
            }
            Err(error) if error.is_eof() => Err(FramingError::Truncated {
                buffered: src.len(),
            }),
            Err(error) => Err(malformed(src, error)),
        }
    }
}
