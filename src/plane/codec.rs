//! NDJSON framing for watch streams.
//!
//! Wraps [`LinesCodec`] with a maximum line length so a misbehaving server
//! cannot make the watcher buffer an unbounded event.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tracing::debug;

use crate::models::event::WatchEvent;
use crate::{AppError, Result};

/// Maximum accepted length of one watch event line: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Line decoder for watch event streams.
#[derive(Debug)]
pub struct EventCodec(LinesCodec);

impl EventCodec {
    /// Create a codec with the [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for EventCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EventCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

fn map_codec_error(err: LinesCodecError) -> AppError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => AppError::Connection(format!(
            "watch event line exceeds {MAX_LINE_BYTES} bytes"
        )),
        LinesCodecError::Io(err) => AppError::Io(err.to_string()),
    }
}

/// Parse one NDJSON line into a [`WatchEvent`].
///
/// Blank lines (keep-alives) yield `Ok(None)`.
///
/// # Errors
///
/// Returns [`AppError::Connection`] if the line is not a valid event.
pub fn parse_event_line(line: &str) -> Result<Option<WatchEvent>> {
    if line.trim().is_empty() {
        debug!("watch keep-alive");
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|err| AppError::Connection(format!("malformed watch event: {err}")))
}
