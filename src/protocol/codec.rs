//! Line framing
//!
//! Frames are newline-terminated JSON documents. [`FrameCodec`] splits a
//! receive buffer into frames and encodes outgoing ones; [`FrameReader`]
//! drives it over any `AsyncRead`.

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, ProtocolError, Result};

/// Default maximum frame size (64KB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Default maximum response line a client accepts (16MB)
///
/// A poll response holds a whole drained batch, so it can be many times
/// larger than any single request line.
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// Newline-delimited frame codec
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Create a codec rejecting frames longer than `max_frame_size`
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Create a codec without a frame length limit
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// Maximum accepted frame length, excluding the newline
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Split the next complete frame off `buf`
    ///
    /// Returns `Ok(None)` if more data is needed. Blank lines are skipped and
    /// a trailing `\r` is removed.
    pub fn decode(&self, buf: &mut BytesMut) -> std::result::Result<Option<Bytes>, ProtocolError> {
        loop {
            let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
                if buf.len() > self.max_frame_size {
                    return Err(ProtocolError::FrameTooLarge {
                        size: buf.len(),
                        max: self.max_frame_size,
                    });
                }
                return Ok(None);
            };

            let mut line = buf.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }

            if line.len() > self.max_frame_size {
                return Err(ProtocolError::FrameTooLarge {
                    size: line.len(),
                    max: self.max_frame_size,
                });
            }

            if !line.is_empty() {
                return Ok(Some(line.freeze()));
            }
        }
    }

    /// Serialize `item` as one frame onto `buf`
    pub fn encode<T: Serialize>(&self, item: &T, buf: &mut BytesMut) -> Result<()> {
        let json = serde_json::to_vec(item)?;

        if json.len() > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: json.len(),
                max: self.max_frame_size,
            }
            .into());
        }

        buf.reserve(json.len() + 1);
        buf.put_slice(&json);
        buf.put_u8(b'\n');
        Ok(())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

/// Parse a frame as JSON
pub fn decode_json<T: DeserializeOwned>(frame: &[u8]) -> std::result::Result<T, ProtocolError> {
    serde_json::from_slice(frame).map_err(ProtocolError::Malformed)
}

/// Reads frames from an async byte stream
pub struct FrameReader<R> {
    reader: R,
    buf: BytesMut,
    codec: FrameCodec,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap `reader`
    pub fn new(reader: R, codec: FrameCodec) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(4096),
            codec,
        }
    }

    /// Read the next frame
    ///
    /// Returns `Ok(None)` on a clean end of stream. A stream ending in the
    /// middle of a frame is [`Error::ConnectionClosed`].
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buf)? {
                return Ok(Some(frame));
            }

            if self.reader.read_buf(&mut self.buf).await? == 0 {
                if self.buf.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                return Err(Error::ConnectionClosed);
            }
        }
    }
}
