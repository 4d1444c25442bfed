//! Framed codec for the control pipe.
//!
//! A frame is a `u16` length in host byte order followed by exactly that many
//! payload bytes. There is no other delimiter. Decoding peeks at the header and
//! only consumes bytes once a whole frame is buffered, so an EOF can always be
//! classified as clean (between frames) or truncated (inside one). Encoding
//! goes through `LengthDelimitedCodec`.

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, FramedRead, LengthDelimitedCodec};

use crate::error::ProtocolError;

/// Size of the length prefix.
pub const HEADER_LEN: usize = size_of::<u16>();

/// Largest payload a frame can carry.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

pub struct FrameCodec {
    inner: LengthDelimitedCodec,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(HEADER_LEN)
                .native_endian()
                .max_frame_length(MAX_PAYLOAD_LEN)
                .new_codec(),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            src.reserve(HEADER_LEN - src.len());
            return Ok(None);
        }

        let len = usize::from(u16::from_ne_bytes([src[0], src[1]]));
        let frame_len = HEADER_LEN + len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        tracing::trace!(payload_len = len, "Decoded frame");
        Ok(Some(payload))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(ProtocolError::Truncated {
                buffered: src.len(),
            }),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::Oversized { len: item.len() });
        }
        tracing::trace!(payload_len = item.len(), "Encoding frame");
        self.inner.encode(item, dst).map_err(ProtocolError::Io)
    }
}

/// Reads whole frames off the inbound half of the control pipe.
pub struct FrameReader<R> {
    inner: FramedRead<R, FrameCodec>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: FramedRead::new(reader, FrameCodec::new()),
        }
    }

    /// Wait for the next complete frame and return its payload.
    ///
    /// Any end of stream is an error: the parent never closes the pipe while
    /// it still expects the worker to be useful.
    pub async fn read_frame(&mut self) -> Result<Bytes, ProtocolError> {
        match self.inner.next().await {
            Some(frame) => frame,
            None => Err(ProtocolError::Closed),
        }
    }
}
