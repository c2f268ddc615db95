//! Newline-delimited JSON codec.
//!
//! Wraps LinesCodec for framing + serde_json for serialization. Works over
//! any AsyncRead/AsyncWrite (child stdio, sockets, in-memory pipes).
//!
//! Lines that do not parse are yielded as [`Frame::Garbage`] rather than
//! failing the stream: the peer's stdout may interleave non-protocol output
//! (e.g. logging) with responses, and the reader must survive it.

use std::io;
use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

/// One decoded line: either a parsed message or the raw text that failed to
/// parse.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame<T> {
    Message(T),
    Garbage(String),
}

/// Codec that frames messages one-per-line and serializes with JSON.
pub struct JsonLineCodec<T> {
    inner: LinesCodec,
    _phantom: PhantomData<T>,
}

impl<T> Default for JsonLineCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JsonLineCodec<T> {
    /// Codec without a line length bound.
    pub fn new() -> Self {
        Self {
            inner: LinesCodec::new(),
            _phantom: PhantomData,
        }
    }

    /// Codec that fails (rather than buffers forever) once a line exceeds
    /// `max_length` bytes.
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_length),
            _phantom: PhantomData,
        }
    }

    fn parse(line: String) -> Frame<T>
    where
        T: DeserializeOwned,
    {
        match serde_json::from_str(&line) {
            Ok(msg) => Frame::Message(msg),
            Err(_) => Frame::Garbage(line),
        }
    }
}

impl<T: DeserializeOwned> Decoder for JsonLineCodec<T> {
    type Item = Frame<T>;
    type Error = LinesCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.inner.decode(src)?.map(Self::parse))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.inner.decode_eof(src)?.map(Self::parse))
    }
}

impl<T: Serialize> Encoder<T> for JsonLineCodec<T> {
    type Error = LinesCodecError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_string(&item)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        tracing::trace!(line_bytes = json.len(), "encoding frame");
        self.inner.encode(json, dst)
    }
}
