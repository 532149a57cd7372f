//! Length-delimited JSON framing.
//!
//! ```text
//! +----------------------------+------------------+
//! | Length (4 bytes, BE)       | JSON body        |
//! +----------------------------+------------------+
//! ```
//!
//! The length prefix marks where a message ends, so a truncated body is
//! detected instead of being parsed as a shorter value.

use std::io;
use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec, LengthDelimitedCodecError};

/// Maximum frame body size (1 MB)
pub const MAX_FRAME_SIZE: usize = 1_048_576;

/// Errors that can occur while framing messages.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Frame too large (max: {max} bytes)")]
    FrameTooLarge { max: usize },

    #[error("Incomplete frame")]
    Incomplete,

    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    fn from_frame_error(e: io::Error) -> Self {
        let too_large = e
            .get_ref()
            .is_some_and(|inner| inner.is::<LengthDelimitedCodecError>());
        if too_large {
            CodecError::FrameTooLarge {
                max: MAX_FRAME_SIZE,
            }
        } else {
            CodecError::Io(e)
        }
    }
}

/// Codec decoding frames into `D` and encoding any serializable value.
///
/// A server uses `JsonCodec<Request>`, a client `JsonCodec<Response>` (or
/// `JsonCodec<serde_json::Value>` to inspect the shape itself).
#[derive(Debug)]
pub struct JsonCodec<D> {
    frames: LengthDelimitedCodec,
    _decodes: PhantomData<fn() -> D>,
}

impl<D> JsonCodec<D> {
    /// Creates a codec with the default frame size limit.
    pub fn new() -> Self {
        Self {
            frames: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_FRAME_SIZE)
                .new_codec(),
            _decodes: PhantomData,
        }
    }
}

impl<D> Default for JsonCodec<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Clone for JsonCodec<D> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<D: DeserializeOwned> Decoder for JsonCodec<D> {
    type Item = D;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.frames.decode(src) {
            Ok(Some(frame)) => Ok(Some(serde_json::from_slice(&frame)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(CodecError::from_frame_error(e)),
        }
    }
}

impl<D, E: Serialize> Encoder<E> for JsonCodec<D> {
    type Error = CodecError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&item)?;
        if body.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                max: MAX_FRAME_SIZE,
            });
        }
        self.frames
            .encode(Bytes::from(body), dst)
            .map_err(CodecError::from_frame_error)
    }
}

/// Encodes one value as a complete frame.
pub fn encode_frame<T: Serialize>(item: &T) -> Result<BytesMut, CodecError> {
    let mut buf = BytesMut::new();
    JsonCodec::<()>::new().encode(item, &mut buf)?;
    Ok(buf)
}

/// Decodes exactly one complete frame.
///
/// Fails with `Incomplete` on an empty buffer and with `Io` when the
/// buffer ends inside a frame.
pub fn decode_frame<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let mut buf = BytesMut::from(bytes);
    JsonCodec::<T>::new()
        .decode_eof(&mut buf)?
        .ok_or(CodecError::Incomplete)
}
