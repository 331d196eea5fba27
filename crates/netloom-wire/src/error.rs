use thiserror::Error;

/// Errors produced by the wire-level codec: header packing/unpacking, the byte-buffer
/// cursor primitives, and message assembly. Every other layer's error type wraps these
/// rather than re-deriving its own framing variants.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum WireError {
    #[error("buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    #[error("message type {0} exceeds the maximum of {max}", max = crate::header::MAX_SIGNATURE)]
    InvalidMsgType(u16),

    #[error("payload size {0} exceeds the maximum of {max}", max = crate::header::MAX_PAYLOAD)]
    MaxMsgSize(usize),

    #[error("read past the end of the buffer")]
    OutOfBounds,
}

pub type WireResult<T> = Result<T, WireError>;
