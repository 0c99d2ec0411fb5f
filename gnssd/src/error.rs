use std::io;

/// Errors surfaced by the decoding core.
///
/// Framing problems never show up here: the lexer swallows them and counts
/// the rejected bytes. What remains are short reads from the [`BitReader`],
/// I/O on the byte source and control operations a driver does not offer.
///
/// [`BitReader`]: crate::bits::BitReader
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A read of `width` bytes at `offset` ran past the end of a
    /// `len`-byte buffer.
    #[error("short buffer: {width} bytes at offset {offset} exceeds length {len}")]
    ShortBuffer {
        offset: usize,
        width: usize,
        len: usize,
    },

    /// A fixed-layout message arrived with the wrong size.
    #[error("bad length: expected {expected} bytes, got {len}")]
    BadLength { expected: usize, len: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The byte source is exhausted and nothing is left to frame.
    #[error("end of input")]
    Eof,

    /// The selected driver has no hook for the requested control operation.
    #[error("operation not supported by driver: {0}")]
    NotSupported(&'static str),

    #[error("device error: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, Error>;
