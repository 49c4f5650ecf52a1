use thiserror::Error;

/// Decoding errors.
///
/// `NeedMoreData` is not surfaced through this type: suspension is reported via
/// `Decoded::Suspended` so that callers can't accidentally treat "feed me more
/// bytes" as a terminal failure.
#[derive(Debug, Error)]
pub enum Error {
    /// Structural violation of the bitstream (bad magic, varint overrun,
    /// out-of-range transform id, degenerate MANIAC property range, ...).
    #[error("invalid data: {0}")]
    InvalidData(String),
    /// A declared-but-unimplemented feature was encountered.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// A dynamic allocation failed.
    #[error("out of memory")]
    OutOfMemory,
}

/// A specialised `Result` type for decoding operations.
pub type Result<T> = ::std::result::Result<T, Error>;
