//! Range coder: byte source, primitive readers, chance table construction.

pub mod bytesource;
pub mod range;
pub mod tables;

pub use bytesource::ByteSource;
pub use range::RangeCoder;
