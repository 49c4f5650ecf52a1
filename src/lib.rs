pub mod chance;
pub mod colorrange;
pub mod constants;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod header;
pub mod maniac;
pub mod pred;
pub mod rangecoder;
pub mod transform;

pub use decoder::{Decoded, Decoder};
pub use error::{Error, Result};
