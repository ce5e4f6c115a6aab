//! Physical and link layer framing.
//!
//! Samples become bits with [TimingRecovery], bits become synchronized bytes with a
//! [BitDecoder], and bytes become frames with a [LinkCodec] such as [Ax100Mode5].
mod ax100;
mod bits;
mod pn;
mod sync;
mod synchronizer;
pub mod timing;

pub use ax100::*;
pub use bits::*;
pub use pn::*;
pub use sync::*;
pub use synchronizer::*;
pub use timing::{Symbol, TimingRecovery};

use crate::prelude::*;

/// Byte-at-a-time link layer frame decoder, fed the bytes following a sync word.
pub trait LinkCodec: Send {
    /// Returns the frame payload once the last byte of a frame has been fed. Implementations
    /// reset themselves after a completed frame and after an error.
    fn decode_byte(&mut self, byte: u8) -> Result<Option<Vec<u8>>>;

    /// Drop any partial frame, e.g. when a new sync word is detected.
    fn reset(&mut self);
}
