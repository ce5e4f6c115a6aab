use tracing::{debug, trace};

use super::{BitOrder, BitShiftRegister, ByteAssembler, SyncPattern};
use crate::prelude::*;

/// Result of pushing one bit into a [BitDecoder].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitEvent {
    /// The sync pattern matched; frame acquisition (re)started.
    Sync,
    /// A frame byte was completed.
    Byte(u8),
}

/// Finds frames in a bit stream by sync pattern and assembles the bits that follow into bytes.
///
/// Every bit is shifted into a sync register. After a match the decoder emits one byte per 8
/// bits until either the caller calls [BitDecoder::reset] after consuming a frame, or the
/// `max_bytes`th byte is completed, in which case that byte is discarded, the decoder resets
/// itself and reports [Error::FrameOverrun].
///
/// A sync match while bytes are already being assembled restarts acquisition at the new match.
/// A byte completed on the same bit as a sync match is made of sync bits and is dropped.
#[derive(Debug, Clone)]
pub struct BitDecoder {
    pattern: SyncPattern,
    register: BitShiftRegister,
    assembler: ByteAssembler,
    max_bytes: usize,
    synchronized: bool,
    num_bytes: usize,
}

impl BitDecoder {
    /// Default anti-runaway limit on bytes per frame.
    pub const DEFAULT_MAX_BYTES: usize = 300;

    /// Create a decoder for `pattern`. The sync register uses the pattern's bit order and
    /// bytes are assembled most-significant bit first.
    #[must_use]
    pub fn new(pattern: SyncPattern) -> Self {
        let register = BitShiftRegister::new(pattern.len(), pattern.order());
        BitDecoder {
            pattern,
            register,
            assembler: ByteAssembler::new(BitOrder::Msb),
            max_bytes: Self::DEFAULT_MAX_BYTES,
            synchronized: false,
            num_bytes: 0,
        }
    }

    /// Bit order used to assemble frame bytes.
    #[must_use]
    pub fn with_byte_order(mut self, order: BitOrder) -> Self {
        self.assembler = ByteAssembler::new(order);
        self
    }

    /// Byte count after a sync match at which the frame is abandoned. At most
    /// `max_bytes - 1` bytes are emitted per sync match.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    #[must_use]
    pub fn pattern(&self) -> &SyncPattern {
        &self.pattern
    }

    /// True between a sync match and the next reset.
    #[must_use]
    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    /// Push a single bit.
    ///
    /// # Errors
    /// [Error::FrameOverrun] if the byte limit was exceeded; the decoder has been reset.
    pub fn push(&mut self, bit: bool) -> Result<Option<BitEvent>> {
        self.register.push(bit);

        let mut event = None;
        if self.synchronized {
            if let Some(byte) = self.assembler.push(bit) {
                if self.num_bytes + 1 >= self.max_bytes {
                    debug!(limit = self.max_bytes, "frame overrun; resetting");
                    self.reset();
                    return Err(Error::FrameOverrun {
                        limit: self.max_bytes,
                    });
                }
                self.num_bytes += 1;
                event = Some(BitEvent::Byte(byte));
            }
        }

        if self.pattern.matches(&self.register) {
            if self.synchronized {
                trace!(bytes = self.num_bytes, "sync matched mid-frame; restarting");
            } else {
                debug!("sync matched");
            }
            self.synchronized = true;
            self.num_bytes = 0;
            self.assembler.reset();
            return Ok(Some(BitEvent::Sync));
        }

        Ok(event)
    }

    /// Push every bit of `byte`, most-significant first, collecting the events produced.
    pub fn push_byte(&mut self, byte: u8) -> Vec<Result<BitEvent>> {
        BitOrder::Msb
            .bits(byte)
            .into_iter()
            .filter_map(|bit| self.push(bit).transpose())
            .collect()
    }

    /// Drop the current frame and go back to searching for sync. The sync register is kept so
    /// a match spanning the reset is still found.
    pub fn reset(&mut self) {
        self.synchronized = false;
        self.num_bytes = 0;
        self.assembler.reset();
    }
}
