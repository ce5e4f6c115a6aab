use super::{BitOrder, BitShiftRegister};
use crate::prelude::*;

/// A sync word expanded into bits, with a tolerance for bit errors.
///
/// Matching is always explicit: [SyncPattern::matching_bits] gives the number of agreeing bit
/// positions and [SyncPattern::matches] compares that count against the threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPattern {
    bytes: Vec<u8>,
    bits: Vec<bool>,
    order: BitOrder,
    max_errors: usize,
}

impl SyncPattern {
    /// Create an exact-match pattern from `bytes`, each byte expanded in `order`.
    ///
    /// # Errors
    /// [Error::InvalidParameter] if `bytes` is empty.
    pub fn new(bytes: &[u8], order: BitOrder) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::InvalidParameter("sync word must not be empty".into()));
        }
        let bits = bytes.iter().flat_map(|b| order.bits(*b)).collect();
        Ok(SyncPattern {
            bytes: bytes.to_vec(),
            bits,
            order,
            max_errors: 0,
        })
    }

    /// Allow up to `max_errors` differing bits.
    ///
    /// # Errors
    /// [Error::InvalidParameter] if `max_errors` is more than half the pattern length.
    pub fn with_max_errors(mut self, max_errors: usize) -> Result<Self> {
        if max_errors > self.bits.len() / 2 {
            return Err(Error::InvalidParameter(format!(
                "sync error threshold {max_errors} exceeds half of {} bits",
                self.bits.len()
            )));
        }
        self.max_errors = max_errors;
        Ok(self)
    }

    /// Pattern length in bits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    #[must_use]
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn order(&self) -> BitOrder {
        self.order
    }

    #[must_use]
    pub fn max_errors(&self) -> usize {
        self.max_errors
    }

    /// Number of positions where `window` agrees with the pattern. Only the first
    /// `self.len()` bits of `window` are compared.
    pub fn matching_bits<I>(&self, window: I) -> usize
    where
        I: IntoIterator<Item = bool>,
    {
        self.bits
            .iter()
            .zip(window)
            .filter(|(a, b)| **a == *b)
            .count()
    }

    /// True if the most recent bits of `reg` equal the pattern exactly.
    #[must_use]
    pub fn is_exact_match(&self, reg: &BitShiftRegister) -> bool {
        reg.len() >= self.len() && self.matching_bits(reg.window(self.len())) == self.len()
    }

    /// True if the most recent bits of `reg` differ from the pattern in at most
    /// `max_errors` positions.
    #[must_use]
    pub fn matches(&self, reg: &BitShiftRegister) -> bool {
        reg.len() >= self.len()
            && self.matching_bits(reg.window(self.len())) >= self.len() - self.max_errors
    }
}
