use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Order in which the bits of a byte appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitOrder {
    /// Most-significant bit first.
    #[default]
    Msb,
    /// Least-significant bit first.
    Lsb,
}

impl BitOrder {
    /// Expand `byte` into its 8 bits in this order.
    #[must_use]
    pub fn bits(self, byte: u8) -> [bool; 8] {
        let mut bits = [false; 8];
        for (i, bit) in bits.iter_mut().enumerate() {
            *bit = match self {
                BitOrder::Msb => (byte >> (7 - i)) & 1 == 1,
                BitOrder::Lsb => (byte >> i) & 1 == 1,
            };
        }
        bits
    }
}

/// Fixed-capacity shift register of bits.
///
/// With [BitOrder::Msb] new bits are appended at the tail and the oldest bit is evicted from
/// the head. With [BitOrder::Lsb] new bits are inserted at the head and evicted from the tail.
/// The register never holds more than its capacity.
#[derive(Debug, Clone)]
pub struct BitShiftRegister {
    bits: VecDeque<bool>,
    capacity: usize,
    order: BitOrder,
}

impl BitShiftRegister {
    #[must_use]
    pub fn new(capacity: usize, order: BitOrder) -> Self {
        BitShiftRegister {
            bits: VecDeque::with_capacity(capacity),
            capacity,
            order,
        }
    }

    pub fn push(&mut self, bit: bool) {
        if self.capacity == 0 {
            return;
        }
        match self.order {
            BitOrder::Msb => {
                if self.bits.len() == self.capacity {
                    self.bits.pop_front();
                }
                self.bits.push_back(bit);
            }
            BitOrder::Lsb => {
                if self.bits.len() == self.capacity {
                    self.bits.pop_back();
                }
                self.bits.push_front(bit);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.bits.len() == self.capacity
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn order(&self) -> BitOrder {
        self.order
    }

    pub fn clear(&mut self) {
        self.bits.clear();
    }

    /// All bits in storage order, head first.
    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits.iter().copied()
    }

    /// The `n` most recently pushed bits, in storage order.
    ///
    /// Returns fewer than `n` bits if the register does not hold that many yet.
    pub fn window(&self, n: usize) -> impl Iterator<Item = bool> + '_ {
        let n = n.min(self.bits.len());
        let skip = match self.order {
            BitOrder::Msb => self.bits.len() - n,
            BitOrder::Lsb => 0,
        };
        self.bits.iter().copied().skip(skip).take(n)
    }

    /// Register contents as an integer, head bit most significant, or `None` if more than
    /// 64 bits are held.
    #[must_use]
    pub fn to_value(&self) -> Option<u64> {
        if self.bits.len() > 64 {
            return None;
        }
        Some(
            self.bits
                .iter()
                .fold(0u64, |acc, &bit| (acc << 1) | u64::from(bit)),
        )
    }
}

/// Collects bits into bytes.
///
/// With [BitOrder::Msb] the first bit received becomes the most significant bit of the byte.
#[derive(Debug, Clone, Default)]
pub struct ByteAssembler {
    value: u8,
    count: u8,
    order: BitOrder,
}

impl ByteAssembler {
    #[must_use]
    pub fn new(order: BitOrder) -> Self {
        ByteAssembler {
            value: 0,
            count: 0,
            order,
        }
    }

    /// Add a bit, returning the completed byte once 8 bits have been collected. The assembler
    /// is empty again after a byte is returned.
    pub fn push(&mut self, bit: bool) -> Option<u8> {
        let bit = u8::from(bit);
        match self.order {
            BitOrder::Msb => self.value = (self.value << 1) | bit,
            BitOrder::Lsb => self.value |= bit << self.count,
        }
        self.count += 1;

        if self.count == 8 {
            let byte = self.value;
            self.reset();
            return Some(byte);
        }
        None
    }

    /// Number of bits collected toward the current byte.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn reset(&mut self) {
        self.value = 0;
        self.count = 0;
    }
}
