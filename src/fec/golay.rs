//! Golay(24,12,8) systematic block code.
//!
//! A codeword is 12 parity bits followed by 12 data bits, sent as 3 big-endian bytes. Up to 3
//! bit errors are corrected.
use crate::prelude::*;

/// Parity-check matrix rows. Bits 23..12 are the identity part, bits 11..0 are `B`.
const H: [u32; 12] = [
    0x8008ED, 0x4001DB, 0x2003B5, 0x100769, 0x80ED1, 0x40DA3, 0x20B47, 0x1068F, 0x8D1D, 0x4A3B,
    0x2477, 0x1FFE,
];

/// Codeword length in bytes.
pub const CODEWORD_LEN: usize = 3;

const fn b_row(i: usize) -> u32 {
    H[i] & 0xFFF
}

fn weight(x: u32) -> u32 {
    x.count_ones()
}

fn parity(x: u32) -> u32 {
    x.count_ones() & 1
}

/// Multiply each row of `rows` with `x`, row 0 giving the most significant result bit.
fn mul(rows: impl Iterator<Item = u32>, x: u32) -> u32 {
    rows.fold(0, |acc, row| (acc << 1) | parity(row & x))
}

fn syndrome(word: u32) -> u32 {
    mul(H.iter().copied(), word)
}

/// Encode the low 12 bits of `data`; higher bits are ignored.
#[must_use]
pub fn encode(data: u16) -> [u8; CODEWORD_LEN] {
    let data = u32::from(data) & 0xFFF;
    let word = (syndrome(data) << 12) | data;
    let [_, b0, b1, b2] = word.to_be_bytes();
    [b0, b1, b2]
}

/// Error pattern for a received word, following the CCSDS two-stage syndrome decoder.
fn error_pattern(word: u32) -> Option<u32> {
    let s = syndrome(word);
    if weight(s) <= 3 {
        return Some(s << 12);
    }
    for i in 0..12 {
        let x = s ^ b_row(i);
        if weight(x) <= 2 {
            return Some((x << 12) | (1 << (11 - i)));
        }
    }

    let q = mul((0..12).map(b_row), s);
    if weight(q) <= 3 {
        return Some(q);
    }
    for i in 0..12 {
        let x = q ^ b_row(i);
        if weight(x) <= 2 {
            return Some((1 << (23 - i)) | x);
        }
    }
    None
}

/// Decode a 24-bit codeword, returning the data and the number of corrected bits.
///
/// # Errors
/// [Error::UncorrectableGolay] if more than 3 bits are in error.
pub fn decode_word(word: u32) -> Result<(u16, usize)> {
    let word = word & 0xFF_FFFF;
    let err = error_pattern(word).ok_or(Error::UncorrectableGolay)?;
    let data = ((word ^ err) & 0xFFF) as u16;
    Ok((data, weight(err) as usize))
}

/// Decode the first 3 bytes of `codeword`.
///
/// # Errors
/// [Error::InvalidLength] if fewer than 3 bytes are given, or [Error::UncorrectableGolay] if
/// more than 3 bits are in error.
pub fn decode(codeword: &[u8]) -> Result<(u16, usize)> {
    if codeword.len() < CODEWORD_LEN {
        return Err(Error::InvalidLength(format!(
            "Golay codeword needs {CODEWORD_LEN} bytes, got {}",
            codeword.len()
        )));
    }
    let word = u32::from_be_bytes([0, codeword[0], codeword[1], codeword[2]]);
    decode_word(word)
}
