//! CCSDS Reed-Solomon (255,223) over GF(256), conventional basis.
//!
//! Field generator `x^8 + x^7 + x^2 + x + 1`, first consecutive root 112, primitive element
//! index 11, 32 check symbols. Shortened codewords are supported through `pad`, the number of
//! leading zero data symbols that are not transmitted.
//!
//! Ref: CCSDS 131.0-B-5, section 4.
use tracing::debug;

use crate::prelude::*;

/// Symbols per full codeword.
pub const N: usize = 255;
/// Check symbols per codeword.
pub const PARITY_LEN: usize = 32;
/// Data symbols per full codeword.
pub const DATA_LEN: usize = N - PARITY_LEN;
/// Maximum number of correctable symbol errors without erasures.
pub const MAX_CORRECTABLE: usize = PARITY_LEN / 2;

const FCR: usize = 112;
const PRIM: usize = 11;
const IPRIM: usize = 116;
// Index form of zero
const A0: usize = N;

#[rustfmt::skip]
const ALPHA_TO: [u8; 256] = [
    0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80, 0x87, 0x89, 0x95, 0xad,
    0xdd, 0x3d, 0x7a, 0xf4, 0x6f, 0xde, 0x3b, 0x76, 0xec, 0x5f, 0xbe, 0xfb,
    0x71, 0xe2, 0x43, 0x86, 0x8b, 0x91, 0xa5, 0xcd, 0x1d, 0x3a, 0x74, 0xe8,
    0x57, 0xae, 0xdb, 0x31, 0x62, 0xc4, 0x0f, 0x1e, 0x3c, 0x78, 0xf0, 0x67,
    0xce, 0x1b, 0x36, 0x6c, 0xd8, 0x37, 0x6e, 0xdc, 0x3f, 0x7e, 0xfc, 0x7f,
    0xfe, 0x7b, 0xf6, 0x6b, 0xd6, 0x2b, 0x56, 0xac, 0xdf, 0x39, 0x72, 0xe4,
    0x4f, 0x9e, 0xbb, 0xf1, 0x65, 0xca, 0x13, 0x26, 0x4c, 0x98, 0xb7, 0xe9,
    0x55, 0xaa, 0xd3, 0x21, 0x42, 0x84, 0x8f, 0x99, 0xb5, 0xed, 0x5d, 0xba,
    0xf3, 0x61, 0xc2, 0x03, 0x06, 0x0c, 0x18, 0x30, 0x60, 0xc0, 0x07, 0x0e,
    0x1c, 0x38, 0x70, 0xe0, 0x47, 0x8e, 0x9b, 0xb1, 0xe5, 0x4d, 0x9a, 0xb3,
    0xe1, 0x45, 0x8a, 0x93, 0xa1, 0xc5, 0x0d, 0x1a, 0x34, 0x68, 0xd0, 0x27,
    0x4e, 0x9c, 0xbf, 0xf9, 0x75, 0xea, 0x53, 0xa6, 0xcb, 0x11, 0x22, 0x44,
    0x88, 0x97, 0xa9, 0xd5, 0x2d, 0x5a, 0xb4, 0xef, 0x59, 0xb2, 0xe3, 0x41,
    0x82, 0x83, 0x81, 0x85, 0x8d, 0x9d, 0xbd, 0xfd, 0x7d, 0xfa, 0x73, 0xe6,
    0x4b, 0x96, 0xab, 0xd1, 0x25, 0x4a, 0x94, 0xaf, 0xd9, 0x35, 0x6a, 0xd4,
    0x2f, 0x5e, 0xbc, 0xff, 0x79, 0xf2, 0x63, 0xc6, 0x0b, 0x16, 0x2c, 0x58,
    0xb0, 0xe7, 0x49, 0x92, 0xa3, 0xc1, 0x05, 0x0a, 0x14, 0x28, 0x50, 0xa0,
    0xc7, 0x09, 0x12, 0x24, 0x48, 0x90, 0xa7, 0xc9, 0x15, 0x2a, 0x54, 0xa8,
    0xd7, 0x29, 0x52, 0xa4, 0xcf, 0x19, 0x32, 0x64, 0xc8, 0x17, 0x2e, 0x5c,
    0xb8, 0xf7, 0x69, 0xd2, 0x23, 0x46, 0x8c, 0x9f, 0xb9, 0xf5, 0x6d, 0xda,
    0x33, 0x66, 0xcc, 0x1f, 0x3e, 0x7c, 0xf8, 0x77, 0xee, 0x5b, 0xb6, 0xeb,
    0x51, 0xa2, 0xc3, 0x00,
];
#[rustfmt::skip]
const INDEX_OF: [u8; 256] = [
    0xff, 0x00, 0x01, 0x63, 0x02, 0xc6, 0x64, 0x6a, 0x03, 0xcd, 0xc7, 0xbc,
    0x65, 0x7e, 0x6b, 0x2a, 0x04, 0x8d, 0xce, 0x4e, 0xc8, 0xd4, 0xbd, 0xe1,
    0x66, 0xdd, 0x7f, 0x31, 0x6c, 0x20, 0x2b, 0xf3, 0x05, 0x57, 0x8e, 0xe8,
    0xcf, 0xac, 0x4f, 0x83, 0xc9, 0xd9, 0xd5, 0x41, 0xbe, 0x94, 0xe2, 0xb4,
    0x67, 0x27, 0xde, 0xf0, 0x80, 0xb1, 0x32, 0x35, 0x6d, 0x45, 0x21, 0x12,
    0x2c, 0x0d, 0xf4, 0x38, 0x06, 0x9b, 0x58, 0x1a, 0x8f, 0x79, 0xe9, 0x70,
    0xd0, 0xc2, 0xad, 0xa8, 0x50, 0x75, 0x84, 0x48, 0xca, 0xfc, 0xda, 0x8a,
    0xd6, 0x54, 0x42, 0x24, 0xbf, 0x98, 0x95, 0xf9, 0xe3, 0x5e, 0xb5, 0x15,
    0x68, 0x61, 0x28, 0xba, 0xdf, 0x4c, 0xf1, 0x2f, 0x81, 0xe6, 0xb2, 0x3f,
    0x33, 0xee, 0x36, 0x10, 0x6e, 0x18, 0x46, 0xa6, 0x22, 0x88, 0x13, 0xf7,
    0x2d, 0xb8, 0x0e, 0x3d, 0xf5, 0xa4, 0x39, 0x3b, 0x07, 0x9e, 0x9c, 0x9d,
    0x59, 0x9f, 0x1b, 0x08, 0x90, 0x09, 0x7a, 0x1c, 0xea, 0xa0, 0x71, 0x5a,
    0xd1, 0x1d, 0xc3, 0x7b, 0xae, 0x0a, 0xa9, 0x91, 0x51, 0x5b, 0x76, 0x72,
    0x85, 0xa1, 0x49, 0xeb, 0xcb, 0x7c, 0xfd, 0xc4, 0xdb, 0x1e, 0x8b, 0xd2,
    0xd7, 0x92, 0x55, 0xaa, 0x43, 0x0b, 0x25, 0xaf, 0xc0, 0x73, 0x99, 0x77,
    0x96, 0x5c, 0xfa, 0x52, 0xe4, 0xec, 0x5f, 0x4a, 0xb6, 0xa2, 0x16, 0x86,
    0x69, 0xc5, 0x62, 0xfe, 0x29, 0x7d, 0xbb, 0xcc, 0xe0, 0xd3, 0x4d, 0x8c,
    0xf2, 0x1f, 0x30, 0xdc, 0x82, 0xab, 0xe7, 0x56, 0xb3, 0x93, 0x40, 0xd8,
    0x34, 0xb0, 0xef, 0x26, 0x37, 0x0c, 0x11, 0x44, 0x6f, 0x78, 0x19, 0x9a,
    0x47, 0x74, 0xa7, 0xc1, 0x23, 0x53, 0x89, 0xfb, 0x14, 0x5d, 0xf8, 0x97,
    0x2e, 0x4b, 0xb9, 0x60, 0x0f, 0xed, 0x3e, 0xe5, 0xf6, 0x87, 0xa5, 0x17,
    0x3a, 0xa3, 0x3c, 0xb7,
];
#[rustfmt::skip]
const GENPOLY: [u8; 33] = [
    0x00, 0xf9, 0x3b, 0x42, 0x04, 0x2b, 0x7e, 0xfb, 0x61, 0x1e, 0x03, 0xd5,
    0x32, 0x42, 0xaa, 0x05, 0x18, 0x05, 0xaa, 0x42, 0x32, 0xd5, 0x03, 0x1e,
    0x61, 0xfb, 0x7e, 0x2b, 0x04, 0x42, 0x3b, 0xf9, 0x00,
];

fn modnn(x: usize) -> usize {
    x % N
}

fn index_of(x: u8) -> usize {
    INDEX_OF[x as usize] as usize
}

/// Result of decoding a codeword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Corrected data symbols, without check symbols or padding.
    pub data: Vec<u8>,
    /// Corrected symbol positions relative to the start of the transmitted codeword.
    pub positions: Vec<usize>,
    /// Number of symbols located as errata.
    pub num_corrected: usize,
}

fn check_pad(pad: usize) -> Result<()> {
    if pad >= DATA_LEN {
        return Err(Error::InvalidLength(format!(
            "pad {pad} leaves no data symbols (max {})",
            DATA_LEN - 1
        )));
    }
    Ok(())
}

/// Compute the 32 check symbols for `data`, which must be exactly `223 - pad` bytes.
///
/// # Errors
/// [Error::InvalidLength] if `pad` or the data length is invalid.
pub fn encode(data: &[u8], pad: usize) -> Result<[u8; PARITY_LEN]> {
    check_pad(pad)?;
    if data.len() != DATA_LEN - pad {
        return Err(Error::InvalidLength(format!(
            "expected {} data bytes for pad {pad}, got {}",
            DATA_LEN - pad,
            data.len()
        )));
    }

    let mut parity = [0u8; PARITY_LEN];
    for &d in data {
        let feedback = index_of(d ^ parity[0]);
        if feedback != A0 {
            for j in 1..PARITY_LEN {
                parity[j] ^= ALPHA_TO[modnn(feedback + GENPOLY[PARITY_LEN - j] as usize)];
            }
        }
        parity.copy_within(1.., 0);
        parity[PARITY_LEN - 1] = if feedback == A0 {
            0
        } else {
            ALPHA_TO[modnn(feedback + GENPOLY[0] as usize)]
        };
    }
    Ok(parity)
}

/// Compute check symbols for a shortened codeword of up to 223 data bytes.
///
/// # Errors
/// [Error::InvalidLength] if `data` is empty or longer than 223 bytes.
pub fn encode_shortened(data: &[u8]) -> Result<[u8; PARITY_LEN]> {
    if data.is_empty() || data.len() > DATA_LEN {
        return Err(Error::InvalidLength(format!(
            "data length must be 1..={DATA_LEN}, got {}",
            data.len()
        )));
    }
    encode(data, DATA_LEN - data.len())
}

/// Syndromes in polynomial form.
fn syndromes(codeword: &[u8]) -> [u8; PARITY_LEN] {
    let mut s = [codeword[0]; PARITY_LEN];
    for &d in &codeword[1..] {
        for (i, si) in s.iter_mut().enumerate() {
            *si = if *si == 0 {
                d
            } else {
                d ^ ALPHA_TO[modnn(index_of(*si) + (FCR + i) * PRIM)]
            };
        }
    }
    s
}

/// Return true if the transmitted codeword (`255 - pad` bytes) contains errors.
#[must_use]
pub fn has_errors(codeword: &[u8]) -> bool {
    !codeword.is_empty() && syndromes(codeword).iter().any(|s| *s != 0)
}

/// Decode and correct a codeword of `255 - pad` bytes, data first.
///
/// `erasures` are known-bad symbol positions relative to the start of `codeword`. Up to 16
/// errors can be corrected, or more generally any combination where
/// `2 * errors + erasures <= 32`.
///
/// After correction the syndromes are computed again, so a codeword is never reported as
/// corrected unless the result is a valid codeword.
///
/// # Errors
/// [Error::InvalidLength] for bad lengths or erasure positions, and
/// [Error::UncorrectableReedSolomon] if the codeword cannot be corrected.
pub fn decode(codeword: &[u8], pad: usize, erasures: &[usize]) -> Result<Decoded> {
    check_pad(pad)?;
    if codeword.len() != N - pad {
        return Err(Error::InvalidLength(format!(
            "expected {} byte codeword for pad {pad}, got {}",
            N - pad,
            codeword.len()
        )));
    }
    if erasures.len() > PARITY_LEN {
        return Err(Error::UncorrectableReedSolomon(format!(
            "{} erasures exceeds {PARITY_LEN}",
            erasures.len()
        )));
    }
    if let Some(pos) = erasures.iter().find(|p| **p >= codeword.len()) {
        return Err(Error::InvalidLength(format!(
            "erasure position {pos} outside {} byte codeword",
            codeword.len()
        )));
    }

    let mut data = codeword.to_vec();
    let data_len = data.len() - PARITY_LEN;

    let synd = syndromes(&data);
    if synd.iter().all(|s| *s == 0) {
        data.truncate(data_len);
        return Ok(Decoded {
            data,
            positions: Vec::new(),
            num_corrected: 0,
        });
    }
    let s: [usize; PARITY_LEN] = synd.map(index_of);

    // Erasure locator
    let num_eras = erasures.len();
    let mut lambda = [0u8; PARITY_LEN + 1];
    lambda[0] = 1;
    if let Some(first) = erasures.first() {
        lambda[1] = ALPHA_TO[modnn(PRIM * (N - 1 - (first + pad)))];
        for (i, pos) in erasures.iter().enumerate().skip(1) {
            let u = modnn(PRIM * (N - 1 - (pos + pad)));
            for j in (1..=i + 1).rev() {
                let tmp = index_of(lambda[j - 1]);
                if tmp != A0 {
                    lambda[j] ^= ALPHA_TO[modnn(u + tmp)];
                }
            }
        }
    }

    // Berlekamp-Massey
    let mut b: [usize; PARITY_LEN + 1] = lambda.map(index_of);
    let mut el = num_eras;
    for r in (num_eras + 1)..=PARITY_LEN {
        let mut discr = 0u8;
        for i in 0..r {
            if lambda[i] != 0 && s[r - i - 1] != A0 {
                discr ^= ALPHA_TO[modnn(index_of(lambda[i]) + s[r - i - 1])];
            }
        }
        let discr = index_of(discr);

        if discr == A0 {
            b.copy_within(0..PARITY_LEN, 1);
            b[0] = A0;
            continue;
        }

        let mut t = [0u8; PARITY_LEN + 1];
        t[0] = lambda[0];
        for i in 0..PARITY_LEN {
            t[i + 1] = if b[i] == A0 {
                lambda[i + 1]
            } else {
                lambda[i + 1] ^ ALPHA_TO[modnn(discr + b[i])]
            };
        }
        if 2 * el < r + num_eras {
            el = r + num_eras - el;
            for i in 0..=PARITY_LEN {
                b[i] = if lambda[i] == 0 {
                    A0
                } else {
                    modnn(index_of(lambda[i]) + N - discr)
                };
            }
        } else {
            b.copy_within(0..PARITY_LEN, 1);
            b[0] = A0;
        }
        lambda = t;
    }

    let lambda: [usize; PARITY_LEN + 1] = lambda.map(index_of);
    let deg_lambda = (0..=PARITY_LEN).rev().find(|i| lambda[*i] != A0).unwrap_or(0);
    if deg_lambda == 0 {
        return Err(Error::UncorrectableReedSolomon(
            "error locator has no roots".into(),
        ));
    }

    // Chien search
    let mut reg = lambda;
    let mut roots: Vec<usize> = Vec::with_capacity(deg_lambda);
    let mut locs: Vec<usize> = Vec::with_capacity(deg_lambda);
    let mut k = IPRIM - 1;
    for i in 1..=N {
        let mut q = 1u8;
        for j in (1..=deg_lambda).rev() {
            if reg[j] != A0 {
                reg[j] = modnn(reg[j] + j);
                q ^= ALPHA_TO[reg[j]];
            }
        }
        if q == 0 {
            roots.push(i);
            locs.push(k);
            if roots.len() == deg_lambda {
                break;
            }
        }
        k = modnn(k + IPRIM);
    }
    if roots.len() != deg_lambda {
        return Err(Error::UncorrectableReedSolomon(format!(
            "found {} error locations for locator of degree {deg_lambda}",
            roots.len()
        )));
    }

    // Error evaluator
    let deg_omega = deg_lambda - 1;
    let mut omega = [A0; PARITY_LEN + 1];
    for i in 0..=deg_omega {
        let mut tmp = 0u8;
        for j in (0..=i).rev() {
            if s[i - j] != A0 && lambda[j] != A0 {
                tmp ^= ALPHA_TO[modnn(s[i - j] + lambda[j])];
            }
        }
        omega[i] = index_of(tmp);
    }

    // Forney
    for (root, loc) in roots.iter().zip(&locs).rev() {
        let mut num1 = 0u8;
        for i in (0..=deg_omega).rev() {
            if omega[i] != A0 {
                num1 ^= ALPHA_TO[modnn(omega[i] + i * root)];
            }
        }
        let num2 = ALPHA_TO[modnn(root * (FCR - 1) + N)];

        let mut den = 0u8;
        let mut i = deg_lambda.min(PARITY_LEN - 1) & !1;
        loop {
            if lambda[i + 1] != A0 {
                den ^= ALPHA_TO[modnn(lambda[i + 1] + i * root)];
            }
            if i < 2 {
                break;
            }
            i -= 2;
        }
        if den == 0 {
            return Err(Error::UncorrectableReedSolomon(
                "zero denominator in error magnitude".into(),
            ));
        }

        if num1 != 0 && *loc >= pad {
            data[loc - pad] ^= ALPHA_TO[modnn(index_of(num1) + index_of(num2) + N - index_of(den))];
        }
    }

    if has_errors(&data) {
        return Err(Error::UncorrectableReedSolomon(
            "codeword still has errors after correction".into(),
        ));
    }

    let positions: Vec<usize> = locs
        .iter()
        .filter(|loc| **loc >= pad)
        .map(|loc| loc - pad)
        .collect();
    debug!(num_corrected = roots.len(), "corrected codeword");

    data.truncate(data_len);
    Ok(Decoded {
        data,
        positions,
        num_corrected: roots.len(),
    })
}
