/// CCSDS pseudo-noise sequence, one 255-byte period.
///
/// Generated by `h(x) = x^8 + x^7 + x^5 + x^3 + 1` with the register initialized to all ones.
/// See CCSDS 131.0-B-5, section 10.
pub const PN_SEQUENCE: [u8; 255] = pn_sequence();

const fn pn_sequence() -> [u8; 255] {
    let mut seq = [0u8; 255];
    let mut state: u8 = 0xff;
    let mut i = 0;
    while i < 255 {
        let mut byte = 0u8;
        let mut k = 0;
        while k < 8 {
            let out = (state >> 7) & 1;
            let feedback = ((state >> 7) ^ (state >> 4) ^ (state >> 2) ^ state) & 1;
            state = (state << 1) | feedback;
            byte = (byte << 1) | out;
            k += 1;
        }
        seq[i] = byte;
        i += 1;
    }
    seq
}

/// XOR `dat` with the PN sequence starting at sequence position `start`, wrapping every 255
/// bytes. Applying it twice with the same `start` restores the input.
pub fn scramble(dat: &mut [u8], start: usize) {
    for (i, b) in dat.iter_mut().enumerate() {
        *b ^= PN_SEQUENCE[(start + i) % PN_SEQUENCE.len()];
    }
}
