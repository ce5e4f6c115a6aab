use std::mem;

use tracing::{debug, warn};

use super::{pn, LinkCodec};
use crate::fec::{golay, reed_solomon};
use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Collecting the 3 Golay-protected length bytes.
    Length,
    /// Collecting `data_len + 32` scrambled bytes.
    Payload { data_len: usize },
}

/// GomSpace AX100 "mode 5" framing.
///
/// On the wire a frame is:
/// ```text
/// preamble | sync word (4) | Golay(24,12) length (3) | scrambled data + RS(255,223) parity
/// ```
/// The length field holds the number of data bytes plus 32 parity bytes. Data and parity
/// are XORed with the CCSDS PN sequence from its first byte.
///
/// Decoding is a byte-at-a-time state machine starting at the first byte after the sync word.
/// Sync detection is external; call [Ax100Mode5::reset] whenever a new sync word is seen.
#[derive(Debug, Clone)]
pub struct Ax100Mode5 {
    preamble: Vec<u8>,
    sync_word: Vec<u8>,
    tolerant_length: bool,
    state: State,
    length: Vec<u8>,
    block: Vec<u8>,
}

impl Default for Ax100Mode5 {
    fn default() -> Self {
        Self::new()
    }
}

impl Ax100Mode5 {
    pub const DEFAULT_PREAMBLE: [u8; 8] = [0xAA; 8];
    pub const DEFAULT_SYNC_WORD: [u8; 4] = [0x93, 0x0B, 0x51, 0xDE];
    /// Maximum number of data bytes per frame.
    pub const MAX_DATA_LEN: usize = reed_solomon::DATA_LEN;
    /// Length of the Golay length field.
    pub const LENGTH_FIELD_LEN: usize = golay::CODEWORD_LEN;

    #[must_use]
    pub fn new() -> Self {
        Ax100Mode5 {
            preamble: Self::DEFAULT_PREAMBLE.to_vec(),
            sync_word: Self::DEFAULT_SYNC_WORD.to_vec(),
            tolerant_length: false,
            state: State::Length,
            length: Vec::with_capacity(Self::LENGTH_FIELD_LEN),
            block: Vec::with_capacity(reed_solomon::N),
        }
    }

    #[must_use]
    pub fn with_preamble(mut self, preamble: &[u8]) -> Self {
        self.preamble = preamble.to_vec();
        self
    }

    #[must_use]
    pub fn with_sync_word(mut self, sync_word: &[u8]) -> Self {
        self.sync_word = sync_word.to_vec();
        self
    }

    /// When enabled, an uncorrectable length field is not fatal. The raw third byte is used as
    /// the length instead, accepting a higher risk of misframing in exchange for not
    /// dropping frames whose only damage is in the length field. Off by default.
    #[must_use]
    pub fn with_tolerant_length(mut self, enabled: bool) -> Self {
        self.tolerant_length = enabled;
        self
    }

    #[must_use]
    pub fn preamble(&self) -> &[u8] {
        &self.preamble
    }

    #[must_use]
    pub fn sync_word(&self) -> &[u8] {
        &self.sync_word
    }

    #[must_use]
    pub fn tolerant_length(&self) -> bool {
        self.tolerant_length
    }

    /// Encode `data` into a complete frame, including preamble and sync word.
    ///
    /// # Errors
    /// [Error::InvalidLength] if `data` is empty or longer than [Self::MAX_DATA_LEN].
    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() || data.len() > Self::MAX_DATA_LEN {
            return Err(Error::InvalidLength(format!(
                "AX100 data length must be 1..={}, got {}",
                Self::MAX_DATA_LEN,
                data.len()
            )));
        }
        let parity = reed_solomon::encode_shortened(data)?;
        let total = data.len() + reed_solomon::PARITY_LEN;

        let mut frame = Vec::with_capacity(
            self.preamble.len() + self.sync_word.len() + Self::LENGTH_FIELD_LEN + total,
        );
        frame.extend_from_slice(&self.preamble);
        frame.extend_from_slice(&self.sync_word);
        // total is at most 255
        frame.extend_from_slice(&golay::encode(total as u16));
        let start = frame.len();
        frame.extend_from_slice(data);
        frame.extend_from_slice(&parity);
        pn::scramble(&mut frame[start..], 0);

        Ok(frame)
    }

    /// Decode a complete frame given as the bytes following the sync word. Trailing bytes
    /// after the frame are ignored.
    ///
    /// This runs the same state machine as [Ax100Mode5::decode_byte] on a fresh decoder, so
    /// any stream in progress on `self` is not disturbed.
    ///
    /// # Errors
    /// Any error from the length field or Reed-Solomon decoding, or
    /// [Error::InvalidLength] if `frame` ends before the declared length.
    pub fn decode(&self, frame: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = Self::new().with_tolerant_length(self.tolerant_length);
        for byte in frame {
            if let Some(data) = decoder.decode_byte(*byte)? {
                return Ok(data);
            }
        }
        Err(Error::InvalidLength(format!(
            "AX100 frame truncated after {} bytes",
            frame.len()
        )))
    }

    fn decode_length(&self) -> Result<usize> {
        match golay::decode(&self.length) {
            Ok((value, corrected)) => {
                if corrected > 0 {
                    debug!(corrected, "corrected AX100 length field");
                }
                Ok(usize::from(value & 0xFF))
            }
            Err(Error::UncorrectableGolay) if self.tolerant_length => {
                let raw = self.length[Self::LENGTH_FIELD_LEN - 1];
                warn!(length = raw, "uncorrectable AX100 length field; using raw value");
                Ok(usize::from(raw))
            }
            Err(err) => Err(err),
        }
    }

    /// Feed the next byte after the sync word.
    ///
    /// Returns the corrected data once the last byte of the frame has been received. The
    /// decoder is reset after a frame completes and after any error.
    ///
    /// # Errors
    /// [Error::UncorrectableGolay] for a damaged length field (unless tolerant),
    /// [Error::InvalidLength] for a length outside 33..=255, and
    /// [Error::UncorrectableReedSolomon] if the payload cannot be corrected.
    pub fn decode_byte(&mut self, byte: u8) -> Result<Option<Vec<u8>>> {
        match self.state {
            State::Length => {
                self.length.push(byte);
                if self.length.len() < Self::LENGTH_FIELD_LEN {
                    return Ok(None);
                }
                let total = match self.decode_length() {
                    Ok(total) => total,
                    Err(err) => {
                        self.reset();
                        return Err(err);
                    }
                };
                if total <= reed_solomon::PARITY_LEN {
                    self.reset();
                    return Err(Error::InvalidLength(format!(
                        "AX100 length field {total} leaves no data"
                    )));
                }
                self.length.clear();
                self.state = State::Payload {
                    data_len: total - reed_solomon::PARITY_LEN,
                };
                Ok(None)
            }
            State::Payload { data_len } => {
                let pos = self.block.len();
                self.block
                    .push(byte ^ pn::PN_SEQUENCE[pos % pn::PN_SEQUENCE.len()]);
                if self.block.len() < data_len + reed_solomon::PARITY_LEN {
                    return Ok(None);
                }

                let block = mem::take(&mut self.block);
                self.reset();
                let pad = reed_solomon::DATA_LEN - data_len;
                let decoded = reed_solomon::decode(&block, pad, &[])?;
                debug!(
                    len = data_len,
                    corrected = decoded.num_corrected,
                    "decoded AX100 frame"
                );
                Ok(Some(decoded.data))
            }
        }
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.state = State::Length;
        self.length.clear();
        self.block.clear();
    }
}

impl LinkCodec for Ax100Mode5 {
    fn decode_byte(&mut self, byte: u8) -> Result<Option<Vec<u8>>> {
        Ax100Mode5::decode_byte(self, byte)
    }

    fn reset(&mut self) {
        Ax100Mode5::reset(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER_LEN: usize = 8 + 4;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 + 7) as u8).collect()
    }

    #[test]
    fn frame_layout() {
        let ax100 = Ax100Mode5::new();
        let data: Vec<u8> = (1..=10).collect();
        let frame = ax100.encode(&data).unwrap();

        assert_eq!(frame.len(), HEADER_LEN + 3 + 10 + 32);
        assert_eq!(frame[..8], [0xAA; 8]);
        assert_eq!(frame[8..12], [0x93, 0x0B, 0x51, 0xDE]);
        assert_eq!(frame[12..15], golay::encode(42));
        // first data byte is scrambled with the first PN byte
        assert_eq!(frame[15], 0x01 ^ 0xFF);
        assert_eq!(frame[16], 0x02 ^ 0x48);
    }

    #[test]
    fn round_trip_all_lengths() {
        let ax100 = Ax100Mode5::new();
        for len in 1..=Ax100Mode5::MAX_DATA_LEN {
            let data = payload(len);
            let frame = ax100.encode(&data).unwrap();
            assert_eq!(ax100.decode(&frame[HEADER_LEN..]).unwrap(), data, "len {len}");
        }
    }

    #[test]
    fn invalid_data_lengths_are_err() {
        let ax100 = Ax100Mode5::new();
        assert!(ax100.encode(&[]).is_err());
        assert!(ax100.encode(&[0u8; 224]).is_err());
    }

    #[test]
    fn corrects_payload_errors() {
        let ax100 = Ax100Mode5::new();
        let data = payload(100);
        let mut frame = ax100.encode(&data).unwrap();
        for idx in [HEADER_LEN + 3, HEADER_LEN + 50, frame.len() - 1] {
            frame[idx] ^= 0xFF;
        }
        assert_eq!(ax100.decode(&frame[HEADER_LEN..]).unwrap(), data);
    }

    #[test]
    fn corrects_length_field_errors() {
        let ax100 = Ax100Mode5::new();
        let data = payload(20);
        let mut frame = ax100.encode(&data).unwrap();
        frame[HEADER_LEN] ^= 0x81;
        frame[HEADER_LEN + 2] ^= 0x04;
        assert_eq!(ax100.decode(&frame[HEADER_LEN..]).unwrap(), data);
    }

    #[test]
    fn damaged_length_field_is_err_unless_tolerant() {
        let data = payload(20);
        let mut frame = Ax100Mode5::new().encode(&data).unwrap();
        // 4 bit errors, third byte untouched
        frame[HEADER_LEN] ^= 0xF0;

        let strict = Ax100Mode5::new();
        assert!(matches!(
            strict.decode(&frame[HEADER_LEN..]),
            Err(Error::UncorrectableGolay)
        ));

        let tolerant = Ax100Mode5::new().with_tolerant_length(true);
        assert_eq!(tolerant.decode(&frame[HEADER_LEN..]).unwrap(), data);
    }

    #[test]
    fn too_many_payload_errors_is_err() {
        let ax100 = Ax100Mode5::new();
        let mut frame = ax100.encode(&payload(60)).unwrap();
        for idx in (HEADER_LEN + 3..frame.len()).step_by(4).take(20) {
            frame[idx] ^= 0x5A;
        }
        assert!(matches!(
            ax100.decode(&frame[HEADER_LEN..]),
            Err(Error::UncorrectableReedSolomon(_))
        ));
    }

    #[test]
    fn short_length_field_is_err() {
        let mut frame = golay::encode(32).to_vec();
        frame.extend([0u8; 40]);
        assert!(matches!(
            Ax100Mode5::new().decode(&frame),
            Err(Error::InvalidLength(_))
        ));
    }

    #[test]
    fn truncated_frame_is_err() {
        let ax100 = Ax100Mode5::new();
        let frame = ax100.encode(&payload(30)).unwrap();
        assert!(matches!(
            ax100.decode(&frame[HEADER_LEN..frame.len() - 1]),
            Err(Error::InvalidLength(_))
        ));
    }

    #[test]
    fn incremental_decoder_handles_consecutive_frames() {
        let ax100 = Ax100Mode5::new();
        let first = payload(5);
        let second = payload(200);
        let mut decoder = Ax100Mode5::new();

        let mut got = Vec::new();
        for data in [&first, &second] {
            let frame = ax100.encode(data).unwrap();
            for byte in &frame[HEADER_LEN..] {
                if let Some(data) = decoder.decode_byte(*byte).unwrap() {
                    got.push(data);
                }
            }
        }
        assert_eq!(got, vec![first, second]);
    }

    #[test]
    fn decoder_recovers_after_error() {
        let ax100 = Ax100Mode5::new();
        let mut decoder = Ax100Mode5::new();
        let mut bad = golay::encode(10).to_vec();
        bad[1] ^= 0x0F;
        let errs = bad
            .iter()
            .filter_map(|b| decoder.decode_byte(*b).err())
            .count();
        assert_eq!(errs, 1);

        let data = payload(12);
        let frame = ax100.encode(&data).unwrap();
        let got: Vec<Vec<u8>> = frame[HEADER_LEN..]
            .iter()
            .filter_map(|b| decoder.decode_byte(*b).unwrap())
            .collect();
        assert_eq!(got, vec![data]);
    }
}
