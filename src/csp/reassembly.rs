use tracing::{debug, warn};

use crate::prelude::*;

/// Header carried by each fragment of a paginated transfer, in front of its slice of the
/// transfer payload. All fields are big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    /// Transfer sequence number, shared by all fragments of one transfer.
    pub seq: u16,
    /// Zero-based fragment index.
    pub index: u16,
    /// Total number of fragments in the transfer.
    pub count: u16,
}

impl FragmentHeader {
    pub const LEN: usize = 6;

    #[must_use]
    pub fn encode(&self) -> [u8; Self::LEN] {
        let [s0, s1] = self.seq.to_be_bytes();
        let [i0, i1] = self.index.to_be_bytes();
        let [c0, c1] = self.count.to_be_bytes();
        [s0, s1, i0, i1, c0, c1]
    }

    /// # Errors
    /// [Error::InvalidLength] if fewer than 6 bytes are given.
    pub fn decode(dat: &[u8]) -> Result<Self> {
        if dat.len() < Self::LEN {
            return Err(Error::InvalidLength(format!(
                "fragment header needs {} bytes, got {}",
                Self::LEN,
                dat.len()
            )));
        }
        Ok(FragmentHeader {
            seq: u16::from_be_bytes([dat[0], dat[1]]),
            index: u16::from_be_bytes([dat[2], dat[3]]),
            count: u16::from_be_bytes([dat[4], dat[5]]),
        })
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.index.saturating_add(1) >= self.count
    }
}

/// Split `payload` into fragments of at most `max_len` bytes each, header included.
///
/// An empty payload gives a single empty fragment.
///
/// # Errors
/// [Error::InvalidLength] if `max_len` leaves no room for data, or the payload needs more
/// than 65535 fragments.
pub fn fragment(seq: u16, payload: &[u8], max_len: usize) -> Result<Vec<Vec<u8>>> {
    if max_len <= FragmentHeader::LEN {
        return Err(Error::InvalidLength(format!(
            "fragment length {max_len} leaves no room for data"
        )));
    }
    let chunk_len = max_len - FragmentHeader::LEN;
    let chunks: Vec<&[u8]> = if payload.is_empty() {
        vec![payload]
    } else {
        payload.chunks(chunk_len).collect()
    };
    let count = u16::try_from(chunks.len()).map_err(|_| {
        Error::InvalidLength(format!("{} fragments exceeds the maximum", chunks.len()))
    })?;

    Ok(chunks
        .into_iter()
        .zip(0..count)
        .map(|(chunk, index)| {
            let mut frag = Vec::with_capacity(FragmentHeader::LEN + chunk.len());
            frag.extend_from_slice(&FragmentHeader { seq, index, count }.encode());
            frag.extend_from_slice(chunk);
            frag
        })
        .collect())
}

#[derive(Debug)]
struct Transfer {
    seq: u16,
    next_index: u16,
    count: u16,
    buf: Vec<u8>,
}

/// Single-slot reassembler for paginated transfers.
///
/// Fragments must arrive in order. A discontinuity drops the partial transfer and is
/// reported as [Error::FragmentSequenceLost]; the next transfer starting at index 0 is
/// reassembled normally. An index 0 fragment arriving mid-transfer drops the partial
/// transfer with a warning and starts the new one.
#[derive(Debug, Default)]
pub struct Reassembler {
    current: Option<Transfer>,
}

impl Reassembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a transfer is partially received.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.current.is_some()
    }

    /// Number of payload bytes buffered for the current transfer.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.current.as_ref().map_or(0, |t| t.buf.len())
    }

    /// Drop any partial transfer.
    pub fn reset(&mut self) {
        self.current = None;
    }

    fn lost(&mut self, hdr: &FragmentHeader) -> Error {
        let expected_seq = self.current.take().map(|t| t.seq);
        Error::FragmentSequenceLost {
            expected_seq,
            seq: hdr.seq,
            index: hdr.index,
        }
    }

    /// Add one fragment, header included. Returns the complete transfer payload when the
    /// last fragment is added.
    ///
    /// # Errors
    /// [Error::InvalidLength] if the fragment header is truncated, or
    /// [Error::FragmentSequenceLost] on a discontinuity other than a new transfer starting,
    /// after which the partial transfer is dropped.
    pub fn push(&mut self, fragment: &[u8]) -> Result<Option<Vec<u8>>> {
        let hdr = FragmentHeader::decode(fragment)?;
        let data = &fragment[FragmentHeader::LEN..];

        if hdr.count == 0 || hdr.index >= hdr.count {
            return Err(self.lost(&hdr));
        }

        if hdr.index == 0 {
            if let Some(prev) = self.current.take() {
                warn!(
                    seq = prev.seq,
                    buffered = prev.buf.len(),
                    new_seq = hdr.seq,
                    "incomplete transfer dropped"
                );
            }
            self.current = Some(Transfer {
                seq: hdr.seq,
                next_index: 0,
                count: hdr.count,
                buf: Vec::new(),
            });
        }

        let Some(transfer) = self.current.as_mut() else {
            return Err(self.lost(&hdr));
        };
        if transfer.seq != hdr.seq || transfer.next_index != hdr.index || transfer.count != hdr.count
        {
            return Err(self.lost(&hdr));
        }

        transfer.buf.extend_from_slice(data);
        transfer.next_index += 1;
        debug!(
            seq = hdr.seq,
            index = hdr.index,
            count = hdr.count,
            "reassembled fragment"
        );

        if hdr.is_last() {
            let done = self.current.take().map(|t| t.buf);
            return Ok(done);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn header_layout() {
        let hdr = FragmentHeader {
            seq: 0x0102,
            index: 0x0304,
            count: 0x0506,
        };
        assert_eq!(hdr.encode(), [1, 2, 3, 4, 5, 6]);
        assert_eq!(FragmentHeader::decode(&hdr.encode()).unwrap(), hdr);
        assert!(FragmentHeader::decode(&[1, 2, 3]).is_err());
    }

    #[test]
    fn fragment_sizes() {
        let frags = fragment(7, &payload(25), 16).unwrap();
        assert_eq!(frags.len(), 3);
        assert_eq!(frags[0].len(), 16);
        assert_eq!(frags[2].len(), 6 + 5);
        for (i, frag) in frags.iter().enumerate() {
            let hdr = FragmentHeader::decode(frag).unwrap();
            assert_eq!(hdr.seq, 7);
            assert_eq!(usize::from(hdr.index), i);
            assert_eq!(hdr.count, 3);
        }
        assert!(fragment(7, &payload(25), 6).is_err());
        assert_eq!(fragment(7, &[], 16).unwrap().len(), 1);
    }

    #[test]
    fn reassembles_in_order() {
        let data = payload(1000);
        let mut reasm = Reassembler::new();
        let frags = fragment(42, &data, 200).unwrap();
        let (last, rest) = frags.split_last().unwrap();
        for frag in rest {
            assert_eq!(reasm.push(frag).unwrap(), None);
            assert!(reasm.in_progress());
        }
        assert_eq!(reasm.buffered(), 194 * rest.len());
        assert_eq!(reasm.push(last).unwrap(), Some(data));
        assert!(!reasm.in_progress());
    }

    #[test]
    fn single_fragment_transfer() {
        let mut reasm = Reassembler::new();
        let frags = fragment(1, &[9, 8, 7], 100).unwrap();
        assert_eq!(reasm.push(&frags[0]).unwrap(), Some(vec![9, 8, 7]));
    }

    #[test]
    fn sequence_mismatch_is_lost() {
        let mut reasm = Reassembler::new();
        let first = fragment(1, &payload(30), 16).unwrap();
        let other = fragment(2, &payload(30), 16).unwrap();

        reasm.push(&first[0]).unwrap();
        let err = reasm.push(&other[1]).unwrap_err();
        assert!(matches!(
            err,
            Error::FragmentSequenceLost {
                expected_seq: Some(1),
                seq: 2,
                index: 1
            }
        ));
        assert!(!reasm.in_progress());
        assert_eq!(reasm.buffered(), 0);

        // a following well-formed transfer succeeds
        let data = payload(30);
        let mut got = None;
        for frag in fragment(3, &data, 16).unwrap() {
            got = reasm.push(&frag).unwrap();
        }
        assert_eq!(got, Some(data));
    }

    #[test]
    fn skipped_fragment_is_lost() {
        let mut reasm = Reassembler::new();
        let frags = fragment(5, &payload(50), 16).unwrap();
        reasm.push(&frags[0]).unwrap();
        assert!(matches!(
            reasm.push(&frags[2]),
            Err(Error::FragmentSequenceLost { index: 2, .. })
        ));
    }

    #[test]
    fn continuation_while_idle_is_lost() {
        let mut reasm = Reassembler::new();
        let frags = fragment(5, &payload(50), 16).unwrap();
        assert!(matches!(
            reasm.push(&frags[1]),
            Err(Error::FragmentSequenceLost {
                expected_seq: None,
                ..
            })
        ));
    }

    #[test]
    fn restart_mid_transfer_starts_over() {
        let mut reasm = Reassembler::new();
        let frags = fragment(5, &payload(50), 16).unwrap();
        reasm.push(&frags[0]).unwrap();
        reasm.push(&frags[1]).unwrap();
        assert_eq!(reasm.push(&frags[0]).unwrap(), None);
        assert!(reasm.in_progress());
        assert_eq!(reasm.buffered(), 10);
    }

    #[test]
    fn transfer_after_missing_last_fragment_completes() {
        let mut reasm = Reassembler::new();
        let a = fragment(1, &payload(30), 16).unwrap();
        let b = fragment(2, &[0xBB; 30], 16).unwrap();
        assert_eq!(a.len(), 3);

        reasm.push(&a[0]).unwrap();
        reasm.push(&a[1]).unwrap();
        let results: Vec<Option<Vec<u8>>> = b.iter().map(|f| reasm.push(f).unwrap()).collect();
        assert_eq!(results, vec![None, None, Some(vec![0xBB; 30])]);
        assert!(!reasm.in_progress());
    }

    #[test]
    fn single_fragment_transfer_after_incomplete_one() {
        let mut reasm = Reassembler::new();
        let a = fragment(1, &payload(30), 16).unwrap();
        reasm.push(&a[0]).unwrap();
        let b = fragment(2, &[7; 5], 16).unwrap();
        assert_eq!(reasm.push(&b[0]).unwrap(), Some(vec![7; 5]));
    }

    #[test]
    fn reset_drops_transfer() {
        let mut reasm = Reassembler::new();
        let frags = fragment(5, &payload(50), 16).unwrap();
        reasm.push(&frags[0]).unwrap();
        reasm.reset();
        assert!(!reasm.in_progress());
        assert!(reasm.push(&frags[1]).is_err());
    }
}
