//! CubeSat Space Protocol (CSP v1) network layer.
//!
//! A packet is a 4-byte header followed by the payload, optionally followed by a truncated
//! HMAC-SHA1 tag and a CRC-32C checksum.
//!
//! ```text
//! byte 0: prio(2) | src(5) | dst(1, msb)
//! byte 1: dst(4)  | dport(4, msb)
//! byte 2: dport(2) | sport(6)
//! byte 3: reserved(3) | SFP | HMAC | XTEA | RDP | CRC
//! ```
mod reassembly;
mod services;

pub use reassembly::*;
pub use services::*;

use std::fmt::Display;
use std::ops::BitOr;

use crc::{Crc, CRC_32_ISCSI};
use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};
use tracing::debug;
use typed_builder::TypedBuilder;

use crate::prelude::*;

const CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    Critical = 0,
    High = 1,
    #[default]
    Norm = 2,
    Low = 3,
}

impl Priority {
    /// From the 2 low bits of `val`.
    #[must_use]
    pub fn from_bits(val: u8) -> Self {
        match val & 0x3 {
            0 => Priority::Critical,
            1 => Priority::High,
            2 => Priority::Norm,
            _ => Priority::Low,
        }
    }
}

/// Header flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CspFlags(u8);

impl CspFlags {
    pub const NONE: CspFlags = CspFlags(0);
    pub const SFP: CspFlags = CspFlags(0x10);
    pub const HMAC: CspFlags = CspFlags(0x08);
    pub const XTEA: CspFlags = CspFlags(0x04);
    pub const RDP: CspFlags = CspFlags(0x02);
    pub const CRC: CspFlags = CspFlags(0x01);

    const MASK: u8 = 0x1F;

    /// Flags from a raw header byte; reserved bits are dropped.
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        CspFlags(bits & Self::MASK)
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn contains(self, other: CspFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: CspFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: CspFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for CspFlags {
    type Output = CspFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        CspFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TypedBuilder)]
pub struct CspHeader {
    #[builder(default)]
    pub priority: Priority,
    /// Source address. Overwritten with the codec address by [CspCodec::encode].
    #[builder(default)]
    pub src: u8,
    pub dst: u8,
    pub dst_port: u8,
    pub src_port: u8,
    #[builder(default)]
    pub flags: CspFlags,
}

impl CspHeader {
    /// Header length in bytes.
    pub const LEN: usize = 4;
    pub const MAX_ADDRESS: u8 = 31;
    pub const MAX_PORT: u8 = 63;

    fn check(field: &'static str, value: u8, max: u8) -> Result<()> {
        if value > max {
            return Err(Error::InvalidField {
                field,
                value: u32::from(value),
            });
        }
        Ok(())
    }

    /// # Errors
    /// [Error::InvalidField] if an address or port is out of range.
    pub fn encode(&self) -> Result<[u8; Self::LEN]> {
        Self::check("src", self.src, Self::MAX_ADDRESS)?;
        Self::check("dst", self.dst, Self::MAX_ADDRESS)?;
        Self::check("dst_port", self.dst_port, Self::MAX_PORT)?;
        Self::check("src_port", self.src_port, Self::MAX_PORT)?;

        Ok([
            ((self.priority as u8) << 6) | (self.src << 1) | (self.dst >> 4),
            ((self.dst & 0xF) << 4) | (self.dst_port >> 2),
            ((self.dst_port & 0x3) << 6) | self.src_port,
            self.flags.bits(),
        ])
    }

    /// # Errors
    /// [Error::HeaderTooShort] if fewer than 4 bytes are given.
    pub fn decode(dat: &[u8]) -> Result<Self> {
        if dat.len() < Self::LEN {
            return Err(Error::HeaderTooShort {
                actual: dat.len(),
                minimum: Self::LEN,
            });
        }
        Ok(CspHeader {
            priority: Priority::from_bits(dat[0] >> 6),
            src: (dat[0] >> 1) & 0x1F,
            dst: ((dat[0] & 0x1) << 4) | (dat[1] >> 4),
            dst_port: ((dat[1] & 0xF) << 2) | (dat[2] >> 6),
            src_port: dat[2] & 0x3F,
            flags: CspFlags::from_bits(dat[3]),
        })
    }
}

impl Display for CspHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} prio={:?} flags={:#04x}",
            self.src,
            self.src_port,
            self.dst,
            self.dst_port,
            self.priority,
            self.flags.bits()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspPacket {
    pub header: CspHeader,
    /// Payload with any HMAC tag and CRC removed.
    pub payload: Vec<u8>,
}

/// Key used for the truncated HMAC-SHA1 tag: the first 16 bytes of SHA-1 of the shared secret.
#[derive(Clone, PartialEq, Eq)]
pub struct HmacKey([u8; 16]);

impl HmacKey {
    /// Length of the tag appended to packets.
    pub const TAG_LEN: usize = 4;

    #[must_use]
    pub fn new(secret: &str) -> Self {
        let digest = Sha1::digest(secret.as_bytes());
        let mut key = [0u8; 16];
        key.copy_from_slice(&digest[..16]);
        HmacKey(key)
    }

    fn mac(&self, header: &[u8], payload: &[u8]) -> Result<HmacSha1> {
        let mut mac = <HmacSha1 as Mac>::new_from_slice(&self.0)
            .map_err(|err| Error::InvalidParameter(format!("HMAC key: {err}")))?;
        mac.update(header);
        mac.update(payload);
        Ok(mac)
    }
}

impl std::fmt::Debug for HmacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HmacKey(..)")
    }
}

/// Set the HMAC flag on an encoded packet and append the tag.
///
/// The tag covers the header, with the flag already set, and everything after it.
///
/// # Errors
/// [Error::HeaderTooShort] if `packet` has no complete header.
pub fn append_hmac(packet: &mut Vec<u8>, key: &HmacKey) -> Result<()> {
    if packet.len() < CspHeader::LEN {
        return Err(Error::HeaderTooShort {
            actual: packet.len(),
            minimum: CspHeader::LEN,
        });
    }
    packet[3] |= CspFlags::HMAC.bits();
    let mac = key.mac(&packet[..CspHeader::LEN], &packet[CspHeader::LEN..])?;
    let tag = mac.finalize().into_bytes();
    packet.extend_from_slice(&tag[..HmacKey::TAG_LEN]);
    Ok(())
}

/// Verify and strip the trailing HMAC tag of `packet`.
///
/// # Errors
/// [Error::HeaderTooShort] if there is no room for a header and tag, or
/// [Error::HmacMismatch] if the tag does not verify.
pub fn verify_hmac(packet: &mut Vec<u8>, key: &HmacKey) -> Result<()> {
    let minimum = CspHeader::LEN + HmacKey::TAG_LEN;
    if packet.len() < minimum {
        return Err(Error::HeaderTooShort {
            actual: packet.len(),
            minimum,
        });
    }
    let end = packet.len() - HmacKey::TAG_LEN;
    let mac = key.mac(&packet[..CspHeader::LEN], &packet[CspHeader::LEN..end])?;
    mac.verify_truncated_left(&packet[end..])
        .map_err(|_| Error::HmacMismatch)?;
    packet.truncate(end);
    Ok(())
}

/// Encoder/decoder for a CSP node.
#[derive(Debug, Clone)]
pub struct CspCodec {
    address: u8,
    hmac_key: Option<HmacKey>,
}

impl CspCodec {
    /// Length of the CRC-32C trailer.
    pub const CRC_LEN: usize = 4;

    /// # Errors
    /// [Error::InvalidField] if `address` is greater than 31.
    pub fn new(address: u8) -> Result<Self> {
        CspHeader::check("address", address, CspHeader::MAX_ADDRESS)?;
        Ok(CspCodec {
            address,
            hmac_key: None,
        })
    }

    /// Key used to tag packets with the HMAC flag and to verify received tags.
    #[must_use]
    pub fn with_hmac_key(mut self, key: HmacKey) -> Self {
        self.hmac_key = Some(key);
        self
    }

    #[must_use]
    pub fn address(&self) -> u8 {
        self.address
    }

    /// # Errors
    /// [Error::InvalidField] if `address` is greater than 31.
    pub fn set_address(&mut self, address: u8) -> Result<()> {
        CspHeader::check("address", address, CspHeader::MAX_ADDRESS)?;
        self.address = address;
        Ok(())
    }

    /// Encode a packet from this node. The header source address is replaced with the codec
    /// address. The HMAC tag is appended when the HMAC flag is set, then the CRC when the
    /// CRC flag is set.
    ///
    /// # Errors
    /// [Error::InvalidField] for out of range header fields, or [Error::InvalidParameter] if
    /// the HMAC flag is set without a configured key.
    pub fn encode(&self, header: CspHeader, payload: &[u8]) -> Result<Vec<u8>> {
        let header = CspHeader {
            src: self.address,
            ..header
        };
        let mut packet = Vec::with_capacity(
            CspHeader::LEN + payload.len() + HmacKey::TAG_LEN + Self::CRC_LEN,
        );
        packet.extend_from_slice(&header.encode()?);
        packet.extend_from_slice(payload);

        if header.flags.contains(CspFlags::HMAC) {
            let Some(key) = &self.hmac_key else {
                return Err(Error::InvalidParameter(
                    "HMAC flag set but no HMAC key configured".to_string(),
                ));
            };
            append_hmac(&mut packet, key)?;
        }
        if header.flags.contains(CspFlags::CRC) {
            let crc = CRC32C.checksum(&packet[CspHeader::LEN..]);
            packet.extend_from_slice(&crc.to_be_bytes());
        }
        Ok(packet)
    }

    /// Decode a received packet, verifying and stripping the CRC and, when a key is
    /// configured, the HMAC tag. Without a key the tag is left in the payload.
    ///
    /// # Errors
    /// [Error::HeaderTooShort], [Error::CrcMismatch] or [Error::HmacMismatch].
    pub fn decode(&self, packet: &[u8]) -> Result<CspPacket> {
        let header = CspHeader::decode(packet)?;
        let mut packet = packet.to_vec();

        if header.flags.contains(CspFlags::CRC) {
            let minimum = CspHeader::LEN + Self::CRC_LEN;
            if packet.len() < minimum {
                return Err(Error::HeaderTooShort {
                    actual: packet.len(),
                    minimum,
                });
            }
            let end = packet.len() - Self::CRC_LEN;
            let expected = u32::from_be_bytes([
                packet[end],
                packet[end + 1],
                packet[end + 2],
                packet[end + 3],
            ]);
            if CRC32C.checksum(&packet[CspHeader::LEN..end]) != expected {
                return Err(Error::CrcMismatch);
            }
            packet.truncate(end);
        }

        if header.flags.contains(CspFlags::HMAC) {
            match &self.hmac_key {
                Some(key) => verify_hmac(&mut packet, key)?,
                None => debug!(%header, "no HMAC key configured; tag not verified"),
            }
        }

        packet.drain(..CspHeader::LEN);
        Ok(CspPacket {
            header,
            payload: packet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn header(dst: u8, dst_port: u8, src_port: u8) -> CspHeader {
        CspHeader::builder()
            .dst(dst)
            .dst_port(dst_port)
            .src_port(src_port)
            .build()
    }

    #[test]
    fn header_bit_layout() {
        let hdr = CspHeader::builder()
            .priority(Priority::Norm)
            .src(1)
            .dst(2)
            .dst_port(10)
            .src_port(20)
            .build();
        assert_eq!(hdr.encode().unwrap(), [0x82, 0x22, 0x94, 0x00]);
    }

    #[test]
    fn header_extremes() {
        let hdr = CspHeader {
            priority: Priority::Low,
            src: 31,
            dst: 31,
            dst_port: 63,
            src_port: 63,
            flags: CspFlags::SFP | CspFlags::HMAC | CspFlags::XTEA | CspFlags::RDP | CspFlags::CRC,
        };
        let dat = hdr.encode().unwrap();
        assert_eq!(dat, [0xFF, 0xFF, 0xFF, 0x1F]);
        assert_eq!(CspHeader::decode(&dat).unwrap(), hdr);
    }

    #[test]
    fn flags_have_distinct_bits() {
        let all = [
            CspFlags::SFP,
            CspFlags::HMAC,
            CspFlags::XTEA,
            CspFlags::RDP,
            CspFlags::CRC,
        ];
        for (i, a) in all.iter().enumerate() {
            assert_eq!(a.bits().count_ones(), 1);
            for b in &all[i + 1..] {
                assert!(!a.contains(*b));
            }
        }
        let hdr = CspHeader::decode(&[0, 0, 0, 0xE6]).unwrap();
        assert!(hdr.flags.contains(CspFlags::XTEA));
        assert!(hdr.flags.contains(CspFlags::RDP));
        assert!(!hdr.flags.contains(CspFlags::CRC));
        assert_eq!(hdr.flags.bits(), 0x06, "reserved bits dropped");
    }

    #[test_case(32, 0, 0, "dst")]
    #[test_case(0, 64, 0, "dst_port")]
    #[test_case(0, 0, 64, "src_port")]
    fn out_of_range_fields_are_err(dst: u8, dst_port: u8, src_port: u8, name: &str) {
        let codec = CspCodec::new(1).unwrap();
        let err = codec
            .encode(header(dst, dst_port, src_port), &[])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidField { field, .. } if field == name));
    }

    #[test]
    fn short_header_is_err() {
        let codec = CspCodec::new(1).unwrap();
        assert!(matches!(
            codec.decode(&[1, 2, 3]),
            Err(Error::HeaderTooShort {
                actual: 3,
                minimum: 4
            })
        ));
    }

    #[test]
    fn address_config() {
        let mut codec = CspCodec::new(7).unwrap();
        assert_eq!(codec.address(), 7);
        codec.set_address(25).unwrap();
        assert_eq!(codec.address(), 25);
        assert!(codec.set_address(32).is_err());
        assert!(CspCodec::new(40).is_err());

        let pkt = codec.encode(header(3, 10, 11), &[1]).unwrap();
        assert_eq!(CspHeader::decode(&pkt).unwrap().src, 25);
    }

    #[test]
    fn encode_decode() {
        let codec = CspCodec::new(5).unwrap();
        let payload: Vec<u8> = (0..=255).collect();
        let pkt = codec.encode(header(9, 33, 17), &payload).unwrap();
        assert_eq!(pkt.len(), 4 + payload.len());

        let got = codec.decode(&pkt).unwrap();
        assert_eq!(got.header.src, 5);
        assert_eq!(got.header.dst, 9);
        assert_eq!(got.header.dst_port, 33);
        assert_eq!(got.header.src_port, 17);
        assert_eq!(got.header.priority, Priority::Norm);
        assert_eq!(got.header.flags, CspFlags::NONE);
        assert_eq!(got.payload, payload);
    }

    #[test]
    fn hmac_tag_matches_reference() {
        let key = HmacKey::new("0123456789abcdef");
        let codec = CspCodec::new(1).unwrap().with_hmac_key(key.clone());
        let mut hdr = header(2, 10, 11);
        hdr.flags = CspFlags::HMAC;
        let payload = [0xDE, 0xAD, 0xBE, 0xEF];
        let pkt = codec.encode(hdr, &payload).unwrap();
        assert_eq!(pkt.len(), 4 + 4 + 4);
        assert_eq!(pkt[3], CspFlags::HMAC.bits());

        let digest = Sha1::digest(b"0123456789abcdef");
        let mut mac = <HmacSha1 as Mac>::new_from_slice(&digest[..16]).unwrap();
        mac.update(&pkt[..8]);
        let expected = mac.finalize().into_bytes();
        assert_eq!(pkt[8..], expected[..4]);

        let got = codec.decode(&pkt).unwrap();
        assert_eq!(got.payload, payload);
    }

    #[test]
    fn append_hmac_sets_flag() {
        let key = HmacKey::new("secret");
        let codec = CspCodec::new(1).unwrap();
        let mut pkt = codec.encode(header(2, 10, 11), &[1, 2, 3]).unwrap();
        append_hmac(&mut pkt, &key).unwrap();
        assert!(CspHeader::decode(&pkt).unwrap().flags.contains(CspFlags::HMAC));

        let verifier = CspCodec::new(2).unwrap().with_hmac_key(key);
        assert_eq!(verifier.decode(&pkt).unwrap().payload, [1, 2, 3]);
    }

    #[test]
    fn hmac_mismatch_is_err() {
        let codec = CspCodec::new(1)
            .unwrap()
            .with_hmac_key(HmacKey::new("secret"));
        let mut hdr = header(2, 10, 11);
        hdr.flags = CspFlags::HMAC;
        let mut pkt = codec.encode(hdr, &[1, 2, 3]).unwrap();
        pkt[5] ^= 1;
        assert!(matches!(codec.decode(&pkt), Err(Error::HmacMismatch)));

        let other = CspCodec::new(1)
            .unwrap()
            .with_hmac_key(HmacKey::new("other"));
        pkt[5] ^= 1;
        assert!(matches!(other.decode(&pkt), Err(Error::HmacMismatch)));
    }

    #[test]
    fn hmac_without_key() {
        let codec = CspCodec::new(1).unwrap();
        let mut hdr = header(2, 10, 11);
        hdr.flags = CspFlags::HMAC;
        assert!(matches!(
            codec.encode(hdr, &[1]),
            Err(Error::InvalidParameter(_))
        ));

        let mut pkt = codec.encode(header(2, 10, 11), &[1]).unwrap();
        append_hmac(&mut pkt, &HmacKey::new("k")).unwrap();
        // tag is left in place
        assert_eq!(codec.decode(&pkt).unwrap().payload.len(), 1 + 4);
    }

    #[test]
    fn crc_trailer() {
        let codec = CspCodec::new(1).unwrap();
        let mut hdr = header(2, 10, 11);
        hdr.flags = CspFlags::CRC;
        let pkt = codec.encode(hdr, b"123456789").unwrap();
        // CRC-32C check value
        assert_eq!(pkt[pkt.len() - 4..], [0xE3, 0x06, 0x92, 0x83]);
        assert_eq!(codec.decode(&pkt).unwrap().payload, b"123456789");

        let mut bad = pkt.clone();
        bad[6] ^= 0x40;
        assert!(matches!(codec.decode(&bad), Err(Error::CrcMismatch)));
        assert!(matches!(
            codec.decode(&pkt[..6]),
            Err(Error::HeaderTooShort { .. })
        ));
    }

    #[test]
    fn hmac_and_crc() {
        let codec = CspCodec::new(4)
            .unwrap()
            .with_hmac_key(HmacKey::new("secret"));
        let mut hdr = header(2, 10, 11);
        hdr.flags = CspFlags::HMAC | CspFlags::CRC;
        let pkt = codec.encode(hdr, &[9; 20]).unwrap();
        assert_eq!(pkt.len(), 4 + 20 + 4 + 4);
        let got = codec.decode(&pkt).unwrap();
        assert_eq!(got.payload, [9; 20]);
        assert_eq!(got.header.flags, CspFlags::HMAC | CspFlags::CRC);
    }
}
