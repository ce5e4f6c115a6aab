//! Payload builders for the standard CSP services.
//!
//! All service packets use [Priority::Norm] and the service port as both source and
//! destination port.
use super::{CspCodec, CspHeader, Priority};
use crate::prelude::*;

pub const PORT_CMP: u8 = 0;
pub const PORT_PING: u8 = 1;
pub const PORT_PS: u8 = 2;
pub const PORT_MEMFREE: u8 = 3;
pub const PORT_REBOOT: u8 = 4;
pub const PORT_BUF_FREE: u8 = 5;
pub const PORT_UPTIME: u8 = 6;

const CMP_REQUEST: u8 = 0;

/// CSP management protocol request codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CmpCode {
    Ident = 1,
    RouteSet = 2,
    IfStats = 3,
    Peek = 4,
    Poke = 5,
    Clock = 6,
}

const PS_MAGIC: u8 = 0x55;
const REBOOT_MAGIC: [u8; 4] = [0x80, 0x07, 0x80, 0x07];
const SHUTDOWN_MAGIC: [u8; 4] = [0xD1, 0xE5, 0x52, 0x9A];

impl CspCodec {
    fn service(&self, dst: u8, port: u8, payload: &[u8]) -> Result<Vec<u8>> {
        let header = CspHeader::builder()
            .priority(Priority::Norm)
            .dst(dst)
            .dst_port(port)
            .src_port(port)
            .build();
        self.encode(header, payload)
    }

    fn cmp(&self, dst: u8, code: CmpCode, args: &[u8]) -> Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(2 + args.len());
        payload.push(CMP_REQUEST);
        payload.push(code as u8);
        payload.extend_from_slice(args);
        self.service(dst, PORT_CMP, &payload)
    }

    /// # Errors
    /// [Error::InvalidField] if `dst` is out of range.
    pub fn encode_cmp_ident(&self, dst: u8) -> Result<Vec<u8>> {
        self.cmp(dst, CmpCode::Ident, &[])
    }

    /// Set the route to `node` via `mac` on interface `ifname`.
    ///
    /// # Errors
    /// [Error::InvalidField] if `dst` is out of range.
    pub fn encode_cmp_route_set(&self, dst: u8, node: u8, mac: u8, ifname: &str) -> Result<Vec<u8>> {
        let mut args = vec![node, mac];
        args.extend_from_slice(ifname.as_bytes());
        self.cmp(dst, CmpCode::RouteSet, &args)
    }

    /// # Errors
    /// [Error::InvalidField] if `dst` is out of range.
    pub fn encode_cmp_if_stats(&self, dst: u8, ifname: &str) -> Result<Vec<u8>> {
        self.cmp(dst, CmpCode::IfStats, ifname.as_bytes())
    }

    /// # Errors
    /// [Error::InvalidField] if `dst` is out of range.
    pub fn encode_cmp_peek(&self, dst: u8, addr: u32, len: u8) -> Result<Vec<u8>> {
        let mut args = addr.to_be_bytes().to_vec();
        args.push(len);
        self.cmp(dst, CmpCode::Peek, &args)
    }

    /// # Errors
    /// [Error::InvalidField] if `dst` is out of range, or [Error::InvalidLength] if `data` is
    /// longer than 255 bytes.
    pub fn encode_cmp_poke(&self, dst: u8, addr: u32, data: &[u8]) -> Result<Vec<u8>> {
        let len = u8::try_from(data.len()).map_err(|_| {
            Error::InvalidLength(format!("poke data must be at most 255 bytes, got {}", data.len()))
        })?;
        let mut args = addr.to_be_bytes().to_vec();
        args.push(len);
        args.extend_from_slice(data);
        self.cmp(dst, CmpCode::Poke, &args)
    }

    /// # Errors
    /// [Error::InvalidField] if `dst` is out of range.
    pub fn encode_cmp_clock_set(&self, dst: u8, sec: u32, nsec: u32) -> Result<Vec<u8>> {
        let mut args = sec.to_be_bytes().to_vec();
        args.extend_from_slice(&nsec.to_be_bytes());
        self.cmp(dst, CmpCode::Clock, &args)
    }

    /// A clock request with a zero timestamp reads the clock without setting it.
    ///
    /// # Errors
    /// [Error::InvalidField] if `dst` is out of range.
    pub fn encode_cmp_clock_get(&self, dst: u8) -> Result<Vec<u8>> {
        self.cmp(dst, CmpCode::Clock, &[0; 8])
    }

    /// Ping with a `num_bytes` payload of `0, 1, 2, ...` wrapping at 256.
    ///
    /// # Errors
    /// [Error::InvalidField] if `dst` is out of range.
    pub fn encode_ping(&self, dst: u8, num_bytes: usize) -> Result<Vec<u8>> {
        let payload: Vec<u8> = (0..num_bytes).map(|i| i as u8).collect();
        self.service(dst, PORT_PING, &payload)
    }

    /// # Errors
    /// [Error::InvalidField] if `dst` is out of range.
    pub fn encode_ps(&self, dst: u8) -> Result<Vec<u8>> {
        self.service(dst, PORT_PS, &[PS_MAGIC])
    }

    /// # Errors
    /// [Error::InvalidField] if `dst` is out of range.
    pub fn encode_memfree(&self, dst: u8) -> Result<Vec<u8>> {
        self.service(dst, PORT_MEMFREE, &[])
    }

    /// # Errors
    /// [Error::InvalidField] if `dst` is out of range.
    pub fn encode_reboot(&self, dst: u8) -> Result<Vec<u8>> {
        self.service(dst, PORT_REBOOT, &REBOOT_MAGIC)
    }

    /// Shutdown shares the reboot port.
    ///
    /// # Errors
    /// [Error::InvalidField] if `dst` is out of range.
    pub fn encode_shutdown(&self, dst: u8) -> Result<Vec<u8>> {
        self.service(dst, PORT_REBOOT, &SHUTDOWN_MAGIC)
    }

    /// # Errors
    /// [Error::InvalidField] if `dst` is out of range.
    pub fn encode_buf_free(&self, dst: u8) -> Result<Vec<u8>> {
        self.service(dst, PORT_BUF_FREE, &[])
    }

    /// # Errors
    /// [Error::InvalidField] if `dst` is out of range.
    pub fn encode_uptime(&self, dst: u8) -> Result<Vec<u8>> {
        self.service(dst, PORT_UPTIME, &[])
    }
}
