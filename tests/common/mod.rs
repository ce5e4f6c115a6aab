#![allow(dead_code)]
use std::path::PathBuf;

use spacelab::config::Satellite;
use spacelab::framing::Ax100Mode5;

/// Length of the default AX100 preamble and sync word.
pub const HEADER_LEN: usize = 8 + 4;
/// Length of the Golay length field.
pub const LENGTH_FIELD_LEN: usize = 3;

pub fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/fixtures");
    path.push(name);
    path
}

pub fn satellite() -> Satellite {
    Satellite::from_file(fixture_path("satellite.json")).unwrap()
}

/// A complete AX100 frame with the default preamble and sync word.
pub fn ax100_frame(data: &[u8]) -> Vec<u8> {
    Ax100Mode5::new().encode(data).unwrap()
}

/// XOR `mask` into `frame` at each of `positions`.
pub fn corrupt(frame: &mut [u8], positions: &[usize], mask: u8) {
    for pos in positions {
        frame[*pos] ^= mask;
    }
}
