//! Forward error correction codecs.
pub mod golay;
pub mod reed_solomon;
