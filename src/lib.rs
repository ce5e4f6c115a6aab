#![doc = include_str!("../README.md")]

mod error;
mod prelude;

pub mod config;
pub mod csp;
pub mod fec;
pub mod framing;
pub mod pipeline;

pub use error::{Error, Result};
