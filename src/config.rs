//! Satellite and radio link configuration.
//!
//! Satellites are described by JSON files such as:
//! ```json
//! {
//!   "name": "FloripaSat-1",
//!   "links": [
//!     {
//!       "id": "beacon",
//!       "name": "Beacon",
//!       "direction": "down",
//!       "frequency": 145900000,
//!       "modulation": "GFSK",
//!       "baudrate": 1200,
//!       "preamble": [170, 170, 170, 170],
//!       "sync_word": [93, 230, 42, 126],
//!       "protocol_link": "NGHam",
//!       "protocol_network": ""
//!     }
//!   ]
//! }
//! ```
use std::{collections::HashSet, fmt::Display, fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Deserializer, Serialize};

use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl TryFrom<String> for Direction {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            _ => Err(Error::Config(format!(
                "link direction must be \"up\" or \"down\", got {value:?}"
            ))),
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}

/// Link layer protocol of a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LinkProtocol {
    Ax100Mode5,
    NgHam,
    Other(String),
}

impl From<String> for LinkProtocol {
    fn from(value: String) -> Self {
        match value.as_str() {
            "AX100-Mode5" | "AX100" => LinkProtocol::Ax100Mode5,
            "NGHam" => LinkProtocol::NgHam,
            _ => LinkProtocol::Other(value),
        }
    }
}

impl From<LinkProtocol> for String {
    fn from(value: LinkProtocol) -> Self {
        value.to_string()
    }
}

impl Display for LinkProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkProtocol::Ax100Mode5 => f.write_str("AX100-Mode5"),
            LinkProtocol::NgHam => f.write_str("NGHam"),
            LinkProtocol::Other(name) => f.write_str(name),
        }
    }
}

/// Network layer protocol carried inside link frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NetworkProtocol {
    Csp,
    None,
    Other(String),
}

impl From<String> for NetworkProtocol {
    fn from(value: String) -> Self {
        match value.as_str() {
            "CSP" => NetworkProtocol::Csp,
            "" | "none" => NetworkProtocol::None,
            _ => NetworkProtocol::Other(value),
        }
    }
}

impl From<NetworkProtocol> for String {
    fn from(value: NetworkProtocol) -> Self {
        value.to_string()
    }
}

impl Display for NetworkProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkProtocol::Csp => f.write_str("CSP"),
            NetworkProtocol::None => f.write_str("none"),
            NetworkProtocol::Other(name) => f.write_str(name),
        }
    }
}

fn deserialize_frequency<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Frequency {
        Number(u64),
        Text(String),
    }

    match Frequency::deserialize(deserializer)? {
        Frequency::Number(hz) => Ok(hz),
        Frequency::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid frequency {text:?}"))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub name: String,
    pub direction: Direction,
    /// Carrier frequency in Hz.
    #[serde(deserialize_with = "deserialize_frequency")]
    pub frequency: u64,
    pub modulation: String,
    /// Symbol rate in baud.
    pub baudrate: u32,
    pub preamble: Vec<u8>,
    pub sync_word: Vec<u8>,
    pub protocol_link: LinkProtocol,
    pub protocol_network: NetworkProtocol,
}

impl Link {
    fn validate(&self) -> Result<()> {
        if self.sync_word.is_empty() {
            return Err(Error::Config(format!("link {}: empty sync word", self.id)));
        }
        if self.baudrate == 0 {
            return Err(Error::Config(format!("link {}: baudrate must be > 0", self.id)));
        }
        Ok(())
    }
}

impl Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Direction: {}", self.direction)?;
        writeln!(f, "Frequency: {}", self.frequency)?;
        writeln!(f, "Modulation: {}", self.modulation)?;
        writeln!(f, "Baudrate: {}", self.baudrate)?;
        writeln!(f, "Preamble: {:?}", self.preamble)?;
        writeln!(f, "Sync. Word: {:?}", self.sync_word)?;
        writeln!(f, "Link protocol: {}", self.protocol_link)?;
        writeln!(f, "Network protocol: {}", self.protocol_network)
    }
}

/// A satellite and its radio links.
///
/// # Example
/// ```
/// use spacelab::config::Satellite;
///
/// let sat = Satellite::from_json(r#"{
///   "name": "demo",
///   "links": [{
///     "id": "down", "name": "Downlink", "direction": "down", "frequency": "437000000",
///     "modulation": "GFSK", "baudrate": 1200, "preamble": [170], "sync_word": [147, 11, 81, 222],
///     "protocol_link": "AX100-Mode5", "protocol_network": "CSP"
///   }]
/// }"#).unwrap();
/// assert_eq!(sat.link("down").unwrap().frequency, 437_000_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Satellite {
    pub name: String,
    pub links: Vec<Link>,
}

impl Satellite {
    /// Load and validate a satellite from a JSON file.
    ///
    /// # Errors
    /// [Error::Io] if the file cannot be read, [Error::Json] if it is not a valid satellite
    /// document, or [Error::Config] if validation fails.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let sat: Satellite = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        sat.validate()?;
        Ok(sat)
    }

    /// Parse and validate a satellite from a JSON string.
    ///
    /// # Errors
    /// [Error::Json] if it is not a valid satellite document, or [Error::Config] if
    /// validation fails.
    pub fn from_json(json: &str) -> Result<Self> {
        let sat: Satellite = serde_json::from_str(json)?;
        sat.validate()?;
        Ok(sat)
    }

    /// Check the satellite has a name and at least one link, that link ids are unique and
    /// that every link is usable.
    ///
    /// # Errors
    /// [Error::Config] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("satellite name is empty".to_string()));
        }
        if self.links.is_empty() {
            return Err(Error::Config(format!("satellite {} has no links", self.name)));
        }
        let mut ids = HashSet::new();
        for link in &self.links {
            if !ids.insert(link.id.as_str()) {
                return Err(Error::Config(format!("duplicate link id {}", link.id)));
            }
            link.validate()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn link(&self, id: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.id == id)
    }

    pub fn downlinks(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(|l| l.direction == Direction::Down)
    }
}

impl Display for Satellite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Satellite: {}", self.name)?;
        writeln!(f, "Links:")?;
        for link in &self.links {
            write!(f, "{link}")?;
        }
        Ok(())
    }
}
