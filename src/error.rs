#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Golay syndrome search exhausted; more than 3 bit errors.
    #[error("Golay codeword is uncorrectable")]
    UncorrectableGolay,

    #[error("Reed-Solomon codeword is uncorrectable: {0}")]
    UncorrectableReedSolomon(String),

    #[error("CSP header too short: got {actual} bytes, need {minimum}")]
    HeaderTooShort { actual: usize, minimum: usize },

    /// A fragment arrived out of order; the reassembly buffer was dropped.
    #[error("CSP fragment sequence lost (expected seq {expected_seq:?}, got seq {seq} index {index})")]
    FragmentSequenceLost {
        expected_seq: Option<u16>,
        seq: u16,
        index: u16,
    },

    /// No valid frame completed within `limit` bytes after a sync match.
    #[error("Frame overrun after {limit} bytes")]
    FrameOverrun { limit: usize },

    #[error("Invalid length: {0}")]
    InvalidLength(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidField { field: &'static str, value: u32 },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("CSP HMAC verification failed")]
    HmacMismatch,

    #[error("CSP CRC32 verification failed")]
    CrcMismatch,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
