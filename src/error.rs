//! Error types for the agency client.
//!
//! Only transport failures and protocol rejections end a session; the rest
//! are raised before any byte reaches the wire (bad input, bad config).

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error for a bet submission session.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Read or write on the connection failed. The connection is closed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The aggregator answered a chunk with a non-success status.
    #[error("chunk {chunk} rejected by aggregator with code {code}")]
    Rejected { chunk: u64, code: u16 },

    /// A single encoded record does not fit in an empty chunk.
    #[error("record of {size} bytes does not fit a chunk budget of {budget} bytes")]
    RecordTooLarge { size: usize, budget: usize },

    /// Frame could not be built.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// Operation issued after the session reached its terminal state.
    #[error("session already finished")]
    SessionFinished,

    /// Winners were requested before the final chunk was acknowledged.
    #[error("winners query requires an acknowledged end of stream")]
    StreamNotEnded,

    /// Bets could not be read from their source.
    #[error("bet source error: {0}")]
    BetSource(#[from] BetSourceError),
}

/// Record codec errors.
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    /// A text field contains the field separator or a line break.
    #[error("field '{field}' contains a reserved character: {value:?}")]
    ReservedCharacter { field: &'static str, value: String },

    /// A text field is empty.
    #[error("field '{0}' is empty")]
    EmptyField(&'static str),

    /// Birthdate is not an ISO `YYYY-MM-DD` date.
    #[error("invalid birthdate {0:?}")]
    InvalidBirthdate(String),

    /// Numeric field could not be parsed.
    #[error("invalid number in field '{field}': {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    /// Encoded record has the wrong number of fields.
    #[error("expected 5 fields, got {0}")]
    FieldCount(usize),

    /// Encoded record is not valid UTF-8.
    #[error("record is not valid UTF-8")]
    InvalidUtf8,
}

/// Frame codec errors.
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    /// Payload length does not fit the 2-byte length field.
    #[error("frame payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },
}

/// Reliable transport errors. All of them are fatal for the connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was already closed.
    #[error("connection closed")]
    Closed,

    /// Length header of a delimited reply is not a decimal number.
    #[error("invalid length header {0:?}")]
    InvalidLength(String),

    /// No delimiter seen within the maximum length header size.
    #[error("length header exceeds {0} bytes without a delimiter")]
    LengthHeaderTooLong(usize),

    /// Peer sent more bytes than the declared payload.
    #[error("{0} unexpected bytes after the declared payload")]
    TrailingBytes(usize),
}

/// Bet source errors.
#[derive(Debug, Error)]
pub enum BetSourceError {
    #[error("failed to open bets file '{}': {source}", path.display())]
    Open { path: PathBuf, source: csv::Error },

    #[error("malformed bet at line {line}: {source}")]
    Csv { line: u64, source: csv::Error },

    #[error("invalid bet at line {line}: {source}")]
    Record { line: u64, source: RecordError },

    #[error("missing environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid bet in environment: {0}")]
    Env(RecordError),
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("agency id is required (--id, CLI_ID or [client] id)")]
    MissingAgencyId,

    #[error("agency id must be a number between 0 and 65535, got {0:?}")]
    InvalidAgencyId(String),

    #[error("chunk budget of {budget} bytes cannot hold a record (minimum {min})")]
    ChunkBudgetTooSmall { budget: usize, min: usize },

    #[error("chunk budget of {budget} bytes exceeds the frame limit of {max}")]
    ChunkBudgetTooLarge { budget: usize, max: usize },

    #[error("maximum segment size must be greater than zero")]
    ZeroSegmentSize,

    #[error("maximum segment size {size} exceeds the largest frame ({max} bytes)")]
    SegmentSizeTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, ClientError>;
