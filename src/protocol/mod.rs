//! Bet submission wire protocol.
//!
//! Two sub-protocols share one TCP connection:
//!
//! ## Chunk upload
//!
//! ```text
//! Request:  [len: u16 BE][agency ASCII]';'[record;record;...][flag: u16 BE]
//! Response: [status: u16 BE]            1 = accepted
//! ```
//!
//! `len` counts every byte after itself. `flag` is 1 while more chunks
//! follow and 0 on the last one.
//!
//! ## Winners query
//!
//! ```text
//! Request:  [agency: u16 BE]
//! Response: [ASCII decimal length]';'[document;document;...]
//! ```

pub mod chunk;
pub mod frame;
pub mod record;

pub use chunk::ChunkAccumulator;
pub use frame::{decode_response_code, encode_frame, Continuation, ResponseCode};
pub use record::Bet;

use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Separator between fields, records, and the agency header.
pub const SEPARATOR: u8 = b';';

/// Width of the big-endian frame length prefix.
pub const LENGTH_PREFIX_BYTES: usize = 2;

/// Width of the trailing continuation flag.
pub const FLAG_BYTES: usize = 2;

/// Width of the chunk acknowledgement status.
pub const STATUS_BYTES: usize = 2;

/// Largest payload the length prefix can describe.
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Bytes every chunk frame spends around its records.
pub fn frame_overhead(agency_len: usize) -> usize {
    LENGTH_PREFIX_BYTES + agency_len + 1 + FLAG_BYTES
}

/// Identifier of the submitting agency.
///
/// Sent as ASCII in every chunk header and as a big-endian `u16` when
/// asking for winners, so only decimal ids in `0..=65535` are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgencyId {
    text: String,
    handle: u16,
}

impl AgencyId {
    /// Text form used in chunk headers.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Numeric form used by the winners query.
    pub fn handle(&self) -> u16 {
        self.handle
    }
}

impl FromStr for AgencyId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::InvalidAgencyId(s.to_string()));
        }
        let handle = text
            .parse()
            .map_err(|_| ConfigError::InvalidAgencyId(s.to_string()))?;
        Ok(Self {
            text: text.to_string(),
            handle,
        })
    }
}

impl fmt::Display for AgencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agency_id_parse() {
        let id: AgencyId = "3".parse().unwrap();
        assert_eq!(id.as_str(), "3");
        assert_eq!(id.handle(), 3);

        let id: AgencyId = " 65535 ".parse().unwrap();
        assert_eq!(id.as_str(), "65535");
        assert_eq!(id.handle(), u16::MAX);
    }

    #[test]
    fn test_agency_id_rejects_non_numeric() {
        assert!("".parse::<AgencyId>().is_err());
        assert!("a1".parse::<AgencyId>().is_err());
        assert!("-1".parse::<AgencyId>().is_err());
        assert!("65536".parse::<AgencyId>().is_err());
    }

    #[test]
    fn test_frame_overhead() {
        assert_eq!(frame_overhead(1), 6);
        assert_eq!(frame_overhead(5), 10);
    }
}
