//! Chunk frame codec and acknowledgement status.

use crate::error::FrameError;
use crate::protocol::{
    AgencyId, FLAG_BYTES, LENGTH_PREFIX_BYTES, MAX_FRAME_PAYLOAD, SEPARATOR, STATUS_BYTES,
};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Trailing marker telling the aggregator whether more chunks follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Continuation {
    /// This is the terminal chunk.
    Last = 0,
    /// More chunks will follow.
    More = 1,
}

impl Continuation {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Status returned by the aggregator for each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseCode(pub u16);

impl ResponseCode {
    pub const SUCCESS: ResponseCode = ResponseCode(1);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Build a complete chunk frame, length prefix included.
pub fn encode_frame(
    agency: &AgencyId,
    chunk: &[u8],
    continuation: Continuation,
) -> Result<Bytes, FrameError> {
    let agency = agency.as_str().as_bytes();
    let payload_len = agency.len() + 1 + chunk.len() + FLAG_BYTES;
    if payload_len > MAX_FRAME_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            len: payload_len,
            max: MAX_FRAME_PAYLOAD,
        });
    }

    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_BYTES + payload_len);
    frame.put_u16(payload_len as u16);
    frame.extend_from_slice(agency);
    frame.put_u8(SEPARATOR);
    frame.extend_from_slice(chunk);
    frame.put_u16(continuation.as_u16());
    Ok(frame.freeze())
}

/// Interpret an acknowledgement as a big-endian status.
pub fn decode_response_code(bytes: [u8; STATUS_BYTES]) -> ResponseCode {
    ResponseCode(u16::from_be_bytes(bytes))
}

/// Encode a status the way the aggregator sends it.
#[cfg(test)]
pub fn encode_status(code: u16) -> [u8; STATUS_BYTES] {
    code.to_be_bytes()
}
