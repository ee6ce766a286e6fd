//! CAN frame models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Highest 11-bit (standard) arbitration id
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Highest 29-bit (extended) arbitration id
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Payload limit of a classic CAN 2.0 frame
pub const CLASSIC_MAX_PAYLOAD: usize = 8;

/// Arbitration id, payload and id format of a frame
///
/// Used both as the request handed to `send` and as what a transport
/// hands back from `receive`. The id range is checked on construction;
/// the payload length is checked against the active transport later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameData {
    arbitration_id: u32,
    payload: Vec<u8>,
    is_extended_id: bool,
}

impl FrameData {
    pub fn new(
        arbitration_id: u32,
        payload: impl Into<Vec<u8>>,
        is_extended_id: bool,
    ) -> Result<Self, ValidationError> {
        let max = if is_extended_id {
            MAX_EXTENDED_ID
        } else {
            MAX_STANDARD_ID
        };
        if arbitration_id > max {
            return Err(ValidationError::IdOutOfRange {
                id: arbitration_id,
                extended: is_extended_id,
            });
        }
        Ok(Self {
            arbitration_id,
            payload: payload.into(),
            is_extended_id,
        })
    }

    /// Frame carrying the UTF-8 bytes of a text message
    pub fn from_text(
        arbitration_id: u32,
        text: &str,
        is_extended_id: bool,
    ) -> Result<Self, ValidationError> {
        Self::new(arbitration_id, text.as_bytes(), is_extended_id)
    }

    /// Frame whose payload is given as hex (`"01 02 FF"` or `"0102ff"`)
    pub fn from_hex(
        arbitration_id: u32,
        hex_payload: &str,
        is_extended_id: bool,
    ) -> Result<Self, ValidationError> {
        let payload = parse_hex_payload(hex_payload)?;
        Self::new(arbitration_id, payload, is_extended_id)
    }

    pub fn arbitration_id(&self) -> u32 {
        self.arbitration_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_extended_id(&self) -> bool {
        self.is_extended_id
    }
}

/// Parse a hex payload, ignoring whitespace, `:` and `.` separators
pub fn parse_hex_payload(s: &str) -> Result<Vec<u8>, ValidationError> {
    let cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '.')
        .collect();
    let cleaned = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
        .unwrap_or(cleaned.as_str());
    hex::decode(cleaned).map_err(|e| ValidationError::InvalidPayload(e.to_string()))
}

/// Parse an arbitration id (decimal, or hex with `0x` prefix)
pub fn parse_arbitration_id(s: &str) -> Result<u32, ValidationError> {
    let s = s.trim();
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(rest) => (rest, 16),
        None => (s, 10),
    };
    u32::from_str_radix(digits, radix)
        .map_err(|e| ValidationError::InvalidPayload(format!("Invalid arbitration id '{}': {}", s, e)))
}

/// Whether a frame was sent by this session or received from the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Sent => f.write_str("sent"),
            Direction::Received => f.write_str("received"),
        }
    }
}

/// A frame observed by the session, stamped with direction and time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(flatten)]
    data: FrameData,
    direction: Direction,
    timestamp: DateTime<Utc>,
}

impl Frame {
    /// Stamp frame data with a direction and the current time
    pub fn new(data: FrameData, direction: Direction) -> Self {
        Self {
            data,
            direction,
            timestamp: Utc::now(),
        }
    }

    pub fn data(&self) -> &FrameData {
        &self.data
    }

    pub fn arbitration_id(&self) -> u32 {
        self.data.arbitration_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.data.payload
    }

    pub fn is_extended_id(&self) -> bool {
        self.data.is_extended_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for FrameData {
    /// candump-style rendering: `123 [3] 01 02 FF`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_extended_id {
            write!(f, "{:08X}", self.arbitration_id)?;
        } else {
            write!(f, "{:03X}", self.arbitration_id)?;
        }
        write!(f, " [{}]", self.payload.len())?;
        for byte in &self.payload {
            write!(f, " {:02X}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.direction, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_standard_id_range() {
        assert!(FrameData::new(0x7FF, vec![], false).is_ok());
        assert_eq!(
            FrameData::new(0x800, vec![], false),
            Err(ValidationError::IdOutOfRange {
                id: 0x800,
                extended: false
            })
        );
        assert!(FrameData::new(0x800, vec![], true).is_ok());
        assert!(FrameData::new(0x2000_0000, vec![], true).is_err());
    }

    #[test]
    fn test_from_text_uses_utf8_bytes() {
        let data = FrameData::from_text(0x123, "hi", false).unwrap();
        assert_eq!(data.payload(), b"hi");
    }

    #[test]
    fn test_hex_payload_forms() {
        assert_eq!(parse_hex_payload("01 02 ff").unwrap(), vec![0x01, 0x02, 0xFF]);
        assert_eq!(parse_hex_payload("0102FF").unwrap(), vec![0x01, 0x02, 0xFF]);
        assert_eq!(parse_hex_payload("de:ad").unwrap(), vec![0xDE, 0xAD]);
        assert_eq!(parse_hex_payload("").unwrap(), Vec::<u8>::new());
        assert!(matches!(
            parse_hex_payload("abc"),
            Err(ValidationError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_parse_arbitration_id() {
        assert_eq!(parse_arbitration_id("0x123").unwrap(), 0x123);
        assert_eq!(parse_arbitration_id("291").unwrap(), 291);
        assert!(parse_arbitration_id("0xZZ").is_err());
    }

    #[test]
    fn test_frame_display() {
        let standard = Frame::new(
            FrameData::new(0x123, vec![0x01, 0x02, 0xFF], false).unwrap(),
            Direction::Sent,
        );
        assert_eq!(standard.to_string(), "sent 123 [3] 01 02 FF");

        let ext = Frame::new(
            FrameData::new(0x18DAF110, vec![], true).unwrap(),
            Direction::Received,
        );
        assert_eq!(ext.to_string(), "received 18DAF110 [0]");
    }

    #[test]
    fn test_frame_serializes_flat() {
        let frame = Frame::new(
            FrameData::new(0x42, vec![7], false).unwrap(),
            Direction::Received,
        );
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["arbitration_id"], 0x42);
        assert_eq!(json["direction"], "received");
        assert!(json["timestamp"].is_string());
    }
}
