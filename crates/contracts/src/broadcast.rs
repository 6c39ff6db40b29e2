//! Broadcast wire format
//!
//! ```text
//! | topic "gaze" (4) | epoch ms i64 (8) | x px i32 (4) | y px i32 (4) | valid u8 (1) |
//! ```
//!
//! All integers big-endian. Subscribers rely on this layout bit-for-bit.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{ContractError, Sample};

/// Topic prefix of every broadcast message
pub const BROADCAST_TOPIC: &[u8; 4] = b"gaze";

/// Record size without the topic
pub const BROADCAST_RECORD_LEN: usize = 17;

/// Coordinate sent for an invalid midpoint
pub const INVALID_COORDINATE: i32 = -1;

/// Decoded broadcast record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastRecord {
    pub epoch_timestamp_ms: i64,
    pub x_px: i32,
    pub y_px: i32,
    pub valid: bool,
}

impl BroadcastRecord {
    /// Valid only if both midpoint pixel fields are present
    pub fn from_sample(sample: &Sample) -> Self {
        match sample.midpoint_px() {
            Some((x_px, y_px)) => Self {
                epoch_timestamp_ms: sample.epoch_timestamp_ms,
                x_px,
                y_px,
                valid: true,
            },
            None => Self {
                epoch_timestamp_ms: sample.epoch_timestamp_ms,
                x_px: INVALID_COORDINATE,
                y_px: INVALID_COORDINATE,
                valid: false,
            },
        }
    }

    /// Topic followed by the 17-byte record
    pub fn pack(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(BROADCAST_TOPIC.len() + BROADCAST_RECORD_LEN);
        buf.put_slice(BROADCAST_TOPIC);
        buf.put_i64(self.epoch_timestamp_ms);
        buf.put_i32(self.x_px);
        buf.put_i32(self.y_px);
        buf.put_u8(u8::from(self.valid));
        buf.freeze()
    }

    /// Parse a full message (topic included)
    pub fn unpack(message: &[u8]) -> Result<Self, ContractError> {
        let expected = BROADCAST_TOPIC.len() + BROADCAST_RECORD_LEN;
        if message.len() != expected {
            return Err(ContractError::wire_format(format!(
                "broadcast message must be {expected} bytes, got {}",
                message.len()
            )));
        }

        let (topic, mut record) = message.split_at(BROADCAST_TOPIC.len());
        if topic != BROADCAST_TOPIC {
            return Err(ContractError::wire_format(format!(
                "unexpected broadcast topic {topic:?}"
            )));
        }

        Ok(Self {
            epoch_timestamp_ms: record.get_i64(),
            x_px: record.get_i32(),
            y_px: record.get_i32(),
            valid: record.get_u8() != 0,
        })
    }
}
