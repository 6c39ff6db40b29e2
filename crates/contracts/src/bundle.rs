//! Bundle - Bundler 输出
//!
//! 发送到远端服务的样本批次，以及其 protobuf 编码。

use std::sync::Arc;

use prost::Message;

use crate::{ContractError, Sample};

/// Closed, ordered batch of samples
///
/// Never empty. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    samples: Vec<Arc<Sample>>,
}

impl Bundle {
    /// Close a bundle; `None` if `samples` is empty
    pub fn new(samples: Vec<Arc<Sample>>) -> Option<Self> {
        if samples.is_empty() {
            None
        } else {
            Some(Self { samples })
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Arc<Sample>] {
        &self.samples
    }

    /// Canonical wire encoding (protobuf `GazeBundle`)
    pub fn encode(&self) -> Vec<u8> {
        self.to_message().encode_to_vec()
    }

    /// Decode a payload produced by [`Bundle::encode`]
    pub fn decode(payload: &[u8]) -> Result<GazeBundleMessage, ContractError> {
        GazeBundleMessage::decode(payload)
            .map_err(|e| ContractError::wire_format(format!("bundle decode error: {e}")))
    }

    fn to_message(&self) -> GazeBundleMessage {
        GazeBundleMessage {
            samples: self.samples.iter().map(|s| GazeSampleMessage::from(s.as_ref())).collect(),
        }
    }
}

/// `message GazeBundle { repeated GazeSample samples = 1; }`
#[derive(Clone, PartialEq, Message)]
pub struct GazeBundleMessage {
    #[prost(message, repeated, tag = "1")]
    pub samples: Vec<GazeSampleMessage>,
}

/// `message GazeSample`
#[derive(Clone, PartialEq, Message)]
pub struct GazeSampleMessage {
    #[prost(int64, tag = "1")]
    pub device_timestamp_us: i64,

    #[prost(int64, tag = "2")]
    pub system_timestamp_us: i64,

    #[prost(message, optional, tag = "3")]
    pub left_eye: Option<EyePointMessage>,

    #[prost(message, optional, tag = "4")]
    pub right_eye: Option<EyePointMessage>,
}

/// `message EyePoint { float x = 1; float y = 2; }`
#[derive(Clone, PartialEq, Message)]
pub struct EyePointMessage {
    #[prost(float, tag = "1")]
    pub x: f32,

    #[prost(float, tag = "2")]
    pub y: f32,
}

impl From<&Sample> for GazeSampleMessage {
    fn from(sample: &Sample) -> Self {
        let eye = |point: Option<(f32, f32)>| point.map(|(x, y)| EyePointMessage { x, y });
        Self {
            device_timestamp_us: sample.device_timestamp_us,
            system_timestamp_us: sample.system_timestamp_us,
            left_eye: eye(sample.left.gaze_point()),
            right_eye: eye(sample.right.gaze_point()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EyeSample;

    #[test]
    fn test_empty_bundle_rejected() {
        assert!(Bundle::new(Vec::new()).is_none());
    }

    #[test]
    fn test_encode_preserves_order_and_absent_eyes() {
        let s0 = Sample::new(0, 100, 1_000).with_eyes(EyeSample::with_gaze(0.25, 0.5), EyeSample::default());
        let s1 = Sample::new(0, 200, 2_000).with_eyes(EyeSample::default(), EyeSample::with_gaze(0.75, 0.5));
        let bundle = Bundle::new(vec![Arc::new(s0), Arc::new(s1)]).unwrap();

        let message = Bundle::decode(&bundle.encode()).unwrap();
        assert_eq!(message.samples.len(), 2);
        assert_eq!(message.samples[0].device_timestamp_us, 100);
        assert_eq!(message.samples[0].left_eye, Some(EyePointMessage { x: 0.25, y: 0.5 }));
        assert_eq!(message.samples[0].right_eye, None);
        assert_eq!(message.samples[1].system_timestamp_us, 2_000);
        assert_eq!(message.samples[1].left_eye, None);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = Bundle::decode(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, ContractError::WireFormat { .. }));
    }
}
