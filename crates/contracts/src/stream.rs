//! StreamItem - queue element shared by every pipeline stage
//!
//! Termination is an explicit variant so that every consumer has to handle it.

use std::sync::Arc;

use crate::{Bundle, Sample};

/// Element carried by pipeline queues
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem<T> {
    /// Payload
    Data(T),

    /// End of stream; nothing follows it
    EndOfStream,
}

impl<T> StreamItem<T> {
    /// Whether this is the termination marker
    pub fn is_end(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }

    /// Payload, if any
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Data(data) => Some(data),
            Self::EndOfStream => None,
        }
    }
}

impl<T> From<T> for StreamItem<T> {
    fn from(data: T) -> Self {
        Self::Data(data)
    }
}

/// Raw sample stream element
pub type SampleItem = StreamItem<Arc<Sample>>;

/// Bundle stream element (Bundler -> RemoteSink)
pub type BundleItem = StreamItem<Bundle>;
