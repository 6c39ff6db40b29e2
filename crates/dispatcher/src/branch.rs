//! Branch - one output of the distributor
//!
//! Either a plain sink behind a [`SinkHandle`] or the bundling remote branch.
//! Both expose the same queue/start/shutdown surface to the session runner.

use tokio::sync::mpsc;

use contracts::{ContractError, SampleItem};

use crate::handle::SinkHandle;
use crate::metrics::SinkReport;
use crate::sinks::RemoteBranch;

pub enum Branch {
    Sink(SinkHandle),
    Remote(RemoteBranch),
}

impl Branch {
    pub fn name(&self) -> &str {
        match self {
            Self::Sink(handle) => handle.name(),
            Self::Remote(branch) => branch.name(),
        }
    }

    /// Input queue to register with the distributor
    pub fn sender(&self) -> mpsc::Sender<SampleItem> {
        match self {
            Self::Sink(handle) => handle.sender(),
            Self::Remote(branch) => branch.sender(),
        }
    }

    /// # Errors
    /// The sink failed to open its destination
    pub async fn wait_started(&mut self) -> Result<(), ContractError> {
        match self {
            Self::Sink(handle) => handle.wait_started().await,
            // nothing to open; uploads fail per bundle
            Self::Remote(_) => Ok(()),
        }
    }

    pub async fn shutdown(self) -> SinkReport {
        match self {
            Self::Sink(handle) => handle.shutdown().await,
            Self::Remote(branch) => branch.shutdown().await,
        }
    }
}

impl From<SinkHandle> for Branch {
    fn from(handle: SinkHandle) -> Self {
        Self::Sink(handle)
    }
}

impl From<RemoteBranch> for Branch {
    fn from(branch: RemoteBranch) -> Self {
        Self::Remote(branch)
    }
}
