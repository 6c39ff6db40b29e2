//! SessionManager - participant context and recording toggles
//!
//! Recordings go to `data_dir/<participant>`; each recording gets a fresh
//! runner (and so fresh sinks and files).

use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use contracts::SessionBlueprint;

use crate::error::SessionError;
use crate::factory::{SimulatedSourceFactory, SourceFactory};
use crate::report::SessionReport;
use crate::runner::Runner;

pub struct SessionManager<F = SimulatedSourceFactory> {
    blueprint: SessionBlueprint,
    factory: F,
    participant: Option<String>,
    runner: Option<Runner<F>>,
}

impl<F: SourceFactory + Clone> SessionManager<F> {
    pub fn new(blueprint: SessionBlueprint, factory: F) -> Self {
        Self {
            blueprint,
            factory,
            participant: None,
            runner: None,
        }
    }

    pub fn blueprint(&self) -> &SessionBlueprint {
        &self.blueprint
    }

    pub fn participant_id(&self) -> Option<&str> {
        self.participant.as_deref()
    }

    pub fn participant_dir(&self) -> Option<PathBuf> {
        self.participant
            .as_ref()
            .map(|id| self.blueprint.data_dir.join(id))
    }

    pub fn is_recording(&self) -> bool {
        self.runner.as_ref().is_some_and(Runner::is_running)
    }

    /// Current runner, if a recording is active
    pub fn runner(&self) -> Option<&Runner<F>> {
        self.runner.as_ref()
    }

    /// Select the participant and create their directory
    ///
    /// # Errors
    /// While recording, or for an empty id or one containing path separators
    pub fn set_participant(&mut self, id: &str) -> Result<PathBuf, SessionError> {
        if self.is_recording() {
            return Err(SessionError::InvalidState {
                operation: "changing participant",
                state: "recording",
            });
        }

        let id = id.trim();
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
            return Err(SessionError::InvalidParticipant(id.to_string()));
        }

        let dir = self.blueprint.data_dir.join(id);
        fs::create_dir_all(&dir)?;
        info!(participant = %id, dir = %dir.display(), "Participant set");
        self.participant = Some(id.to_string());
        Ok(dir)
    }

    /// Start a new recording for the current participant
    ///
    /// A no-op (with a warning) if already recording.
    ///
    /// # Errors
    /// No participant, or the session failed to start
    pub async fn start_recording(&mut self) -> Result<(), SessionError> {
        if self.is_recording() {
            warn!("Recording already in progress");
            return Ok(());
        }
        let dir = self.participant_dir().ok_or(SessionError::NoParticipant)?;

        let mut runner = Runner::new(self.blueprint.clone(), dir, self.factory.clone());
        runner.start().await?;
        self.runner = Some(runner);
        Ok(())
    }

    /// Stop the current recording; `None` if nothing was recording
    pub async fn stop_recording(&mut self) -> Result<Option<SessionReport>, SessionError> {
        match self.runner.take() {
            Some(mut runner) => runner.stop().await,
            None => Ok(None),
        }
    }
}
