//! Audio playback collaborator
//!
//! Clips are played by an external player process, `ffplay` by default,
//! invoked headless so it exits when the clip ends.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("player exited with {0}")]
    Failed(String),
}

/// How the playback drain treats each clip, fixed at startup
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    /// Wait for every clip to finish before starting the next
    #[default]
    Sequential,
    /// Start clips as soon as they are ready; they may overlap
    Detached,
}

impl PlaybackMode {
    pub fn from_wait_for_completion(wait: bool) -> Self {
        if wait {
            PlaybackMode::Sequential
        } else {
            PlaybackMode::Detached
        }
    }
}

#[async_trait]
pub trait Player: Send + Sync {
    /// Play the clip, returning once playback has finished
    async fn play(&self, path: &Path) -> Result<(), PlaybackError>;
}

/// Plays clips through `ffplay` (or a compatible program)
#[derive(Clone, Debug)]
pub struct FfplayPlayer {
    program: String,
    volume: f32,
}

impl FfplayPlayer {
    pub fn new(program: impl Into<String>, volume: f32) -> Self {
        Self {
            program: program.into(),
            volume,
        }
    }

    pub fn args(&self, path: &Path) -> Vec<String> {
        vec![
            "-nodisp".to_string(),
            "-autoexit".to_string(),
            path.to_string_lossy().into_owned(),
            "-af".to_string(),
            format!("volume={}", self.volume),
        ]
    }
}

#[async_trait]
impl Player for FfplayPlayer {
    async fn play(&self, path: &Path) -> Result<(), PlaybackError> {
        debug!(path = %path.display(), volume = self.volume, "playing clip");
        let status = Command::new(&self.program)
            .args(self.args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| PlaybackError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(PlaybackError::Failed(status.to_string()));
        }
        Ok(())
    }
}
