//! Message-to-speech pipeline
//!
//! Two queues in series: chat events wait in the generation queue for
//! synthesis, finished clips wait in the playback queue for the player.
//! Each queue has at most one active drain. Synthesis is serialized, one
//! message at a time in arrival order. Playback runs on its own tasks and
//! either waits for each clip ([`PlaybackMode::Sequential`]) or lets them
//! overlap ([`PlaybackMode::Detached`]).

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::player::{PlaybackError, PlaybackMode, Player};
use crate::protocol::ChatEvent;
use crate::queue::WorkQueue;
use crate::tts::{clip_duration, clip_path, SynthesisError, SynthesisRequest, Synthesizer};
use crate::voice::{Voice, VoiceAssigner, VoiceCatalog, VoiceError};

/// Failure while turning one message into speech
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// Pipeline behavior fixed at startup
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    /// Language code passed to the synthesizer
    pub language: String,
    /// Directory receiving synthesized clips
    pub output_dir: PathBuf,
    /// Playback strategy
    pub playback_mode: PlaybackMode,
    /// Remove each clip once it has been played
    pub delete_after_playing: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            output_dir: std::env::temp_dir().join("twitch-tts"),
            playback_mode: PlaybackMode::Sequential,
            delete_after_playing: true,
        }
    }
}

/// Shared handle to both queues and their collaborators
#[derive(Clone)]
pub struct Pipeline {
    generation: Arc<WorkQueue<ChatEvent>>,
    playback: Arc<WorkQueue<PathBuf>>,
    catalog: Arc<VoiceCatalog>,
    assigner: Arc<Mutex<VoiceAssigner>>,
    synthesizer: Arc<dyn Synthesizer>,
    player: Arc<dyn Player>,
    settings: Arc<PipelineSettings>,
}

impl Pipeline {
    pub fn new(
        catalog: VoiceCatalog,
        assigner: VoiceAssigner,
        synthesizer: Arc<dyn Synthesizer>,
        player: Arc<dyn Player>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            generation: Arc::new(WorkQueue::new()),
            playback: Arc::new(WorkQueue::new()),
            catalog: Arc::new(catalog),
            assigner: Arc::new(Mutex::new(assigner)),
            synthesizer,
            player,
            settings: Arc::new(settings),
        }
    }

    /// Create the clip directory if needed
    pub async fn prepare(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.settings.output_dir).await
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    /// Append a message to the generation queue without draining
    pub fn enqueue(&self, event: ChatEvent) {
        self.generation.push(event);
    }

    /// Append a finished clip to the playback queue without draining
    pub fn enqueue_playback(&self, path: PathBuf) {
        self.playback.push(path);
    }

    /// Enqueue and kick off a generation drain in the background
    pub fn submit(&self, event: ChatEvent) {
        self.enqueue(event);
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.drain_generation().await });
    }

    /// Speak a bot-originated line with a random voice
    pub fn announce(&self, text: impl Into<String>) {
        self.submit(ChatEvent::announcement(text));
    }

    pub fn generation_len(&self) -> usize {
        self.generation.len()
    }

    pub fn playback_len(&self) -> usize {
        self.playback.len()
    }

    /// Both queues empty and no drain running
    pub fn is_idle(&self) -> bool {
        self.generation.is_empty()
            && self.playback.is_empty()
            && !self.generation.is_draining()
            && !self.playback.is_draining()
    }

    /// Synthesize queued messages in order until the queue is empty.
    ///
    /// Returns immediately if another drain is already running; that drain
    /// picks up anything enqueued meanwhile.
    pub async fn drain_generation(&self) {
        loop {
            let Some(guard) = self.generation.try_begin_drain() else {
                return;
            };
            while let Some(event) = self.generation.pop() {
                match self.synthesize(&event).await {
                    Ok(path) => {
                        self.playback.push(path);
                        let pipeline = self.clone();
                        tokio::spawn(async move { pipeline.drain_playback().await });
                    }
                    Err(err) => {
                        error!(username = %event.username, error = %err, "dropping message");
                    }
                }
            }
            drop(guard);

            // an item pushed between the last pop and the release has no drain yet
            if self.generation.is_empty() {
                return;
            }
        }
    }

    /// Play queued clips in order until the queue is empty.
    ///
    /// Same single-drain rule as [`Pipeline::drain_generation`].
    pub async fn drain_playback(&self) {
        loop {
            let Some(guard) = self.playback.try_begin_drain() else {
                return;
            };
            while let Some(path) = self.playback.pop() {
                let task = tokio::spawn(play_clip(
                    self.player.clone(),
                    path,
                    self.settings.delete_after_playing,
                ));
                if self.settings.playback_mode == PlaybackMode::Sequential {
                    if let Err(err) = task.await {
                        error!(error = %err, "playback task panicked");
                    }
                }
            }
            drop(guard);

            if self.playback.is_empty() {
                return;
            }
        }
    }

    /// Synthesize and play one event right away, bypassing both queues
    pub async fn speak(&self, event: &ChatEvent) -> Result<(), PipelineError> {
        let path = self.synthesize(event).await?;
        let played = self.player.play(&path).await;
        if self.settings.delete_after_playing {
            remove_clip(&path).await;
        }
        Ok(played?)
    }

    /// Voice for `username`, assigning one on first sight
    pub fn resolve_voice(&self, username: &str) -> Result<Voice, VoiceError> {
        let mut assigner = self
            .assigner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let voice = assigner.resolve(username, &self.catalog, &mut rand::rng())?;
        Ok(voice.clone())
    }

    async fn synthesize(&self, event: &ChatEvent) -> Result<PathBuf, PipelineError> {
        let voice = self.resolve_voice(&event.username)?;
        let request = SynthesisRequest::new(
            &event.content,
            &voice.file_path,
            &self.settings.language,
            clip_path(&self.settings.output_dir, &event.username),
        );

        let start = Instant::now();
        let path = self.synthesizer.synthesize(request).await?;
        info!(
            username = %event.username,
            voice = %voice.name,
            synthesizer = self.synthesizer.name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "synthesized message"
        );
        if let Some(secs) = clip_duration(&path) {
            debug!(path = %path.display(), duration_secs = secs, "clip ready");
        }
        Ok(path)
    }
}

async fn play_clip(player: Arc<dyn Player>, path: PathBuf, delete_after: bool) {
    if let Err(err) = player.play(&path).await {
        error!(path = %path.display(), error = %err, "playback failed");
    }
    if delete_after {
        remove_clip(&path).await;
    }
}

async fn remove_clip(path: &std::path::Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %err, "failed to delete clip");
    }
}
