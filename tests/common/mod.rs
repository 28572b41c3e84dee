//! Shared helpers for integration tests.
//!
//! Synthesizer and player doubles record what they were asked to do so tests
//! can check ordering without spawning real audio tools.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use twitch_tts::{
    PlaybackError, PlaybackMode, Pipeline, PipelineSettings, Player, SynthesisError,
    SynthesisRequest, Synthesizer, VoiceAssigner, VoiceAssignment, VoiceCatalog,
};

/// One finished synthesis call
#[derive(Clone, Debug)]
pub struct SynthCall {
    pub text: String,
    pub voice: PathBuf,
    pub output: PathBuf,
}

/// Synthesizer that writes an empty clip after an optional per-text delay
#[derive(Default)]
pub struct ScriptedSynth {
    delays: HashMap<String, Duration>,
    failures: HashSet<String>,
    gate: Option<Arc<Semaphore>>,
    started: AtomicUsize,
    calls: Mutex<Vec<SynthCall>>,
}

impl ScriptedSynth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.failures.insert(text.to_string());
        self
    }

    /// Every call waits for one permit from `gate`
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<SynthCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.text).collect()
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynth {
    async fn synthesize(&self, req: SynthesisRequest) -> Result<PathBuf, SynthesisError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(delay) = self.delays.get(&req.text) {
            tokio::time::sleep(*delay).await;
        }
        if self.failures.contains(&req.text) {
            return Err(SynthesisError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "scripted failure".to_string(),
            });
        }

        tokio::fs::write(&req.output, b"").await.unwrap();
        self.calls.lock().unwrap().push(SynthCall {
            text: req.text,
            voice: req.voice_path,
            output: req.output.clone(),
        });
        Ok(req.output)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Player that sleeps for a fixed time and tracks overlap
#[derive(Default)]
pub struct RecordingPlayer {
    duration: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    started: Mutex<Vec<PathBuf>>,
    finished: AtomicUsize,
}

impl RecordingPlayer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            ..Default::default()
        }
    }

    pub fn started(&self) -> Vec<PathBuf> {
        self.started.lock().unwrap().clone()
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Player for RecordingPlayer {
    async fn play(&self, path: &Path) -> Result<(), PlaybackError> {
        self.started.lock().unwrap().push(path.to_path_buf());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.duration).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Temporary directory holding empty voice samples with the given file names
pub fn voice_dir(files: &[&str]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for file in files {
        std::fs::write(dir.path().join(file), b"").unwrap();
    }
    dir
}

/// Everything a pipeline test needs to keep alive
pub struct Harness {
    pub pipeline: Pipeline,
    pub synth: Arc<ScriptedSynth>,
    pub player: Arc<RecordingPlayer>,
    pub voices: TempDir,
    pub output: TempDir,
}

pub async fn harness(
    synth: ScriptedSynth,
    player: RecordingPlayer,
    mode: PlaybackMode,
    delete_after_playing: bool,
    assignments: Vec<VoiceAssignment>,
) -> Harness {
    let voices = voice_dir(&["alpha.wav", "beta.wav", "gamma.wav"]);
    let output = tempfile::tempdir().unwrap();
    let synth = Arc::new(synth);
    let player = Arc::new(player);

    let pipeline = Pipeline::new(
        VoiceCatalog::load(voices.path()).unwrap(),
        VoiceAssigner::new(assignments),
        synth.clone(),
        player.clone(),
        PipelineSettings {
            language: "en".to_string(),
            output_dir: output.path().join("clips"),
            playback_mode: mode,
            delete_after_playing,
        },
    );
    pipeline.prepare().await.unwrap();

    Harness {
        pipeline,
        synth,
        player,
        voices,
        output,
    }
}

/// Poll until `done` holds, failing after a few seconds
pub async fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
