//! Speech synthesis collaborator
//!
//! Synthesis is delegated to an external voice-cloning program. The bot
//! hands it the text, a reference clip and a language code and expects an
//! audio file at the requested path. The program is described by an argv
//! template whose placeholders are filled per request.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during synthesis
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("synthesizer command is empty")]
    EmptyCommand,

    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("synthesizer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("synthesizer produced no file at {0}")]
    MissingOutput(PathBuf),
}

// =============================================================================
// Request Types
// =============================================================================

/// Placeholder replaced by the text to speak
pub const TEXT_PLACEHOLDER: &str = "{text}";
/// Placeholder replaced by the reference clip path
pub const VOICE_PLACEHOLDER: &str = "{voice}";
/// Placeholder replaced by the language code
pub const LANGUAGE_PLACEHOLDER: &str = "{language}";
/// Placeholder replaced by the output path
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// One synthesis job
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesisRequest {
    /// Text to speak
    pub text: String,
    /// Reference clip of the voice to clone
    pub voice_path: PathBuf,
    /// Language code, e.g. "en"
    pub language: String,
    /// Where the audio file must be written
    pub output: PathBuf,
}

impl SynthesisRequest {
    pub fn new(
        text: impl Into<String>,
        voice_path: impl Into<PathBuf>,
        language: impl Into<String>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            text: text.into(),
            voice_path: voice_path.into(),
            language: language.into(),
            output: output.into(),
        }
    }
}

// =============================================================================
// Synthesizer Trait
// =============================================================================

/// Anything that can turn text into an audio file
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `req.text` and return the path of the written file
    async fn synthesize(&self, req: SynthesisRequest) -> Result<PathBuf, SynthesisError>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

// =============================================================================
// External Program Synthesizer
// =============================================================================

/// Runs an external program once per request
#[derive(Clone, Debug)]
pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
}

impl CommandSynthesizer {
    /// Build from an argv template; the first element is the program
    pub fn from_argv(argv: &[String]) -> Result<Self, SynthesisError> {
        let (program, args) = argv.split_first().ok_or(SynthesisError::EmptyCommand)?;
        if program.trim().is_empty() {
            return Err(SynthesisError::EmptyCommand);
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Arguments for one request with every placeholder filled in
    pub fn render_args(&self, req: &SynthesisRequest) -> Vec<String> {
        let voice = req.voice_path.to_string_lossy();
        let output = req.output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(TEXT_PLACEHOLDER, &req.text)
                    .replace(VOICE_PLACEHOLDER, &voice)
                    .replace(LANGUAGE_PLACEHOLDER, &req.language)
                    .replace(OUTPUT_PLACEHOLDER, &output)
            })
            .collect()
    }
}

#[async_trait]
impl Synthesizer for CommandSynthesizer {
    #[instrument(skip(self, req), fields(program = %self.program, text_len = req.text.len()))]
    async fn synthesize(&self, req: SynthesisRequest) -> Result<PathBuf, SynthesisError> {
        let start = Instant::now();
        let output = Command::new(&self.program)
            .args(self.render_args(&req))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| SynthesisError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SynthesisError::Failed {
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        if tokio::fs::metadata(&req.output).await.is_err() {
            return Err(SynthesisError::MissingOutput(req.output));
        }

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            output = %req.output.display(),
            "synthesis finished"
        );
        Ok(req.output)
    }

    fn name(&self) -> &str {
        &self.program
    }
}

// =============================================================================
// Output Files
// =============================================================================

const MAX_FILE_STEM: usize = 150;

/// Replace characters that are invalid in file names and cap the length
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if "\\/:*?\"<>|".contains(c) { '-' } else { c })
        .take(MAX_FILE_STEM)
        .collect()
}

/// Fresh output path for a clip spoken as `speaker`
pub fn clip_path(dir: &Path, speaker: &str) -> PathBuf {
    let speaker = if speaker.is_empty() {
        "announcement"
    } else {
        speaker
    };
    dir.join(format!(
        "{}-{}.wav",
        sanitize_filename(speaker),
        uuid::Uuid::new_v4().simple()
    ))
}

/// Duration in seconds of a WAV file, if it is one
pub fn clip_duration(path: &Path) -> Option<f32> {
    let reader = hound::WavReader::open(path).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    Some(reader.duration() as f32 / spec.sample_rate as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(matches!(
            CommandSynthesizer::from_argv(&[]),
            Err(SynthesisError::EmptyCommand)
        ));
        assert!(matches!(
            CommandSynthesizer::from_argv(&argv(&[" "])),
            Err(SynthesisError::EmptyCommand)
        ));
    }

    #[test]
    fn test_render_args_fills_placeholders() {
        let synth = CommandSynthesizer::from_argv(&argv(&[
            "tts",
            "--text",
            "{text}",
            "--speaker_wav",
            "{voice}",
            "--language_idx",
            "{language}",
            "--out_path",
            "{output}",
        ]))
        .unwrap();
        let req = SynthesisRequest::new("hi there", "voices/a.wav", "en", "/tmp/out.wav");

        assert_eq!(
            synth.render_args(&req),
            argv(&[
                "--text",
                "hi there",
                "--speaker_wav",
                "voices/a.wav",
                "--language_idx",
                "en",
                "--out_path",
                "/tmp/out.wav",
            ])
        );
        assert_eq!(synth.name(), "tts");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b:c*d?"), "a-b-c-d-");
        assert_eq!(sanitize_filename(&"x".repeat(400)).len(), 150);
    }

    #[test]
    fn test_clip_path_is_unique_and_named() {
        let dir = Path::new("/tmp/clips");
        let a = clip_path(dir, "alice");
        let b = clip_path(dir, "alice");
        assert_ne!(a, b);
        assert!(a.starts_with(dir));
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("alice-"));
        assert!(name.ends_with(".wav"));

        let announcement = clip_path(dir, "");
        assert!(announcement
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("announcement-"));
    }

    #[test]
    fn test_clip_duration_reads_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..8000 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let secs = clip_duration(&path).unwrap();
        assert!((secs - 0.5).abs() < 1e-3);
        assert_eq!(clip_duration(&dir.path().join("missing.wav")), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_synthesizer_runs_program() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.wav");
        let synth = CommandSynthesizer::from_argv(&argv(&["touch", "{output}"])).unwrap();

        let path = synth
            .synthesize(SynthesisRequest::new("hi", "a.wav", "en", &out))
            .await
            .unwrap();
        assert_eq!(path, out);
        assert!(out.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_synthesizer_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.wav");

        let failing = CommandSynthesizer::from_argv(&argv(&["false"])).unwrap();
        let err = failing
            .synthesize(SynthesisRequest::new("hi", "a.wav", "en", &out))
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Failed { .. }));

        let silent = CommandSynthesizer::from_argv(&argv(&["true"])).unwrap();
        let err = silent
            .synthesize(SynthesisRequest::new("hi", "a.wav", "en", &out))
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::MissingOutput(_)));

        let missing = CommandSynthesizer::from_argv(&argv(&["/no/such/program"])).unwrap();
        let err = missing
            .synthesize(SynthesisRequest::new("hi", "a.wav", "en", &out))
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Spawn { .. }));
    }
}
