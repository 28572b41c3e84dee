//! Configuration and CLI for the Twitch TTS bot

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::filter::SpeakFilter;
use crate::pipeline::PipelineSettings;
use crate::player::PlaybackMode;
use crate::voice::VoiceAssignment;

/// Environment variable overriding `twitch_access_token`
pub const ACCESS_TOKEN_ENV: &str = "TWITCH_ACCESS_TOKEN";

/// Command line arguments with subcommands
#[derive(Parser, Debug, Clone)]
#[command(name = "twitch-tts")]
#[command(about = "Reads Twitch chat aloud with a cloned voice per chatter")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the JSON configuration file
    #[arg(long, global = true, default_value = "config.json")]
    pub config: PathBuf,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    pub log: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Connect to chat and read messages aloud (default)
    Run,
    /// List the voices found in the voices directory
    Voices,
    /// Synthesize and play a single line right away
    Say(SayArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SayArgs {
    /// Text to speak
    #[arg(short, long)]
    pub text: String,

    /// Speak as this user, using their assigned voice
    #[arg(short, long)]
    pub user: Option<String>,
}

// =============================================================================
// File format
// =============================================================================

type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Reads optional fields out of the config document.
///
/// A missing or `null` field yields `None` silently; a field of the wrong
/// type yields `None` with a warning naming it, and is recorded in
/// `fallbacks`.
#[derive(Debug, Default)]
struct FieldReader {
    fallbacks: Vec<String>,
}

impl FieldReader {
    fn field<T: DeserializeOwned>(
        &mut self,
        section: Option<&JsonObject>,
        section_name: &str,
        key: &str,
    ) -> Option<T> {
        let value = section?.get(key)?;
        if value.is_null() {
            return None;
        }
        match T::deserialize(value) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                self.fall_back(format!("{section_name}.{key}"), value, &err);
                None
            }
        }
    }

    fn section<'a>(&mut self, root: &'a JsonObject, key: &str) -> Option<&'a JsonObject> {
        let value = root.get(key)?;
        match value {
            serde_json::Value::Object(map) => Some(map),
            serde_json::Value::Null => None,
            other => {
                self.fall_back(key.to_string(), other, &"expected an object");
                None
            }
        }
    }

    fn fall_back(
        &mut self,
        field: String,
        value: &serde_json::Value,
        err: &dyn std::fmt::Display,
    ) {
        warn!(
            field = %field,
            value = %value,
            error = %err,
            "ignoring malformed config value, using default"
        );
        self.fallbacks.push(field);
    }
}

// =============================================================================
// Resolved settings
// =============================================================================

/// Chat credentials and target channel
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TwitchSettings {
    pub access_token: String,
    pub name: String,
    pub channel: String,
}

/// Voice, synthesis and playback settings
#[derive(Clone, Debug, PartialEq)]
pub struct TtsSettings {
    pub voices_dir: PathBuf,
    pub language: String,
    pub volume: f32,
    pub wait_for_completion: bool,
    pub delete_after_playing: bool,
    pub user_voices: Vec<VoiceAssignment>,
    pub user_chance_tts_percentage: f32,
    pub tts_specific_users: bool,
    pub specific_users: Vec<String>,
    pub synthesizer_command: Vec<String>,
    pub player_program: String,
    pub output_dir: PathBuf,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            voices_dir: PathBuf::from("voices"),
            language: "en".to_string(),
            volume: 0.5,
            wait_for_completion: true,
            delete_after_playing: true,
            user_voices: Vec::new(),
            user_chance_tts_percentage: 100.0,
            tts_specific_users: false,
            specific_users: Vec::new(),
            synthesizer_command: default_synthesizer_command(),
            player_program: "ffplay".to_string(),
            output_dir: default_output_dir(),
        }
    }
}

impl TtsSettings {
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            language: self.language.clone(),
            output_dir: self.output_dir.clone(),
            playback_mode: PlaybackMode::from_wait_for_completion(self.wait_for_completion),
            delete_after_playing: self.delete_after_playing,
        }
    }

    pub fn speak_filter(&self) -> SpeakFilter {
        SpeakFilter::new(
            self.tts_specific_users,
            &self.specific_users,
            self.user_chance_tts_percentage,
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Settings {
    pub twitch: TwitchSettings,
    pub tts: TtsSettings,
}

impl Settings {
    /// Parse a JSON document, defaulting anything missing or malformed
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Self::parse(text).map(|(settings, _)| settings)
    }

    /// Like [`Settings::from_json`], also returning the fields that fell back
    fn parse(text: &str) -> anyhow::Result<(Self, Vec<String>)> {
        let document: serde_json::Value =
            serde_json::from_str(text).context("config is not valid JSON")?;
        let serde_json::Value::Object(root) = document else {
            anyhow::bail!("config must be a JSON object");
        };

        let mut reader = FieldReader::default();
        let twitch_section = reader.section(&root, "twitch_config");
        let tts = reader.section(&root, "tts_config");
        let defaults = TtsSettings::default();

        let section = "twitch_config";
        let twitch = TwitchSettings {
            access_token: reader
                .field(twitch_section, section, "twitch_access_token")
                .unwrap_or_default(),
            name: reader
                .field(twitch_section, section, "twitch_name")
                .unwrap_or_default(),
            channel: reader
                .field(twitch_section, section, "streamer_channel")
                .unwrap_or_default(),
        };

        let section = "tts_config";
        let tts = TtsSettings {
            voices_dir: reader
                .field(tts, section, "voices_dir")
                .unwrap_or(defaults.voices_dir),
            language: reader
                .field(tts, section, "language")
                .unwrap_or(defaults.language),
            volume: reader
                .field(tts, section, "volume")
                .unwrap_or(defaults.volume),
            wait_for_completion: reader
                .field(tts, section, "wait_for_completion")
                .unwrap_or(defaults.wait_for_completion),
            delete_after_playing: reader
                .field(tts, section, "delete_after_playing")
                .unwrap_or(defaults.delete_after_playing),
            user_voices: reader
                .field(tts, section, "user_voices")
                .unwrap_or(defaults.user_voices),
            user_chance_tts_percentage: reader
                .field(tts, section, "user_chance_tts_percentage")
                .unwrap_or(defaults.user_chance_tts_percentage),
            tts_specific_users: reader
                .field(tts, section, "tts_specific_users")
                .unwrap_or(defaults.tts_specific_users),
            specific_users: reader
                .field(tts, section, "specific_users")
                .unwrap_or(defaults.specific_users),
            synthesizer_command: reader
                .field::<Vec<String>>(tts, section, "synthesizer_command")
                .filter(|argv| !argv.is_empty())
                .unwrap_or(defaults.synthesizer_command),
            player_program: reader
                .field(tts, section, "player_program")
                .unwrap_or(defaults.player_program),
            output_dir: reader
                .field(tts, section, "output_dir")
                .unwrap_or(defaults.output_dir),
        };

        Ok((Self { twitch, tts }, reader.fallbacks))
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.is_empty() {
                self.twitch.access_token = token;
            }
        }
    }
}

/// Coqui XTTS invocation; placeholders are filled per request
pub fn default_synthesizer_command() -> Vec<String> {
    [
        "tts",
        "--model_name",
        "tts_models/multilingual/multi-dataset/xtts_v2",
        "--text",
        "{text}",
        "--speaker_wav",
        "{voice}",
        "--language_idx",
        "{language}",
        "--out_path",
        "{output}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Platform cache directory for synthesized clips
pub fn default_output_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("twitch-tts")
        .join("audio")
}

/// Read the config file and apply environment overrides
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let mut settings = Settings::from_json(&text)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    settings.apply_env();
    Ok(settings)
}

/// Initialize tracing with given log level
pub fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Load environment variables from .env file
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}
