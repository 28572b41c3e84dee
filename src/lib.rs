pub mod chat;
pub mod config;
pub mod filter;
pub mod pipeline;
pub mod player;
pub mod protocol;
pub mod queue;
pub mod tts;
pub mod voice;

pub use chat::{ChatClient, ChatError, ChatIngest};
pub use config::{Cli, Commands, SayArgs, Settings, TtsSettings, TwitchSettings};
pub use filter::SpeakFilter;
pub use pipeline::{Pipeline, PipelineError, PipelineSettings};
pub use player::{FfplayPlayer, PlaybackError, PlaybackMode, Player};
pub use protocol::{ChatEvent, InboundLine, ParseError};
pub use queue::WorkQueue;
pub use tts::{CommandSynthesizer, SynthesisError, SynthesisRequest, Synthesizer};
pub use voice::{Voice, VoiceAssigner, VoiceAssignment, VoiceCatalog, VoiceError};
