//! Twitch TTS - chat reader CLI
//!
//! A single binary providing:
//! - `run` - Connect to chat and read messages aloud (default)
//! - `voices` - List the voices in the voices directory
//! - `say` - Speak one line right away
//!
//! Usage:
//!   twitch-tts --config config.json
//!   twitch-tts voices
//!   twitch-tts say --text "Hello chat" --user alice

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use twitch_tts::{
    config::{init_tracing, load_dotenv, load_settings, Cli, Commands, SayArgs, Settings},
    ChatClient, ChatEvent, ChatIngest, CommandSynthesizer, FfplayPlayer, Pipeline, VoiceAssigner,
    VoiceCatalog,
};

/// Main entry point with subcommand dispatch
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    load_dotenv();

    let cli = Cli::parse();
    init_tracing(&cli.log);

    let settings = load_settings(&cli.config)?;

    match cli.command {
        Some(Commands::Run) | None => run_bot(settings).await,
        Some(Commands::Voices) => run_voices(&settings),
        Some(Commands::Say(args)) => run_say(settings, args).await,
    }
}

fn load_catalog(settings: &Settings) -> anyhow::Result<VoiceCatalog> {
    let dir = &settings.tts.voices_dir;
    VoiceCatalog::load(dir).with_context(|| format!("cannot load voices from {}", dir.display()))
}

fn build_pipeline(settings: &Settings, catalog: VoiceCatalog) -> anyhow::Result<Pipeline> {
    let synthesizer = CommandSynthesizer::from_argv(&settings.tts.synthesizer_command)
        .context("invalid synthesizer_command")?;
    let player = FfplayPlayer::new(&settings.tts.player_program, settings.tts.volume);

    Ok(Pipeline::new(
        catalog,
        VoiceAssigner::new(settings.tts.user_voices.clone()),
        Arc::new(synthesizer),
        Arc::new(player),
        settings.tts.pipeline_settings(),
    ))
}

/// Run the chat bot until interrupted
async fn run_bot(settings: Settings) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting twitch-tts");

    let catalog = load_catalog(&settings)?;
    info!(voices = catalog.len(), "voice catalog loaded");

    let pipeline = build_pipeline(&settings, catalog)?;
    pipeline
        .prepare()
        .await
        .with_context(|| {
            format!(
                "cannot create output directory {}",
                pipeline.settings().output_dir.display()
            )
        })?;

    info!(
        channel = %settings.twitch.channel,
        playback = ?pipeline.settings().playback_mode,
        language = %pipeline.settings().language,
        "pipeline ready"
    );

    let ingest = ChatIngest::new(pipeline, settings.tts.speak_filter());
    let client = ChatClient::new(settings.twitch.clone(), ingest);

    tokio::select! {
        _ = client.run() => {}
        _ = shutdown_signal() => {}
    }

    info!("twitch-tts stopped");
    Ok(())
}

/// List the voice catalog
fn run_voices(settings: &Settings) -> anyhow::Result<()> {
    let catalog = load_catalog(settings)?;
    for voice in catalog.iter() {
        println!("{}\t{}", voice.name, voice.file_path.display());
    }
    Ok(())
}

/// Speak one line, bypassing the queues
async fn run_say(settings: Settings, args: SayArgs) -> anyhow::Result<()> {
    let catalog = load_catalog(&settings)?;
    let pipeline = build_pipeline(&settings, catalog)?;
    pipeline.prepare().await.context("cannot create output directory")?;

    let mut event = ChatEvent::announcement(args.text);
    if let Some(user) = args.user {
        event.username = user;
    }

    if let Err(err) = pipeline.speak(&event).await {
        error!(error = %err, "failed to speak");
        return Err(err.into());
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        }
    }
}
