//! Twitch chat ingestion over WebSocket
//!
//! Keeps one connection to the chat service alive, reconnecting after a
//! fixed delay whenever it drops, and turns incoming PRIVMSG lines into
//! pipeline submissions.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use thiserror::Error;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::config::TwitchSettings;
use crate::filter::SpeakFilter;
use crate::pipeline::Pipeline;
use crate::protocol::{
    classify_line, join_line, nick_line, pass_line, InboundLine, PONG_REPLY, TWITCH_IRC_URL,
};

/// Delay before every reconnect attempt
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Line-level handling, independent of the socket
#[derive(Clone)]
pub struct ChatIngest {
    pipeline: Pipeline,
    filter: SpeakFilter,
}

impl ChatIngest {
    pub fn new(pipeline: Pipeline, filter: SpeakFilter) -> Self {
        Self { pipeline, filter }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Handle one raw line, returning the reply to send if any.
    ///
    /// Chat messages are submitted to the pipeline; malformed lines are
    /// logged and dropped.
    pub fn handle_line(&self, raw: &str) -> Option<String> {
        self.handle_line_with(raw, &mut rand::rng())
    }

    pub fn handle_line_with<R: Rng + ?Sized>(&self, raw: &str, rng: &mut R) -> Option<String> {
        match classify_line(raw) {
            Ok(InboundLine::Ping) => Some(PONG_REPLY.to_string()),
            Ok(InboundLine::Other) => None,
            Ok(InboundLine::Chat(event)) => {
                info!(
                    username = %event.username,
                    channel = %event.channel,
                    content = %event.content,
                    "chat message"
                );
                if self.filter.should_speak(&event, rng) {
                    self.pipeline.submit(event);
                } else {
                    debug!(username = %event.username, "message skipped by filter");
                }
                None
            }
            Err(err) => {
                debug!(error = %err, line = raw.trim(), "dropping malformed line");
                None
            }
        }
    }

    /// A text frame may carry several CRLF-separated lines
    pub fn handle_frame(&self, frame: &str) -> Vec<String> {
        frame
            .lines()
            .filter_map(|line| self.handle_line(line))
            .collect()
    }
}

/// Connection owner for the chat service
pub struct ChatClient {
    settings: TwitchSettings,
    ingest: ChatIngest,
    url: String,
    reconnect_delay: Duration,
}

impl ChatClient {
    pub fn new(settings: TwitchSettings, ingest: ChatIngest) -> Self {
        Self {
            settings,
            ingest,
            url: TWITCH_IRC_URL.to_string(),
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    /// Connect somewhere other than the public chat endpoint
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Connect and serve forever, reconnecting after every disconnect
    pub async fn run(&self) {
        loop {
            match self.session().await {
                Ok(()) => info!("chat connection closed"),
                Err(err) => warn!(error = %err, "chat connection failed"),
            }
            info!(
                delay_secs = self.reconnect_delay.as_secs(),
                "reconnecting to chat"
            );
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// One connection from open to close
    async fn session(&self) -> Result<(), ChatError> {
        let (socket, _response) = connect_async(self.url.as_str()).await?;
        info!(url = %self.url, "connected to chat");
        let (mut write, mut read) = socket.split();

        let login = [
            pass_line(&self.settings.access_token),
            nick_line(&self.settings.name),
            join_line(&self.settings.channel),
        ];
        for line in login {
            write.send(Message::Text(line.into())).await?;
        }

        let channel = &self.settings.channel;
        info!(channel = %channel, "joined channel");
        self.ingest
            .pipeline()
            .announce(format!("Successfully connected to Twitch channel {channel}!"));

        while let Some(message) = read.next().await {
            match message? {
                Message::Text(text) => {
                    for reply in self.ingest.handle_frame(text.as_str()) {
                        write.send(Message::Text(reply.into())).await?;
                    }
                }
                Message::Ping(data) => {
                    write.send(Message::Pong(data)).await?;
                }
                Message::Close(frame) => {
                    debug!(?frame, "close frame received");
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }
}
