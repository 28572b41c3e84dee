//! Twitch IRC lines as seen over the chat WebSocket
//!
//! Only the handful of lines the bot cares about are modeled: the login
//! sequence it sends, the keepalive probe it answers and the chat messages
//! it reads aloud. Everything else is ignored.

use thiserror::Error;

/// Chat service endpoint
pub const TWITCH_IRC_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Prefix of the server keepalive probe
pub const PING_PREFIX: &str = "PING";

/// Reply sent for every keepalive probe
pub const PONG_REPLY: &str = "PONG :tmi.twitch.tv";

/// Command carried by chat messages
pub const CHAT_COMMAND: &str = "PRIVMSG";

/// A chat message parsed from one PRIVMSG line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    /// Author login; empty for locally generated announcements
    pub username: String,
    /// `user@user.tmi.twitch.tv` host mask
    pub email: String,
    /// Channel name without the leading `#`
    pub channel: String,
    /// Message text
    pub content: String,
}

impl ChatEvent {
    /// Event spoken by the bot itself rather than a chatter
    pub fn announcement(content: impl Into<String>) -> Self {
        Self {
            username: String::new(),
            email: String::new(),
            channel: String::new(),
            content: content.into(),
        }
    }

    pub fn is_announcement(&self) -> bool {
        self.username.is_empty()
    }
}

/// Why a PRIVMSG line could not be turned into a [`ChatEvent`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line does not start with a ':' prefix")]
    MissingPrefix,

    #[error("prefix has no '!' separating user and host")]
    MalformedPrefix,

    #[error("expected '<host> PRIVMSG #<channel>', got '{0}'")]
    MalformedCommand(String),

    #[error("message has no ' :' content marker")]
    MissingContent,

    #[error("invalid username '{0}'")]
    InvalidUsername(String),

    #[error("invalid channel '{0}'")]
    InvalidChannel(String),
}

/// What one inbound line means to the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundLine {
    /// Keepalive probe, answer with [`PONG_REPLY`]
    Ping,
    /// A chat message
    Chat(ChatEvent),
    /// Anything else
    Other,
}

/// Classify one raw line.
///
/// Lines that look like chat but fail to parse come back as the error so
/// the caller can log them; they never affect later lines.
pub fn classify_line(raw: &str) -> Result<InboundLine, ParseError> {
    let line = raw.trim();
    if line.starts_with(PING_PREFIX) {
        return Ok(InboundLine::Ping);
    }
    if !line.contains(CHAT_COMMAND) {
        return Ok(InboundLine::Other);
    }
    parse_chat_message(line).map(InboundLine::Chat)
}

/// Parse a PRIVMSG line such as
/// `:user!user@user.tmi.twitch.tv PRIVMSG #channel :hello :world`.
pub fn parse_chat_message(line: &str) -> Result<ChatEvent, ParseError> {
    let segments: Vec<&str> = line.split(':').collect();
    if segments.len() < 3 || !segments[0].is_empty() {
        return Err(ParseError::MissingPrefix);
    }

    let (username, remainder) = match segments[1].split('!').collect::<Vec<_>>()[..] {
        [username, remainder] => (username, remainder),
        _ => return Err(ParseError::MalformedPrefix),
    };
    if !is_valid_name(username) {
        return Err(ParseError::InvalidUsername(username.to_string()));
    }

    let tokens: Vec<&str> = remainder.split(' ').collect();
    if tokens.len() < 3
        || tokens[0].is_empty()
        || tokens[1] != CHAT_COMMAND
        || tokens[2].is_empty()
    {
        return Err(ParseError::MalformedCommand(remainder.trim().to_string()));
    }
    let email = tokens[0];

    let raw_channel = tokens[2];
    let channel = raw_channel.strip_prefix('#').unwrap_or(raw_channel);
    if !is_valid_name(channel) {
        return Err(ParseError::InvalidChannel(raw_channel.to_string()));
    }

    // message text may contain colons, so take everything after the first " :"
    let content = match line.find(" :") {
        Some(idx) => &line[idx + 2..],
        None => return Err(ParseError::MissingContent),
    };

    Ok(ChatEvent {
        username: username.to_string(),
        email: email.to_string(),
        channel: channel.to_string(),
        content: content.to_string(),
    })
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['#', '!', ':', ' '])
}

/// `PASS oauth:<token>`
pub fn pass_line(token: &str) -> String {
    format!("PASS oauth:{token}")
}

/// `NICK <name>`
pub fn nick_line(name: &str) -> String {
    format!("NICK {name}")
}

/// `JOIN #<channel>`
pub fn join_line(channel: &str) -> String {
    format!("JOIN #{channel}")
}
