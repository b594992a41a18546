//! Console transport.
//!
//! Runs the bot against stdin/stdout: each input line is a message from the
//! configured developer user, and everything the bot renders is printed.
//!
//! ```text
//! ?afk lunch               # message in the console guild
//! hey <@3>                 # mentions user 3
//! /press confirm           # press a component of the last rendered message
//! /press 12 cancel         # press a component of message 12
//! ```

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use oneki_core::SessionHost;
use oneki_core::host::{HostError, HostResult};
use oneki_core::types::{
    ChannelId, ComponentEvent, GuildId, InboundMessage, Member, MessageHandle, MessageId, Output,
    UserId,
};

use crate::router::Router;
use crate::state::AppState;

/// The single channel of the console.
pub const CONSOLE_CHANNEL: ChannelId = ChannelId(1);

// ─────────────────────────────────────────────────────────────────────────────
// Host
// ─────────────────────────────────────────────────────────────────────────────

/// `SessionHost` that prints to a writer.
pub struct ConsoleHost {
    out: Mutex<Box<dyn Write + Send>>,
    next_id: AtomicU64,
    last_message: Mutex<Option<MessageHandle>>,
    nicknames: Mutex<HashMap<UserId, String>>,
}

impl ConsoleHost {
    pub fn stdout() -> Self {
        Self::with_writer(std::io::stdout())
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
            next_id: AtomicU64::new(0),
            last_message: Mutex::new(None),
            nicknames: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn sink() -> Self {
        Self::with_writer(std::io::sink())
    }

    /// Allocate an id for a message entering the console.
    pub fn next_message_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Most recently rendered message.
    pub fn last_message(&self) -> Option<MessageHandle> {
        self.last_message.lock().ok().and_then(|last| *last)
    }

    /// Nickname set through `set_nickname`, if any.
    pub fn nickname(&self, user: UserId) -> Option<String> {
        self.nicknames
            .lock()
            .ok()
            .and_then(|nicknames| nicknames.get(&user).cloned())
    }

    /// Print a line that is not bot output.
    pub fn notice(&self, text: &str) -> HostResult<()> {
        self.write(&format!("! {text}"))
    }

    fn write(&self, text: &str) -> HostResult<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| HostError::Delivery("console writer poisoned".into()))?;
        writeln!(out, "{text}").map_err(|e| HostError::Delivery(e.to_string()))?;
        out.flush().map_err(|e| HostError::Delivery(e.to_string()))
    }
}

/// Text rendition of an output, one line per part.
fn format_output(output: &Output) -> String {
    let mut lines = Vec::new();
    if let Some(content) = &output.content {
        lines.push(content.clone());
    }
    if let Some(embed) = &output.embed {
        if let Some(author) = &embed.author {
            lines.push(format!("  | {author}"));
        }
        if let Some(title) = &embed.title {
            lines.push(format!("  | {title}"));
        }
        if let Some(description) = &embed.description {
            lines.push(format!("  | {description}"));
        }
        for field in &embed.fields {
            lines.push(format!("  | {} {}", field.name, field.value));
        }
        if let Some(timestamp) = &embed.timestamp {
            lines.push(format!("  | {}", timestamp.to_rfc3339()));
        }
    }
    if !output.components.is_empty() {
        let buttons: Vec<String> = output
            .components
            .iter()
            .map(|component| match &component.emoji {
                Some(emoji) => format!("[{}: {emoji} {}]", component.id, component.label),
                None => format!("[{}: {}]", component.id, component.label),
            })
            .collect();
        lines.push(format!("  {}", buttons.join(" ")));
    }
    lines.join("\n")
}

#[async_trait]
impl SessionHost for ConsoleHost {
    async fn render(
        &self,
        channel: ChannelId,
        output: Output,
        delete_after: Option<Duration>,
    ) -> HostResult<MessageHandle> {
        let handle = MessageHandle {
            channel,
            message: self.next_message_id(),
        };
        let mut text = format!("[#{channel} {}] {}", handle.message, format_output(&output));
        if let Some(delay) = delete_after {
            text.push_str(&format!("\n  (disappears in {}s)", delay.as_secs()));
        }
        self.write(&text)?;
        if let Ok(mut last) = self.last_message.lock() {
            *last = Some(handle);
        }
        Ok(handle)
    }

    async fn edit(&self, handle: MessageHandle, output: Output) -> HostResult<()> {
        self.write(&format!(
            "[#{} {} edited] {}",
            handle.channel,
            handle.message,
            format_output(&output)
        ))
    }

    async fn respond_ephemeral(&self, event: &ComponentEvent, output: Output) -> HostResult<()> {
        self.write(&format!(
            "(only {}) {}",
            event.user.display_name,
            format_output(&output)
        ))
    }

    async fn set_nickname(&self, guild: GuildId, user: UserId, nickname: &str) -> HostResult<()> {
        self.nicknames
            .lock()
            .map_err(|_| HostError::Delivery("nickname table poisoned".into()))?
            .insert(user, nickname.to_string());
        self.write(&format!("* {user} is now \"{nickname}\" in guild {guild}"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Input loop
// ─────────────────────────────────────────────────────────────────────────────

/// One parsed console line.
#[derive(Debug, Clone)]
pub enum ConsoleInput {
    Message(InboundMessage),
    Press {
        message: MessageHandle,
        component: String,
    },
}

pub struct Console {
    state: Arc<AppState>,
    host: Arc<ConsoleHost>,
    router: Router,
    mention: Regex,
}

impl Console {
    pub fn new(state: Arc<AppState>, host: Arc<ConsoleHost>) -> anyhow::Result<Self> {
        Ok(Self {
            router: Router::new(Arc::clone(&state)),
            state,
            host,
            mention: Regex::new(r"<@!?(\d+)>").context("invalid mention pattern")?,
        })
    }

    /// Read stdin until EOF or ctrl-c.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => self.handle(&line).await?,
                    None => break,
                },
                result = tokio::signal::ctrl_c() => {
                    result?;
                    break;
                }
            }
        }
        Ok(())
    }

    pub async fn handle(&self, line: &str) -> anyhow::Result<()> {
        match self.parse(line) {
            Some(ConsoleInput::Message(message)) => {
                match self.router.on_message(&message).await {
                    Ok(routed) => debug!(message_id = %message.id, ?routed, "Message routed"),
                    Err(e) => {
                        warn!(message_id = %message.id, error = %e, "Message handling failed");
                        self.host.notice(&e.to_string())?;
                    }
                }
            }
            Some(ConsoleInput::Press { message, component }) => {
                let event = ComponentEvent {
                    message,
                    component_id: component,
                    user: self.developer(),
                    locale: self.state.config.locales.default.clone(),
                    values: Vec::new(),
                };
                match self.state.sessions.route(event).await {
                    Ok(dispatch) => debug!(message = %message, ?dispatch, "Component handled"),
                    Err(e) => self.host.notice(&e.to_string())?,
                }
            }
            None => {}
        }
        Ok(())
    }

    pub fn parse(&self, line: &str) -> Option<ConsoleInput> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(rest) = line.strip_prefix("/press") {
            let mut words = rest.split_whitespace();
            let (message, component) = match (words.next(), words.next()) {
                (Some(id), Some(component)) => {
                    let message = id.parse::<MessageId>().ok()?;
                    (
                        MessageHandle {
                            channel: CONSOLE_CHANNEL,
                            message,
                        },
                        component,
                    )
                }
                (Some(component), None) => (self.host.last_message()?, component),
                _ => return None,
            };
            return Some(ConsoleInput::Press {
                message,
                component: component.to_string(),
            });
        }

        let mentions = self
            .mention
            .captures_iter(line)
            .filter_map(|captures| captures.get(1)?.as_str().parse::<UserId>().ok())
            .map(|id| self.member(id))
            .collect();

        Some(ConsoleInput::Message(InboundMessage {
            id: self.host.next_message_id(),
            guild: Some(self.state.config.bot.console_guild),
            channel: CONSOLE_CHANNEL,
            author: self.developer(),
            content: line.to_string(),
            mentions,
            locale: self.state.config.locales.default.clone(),
        }))
    }

    fn developer(&self) -> Member {
        self.member(self.state.config.bot.dev_user_id)
    }

    fn member(&self, id: UserId) -> Member {
        let bot = &self.state.config.bot;
        let mut member = match self.host.nickname(id) {
            Some(nickname) => Member::new(id, nickname),
            None if id == bot.dev_user_id => Member::new(id, bot.dev_user_name.clone()),
            None => Member::new(id, format!("user{id}")),
        };
        member.bot = id == bot.user_id;
        member
    }
}
