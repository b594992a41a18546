//! Inbound message routing.
//!
//! Every non-bot message runs the away monitor's passive trigger. A message
//! that is exactly a mention of the bot is answered with the prefixes.
//! Commands are parsed against the context's prefixes and dispatched unless
//! the author or the guild is blacklisted.

use std::sync::Arc;
use tracing::{debug, info, warn};

use oneki_core::away;
use oneki_core::cache::Invocation;
use oneki_core::i18n::Bundle;
use oneki_core::session::Confirm;
use oneki_core::types::{GuildId, InboundMessage, Output, UserId};
use oneki_core::{Error, Result};

use crate::state::AppState;

/// Name of the prefix management command.
pub const PREFIX_COMMAND: &str = "prefix";

/// What the router did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Sent by a bot.
    Ignored,
    /// Bare mention of the bot, answered with the prefixes.
    Ping,
    /// A command from a blacklisted user or guild.
    Blocked,
    Command(&'static str),
    /// Plain message.
    Message,
}

pub struct Router {
    state: Arc<AppState>,
}

impl Router {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn on_message(&self, message: &InboundMessage) -> Result<Routed> {
        if message.author.bot {
            return Ok(Routed::Ignored);
        }

        let bot = self.state.bot_id();
        let blocked = self
            .state
            .blacklist
            .is_blocked(message.author.id, message.guild)
            .await;
        let prefixes = self
            .state
            .prefixes
            .command_prefixes(message.guild, bot)
            .await;
        let invocation = Invocation::parse(&message.content, &prefixes);
        let is_toggle = !blocked && invocation.as_ref().is_some_and(|i| i.is(away::COMMAND));

        if let Err(e) = self.state.monitor.observe(message, is_toggle).await {
            warn!(user = %message.author.id, error = %e, "Away trigger failed");
        }

        // The ping is not a command, blacklisted authors get it too
        if is_bare_mention(&message.content, bot) {
            self.ping(message).await?;
            return Ok(Routed::Ping);
        }

        if blocked {
            if invocation.is_some() {
                debug!(user = %message.author.id, guild = ?message.guild, "Ignoring blacklisted command");
                return Ok(Routed::Blocked);
            }
            return Ok(Routed::Message);
        }

        let Some(invocation) = invocation else {
            return Ok(Routed::Message);
        };

        if invocation.is(away::COMMAND) {
            match self.state.monitor.toggle(message, Some(invocation.args)).await {
                Ok(_) | Err(Error::Validation(_)) => {}
                Err(e) => return Err(e),
            }
            return Ok(Routed::Command(away::COMMAND));
        }

        if invocation.is(PREFIX_COMMAND) {
            self.prefix(message, invocation.args).await?;
            return Ok(Routed::Command(PREFIX_COMMAND));
        }

        Ok(Routed::Message)
    }

    async fn ping(&self, message: &InboundMessage) -> Result<()> {
        let prefixes = match message.guild {
            Some(guild) => self.state.prefixes.raw_prefixes(guild).await,
            None => self.state.config.prefixes.direct_message.clone(),
        };
        let bundle = self.state.translations.bundle(&message.locale, "ping");
        let content = match prefixes.as_slice() {
            [single] => bundle.format("one", &[single]),
            many => bundle.format("more", &[&quoted(many)]),
        };
        self.reply(message, content).await
    }

    async fn prefix(&self, message: &InboundMessage, args: &str) -> Result<()> {
        let bundle = self.state.translations.bundle(&message.locale, "prefix");
        let Some(guild) = message.guild else {
            return self.reply(message, bundle.get("guild_only")).await;
        };

        let mut words = args.split_whitespace();
        match words.next() {
            Some(sub) if sub.eq_ignore_ascii_case("set") => {
                let prefixes: Vec<String> = words.map(str::to_string).collect();
                match self.state.prefixes.set(guild, prefixes).await {
                    Ok(_) => {
                        let current = self.state.prefixes.raw_prefixes(guild).await;
                        info!(guild = %guild, prefixes = ?current, "Prefixes updated");
                        self.reply(message, bundle.format("updated", &[&quoted(&current)]))
                            .await
                    }
                    Err(Error::Validation(failure)) => {
                        self.reply(message, bundle.format("invalid", &[&failure])).await
                    }
                    Err(e) => Err(e),
                }
            }
            Some(sub) if sub.eq_ignore_ascii_case("reset") => {
                self.confirm_reset(message, guild, &bundle).await
            }
            _ => {
                let current = self.state.prefixes.raw_prefixes(guild).await;
                self.reply(message, bundle.format("current", &[&quoted(&current)]))
                    .await
            }
        }
    }

    /// Ask for confirmation in a session and reset once it is given.
    async fn confirm_reset(
        &self,
        message: &InboundMessage,
        guild: GuildId,
        bundle: &Bundle,
    ) -> Result<()> {
        if !self.state.prefixes.scope().contains(&guild).await {
            return self.reply(message, bundle.get("not_custom")).await;
        }

        let (view, answer) = Confirm::new(bundle.get("reset_prompt"));
        let options = self
            .state
            .sessions
            .options(message.author.id)
            .locale(message.locale.clone());
        self.state
            .sessions
            .start(view, options, message.channel)
            .await?;

        let state = Arc::clone(&self.state);
        let channel = message.channel;
        let done = bundle.get("reset_done").into_owned();
        tokio::spawn(async move {
            if answer.wait().await != Some(true) {
                return;
            }
            match state.prefixes.reset(guild).await {
                Ok(_) => info!(guild = %guild, "Prefixes reset"),
                Err(e) if e.is_not_present() => debug!(guild = %guild, "Prefixes already reset"),
                Err(e) => {
                    warn!(guild = %guild, error = %e, "Failed to reset prefixes");
                    return;
                }
            }
            if let Err(e) = state.host.render(channel, Output::text(done), None).await {
                warn!(error = %e, "Failed to announce prefix reset");
            }
        });
        Ok(())
    }

    async fn reply(&self, message: &InboundMessage, content: impl Into<String>) -> Result<()> {
        self.state
            .host
            .render(message.channel, Output::text(content), None)
            .await?;
        Ok(())
    }
}

/// Whether `content` is exactly `<@bot>` or `<@!bot>`, with no surrounding spaces.
fn is_bare_mention(content: &str, bot: UserId) -> bool {
    content == format!("<@{bot}>") || content == format!("<@!{bot}>")
}

fn quoted(prefixes: &[String]) -> String {
    prefixes
        .iter()
        .map(|prefix| format!("`{prefix}`"))
        .collect::<Vec<_>>()
        .join(", ")
}
