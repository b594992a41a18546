//! Away-status monitor.
//!
//! Each user is either present or away; the away cache is the only record of
//! which. The monitor reacts to two inputs:
//!
//! - the `afk` toggle command, which flips the author's status
//! - every other message, which returns an away author to present and posts
//!   a transient notice for each away user it mentions
//!
//! Display-name markers are a courtesy: failing to set or strip one never
//! blocks the status change.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{AwayCache, AwayRecord};
use crate::error::{Error, Result, ValidationFailure};
use crate::host::{HostError, SessionHost};
use crate::i18n::{Bundle, Translations};
use crate::types::{Embed, InboundMessage, Member, Output};

/// Name of the toggle command.
pub const COMMAND: &str = "afk";

const AWAY_COLOR: u32 = 0x383FFF;
const NOTICE_COLOR: u32 = 0xFCE64C;

static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:[a-z][a-z0-9+.-]*://\S+|\bwww\.\S+|\b(?:discord\.gg|discord(?:app)?\.com/invite)/\S+|\b[a-z0-9-]+(?:\.[a-z0-9-]+)*\.(?:com|net|org|gg|io|me|co|xyz|ly|app|dev|tv|link)\b)",
    )
    .unwrap()
});

/// Whether `text` contains something that looks like a URL.
pub fn contains_link(text: &str) -> bool {
    LINK.is_match(text)
}

/// Tunables of the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwayConfig {
    pub max_reason_chars: usize,
    /// Prefix added to the display name while away
    pub marker: String,
    /// Longest display name that still gets the marker
    pub max_marked_name_chars: usize,
    pub return_notice: Duration,
    pub mention_notice: Duration,
}

impl Default for AwayConfig {
    fn default() -> Self {
        Self {
            max_reason_chars: 50,
            marker: "[AFK] ".to_string(),
            max_marked_name_chars: 26,
            return_notice: Duration::from_secs(10),
            mention_notice: Duration::from_secs(15),
        }
    }
}

/// Result of the toggle command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toggle {
    /// The author was away and is present again.
    Returned,
    /// The author is now away.
    Away(AwayRecord),
}

/// What the passive trigger did for one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observed {
    /// The author was away and has been returned.
    pub returned: bool,
    /// Mention notices posted.
    pub notices: usize,
}

pub struct AwayMonitor {
    away: Arc<AwayCache>,
    host: Arc<dyn SessionHost>,
    translations: Arc<Translations>,
    config: AwayConfig,
}

impl AwayMonitor {
    pub fn new(
        away: Arc<AwayCache>,
        host: Arc<dyn SessionHost>,
        translations: Arc<Translations>,
        config: AwayConfig,
    ) -> Self {
        Self {
            away,
            host,
            translations,
            config,
        }
    }

    pub fn config(&self) -> &AwayConfig {
        &self.config
    }

    pub async fn is_away(&self, member: &Member) -> bool {
        self.away.contains(&member.id).await
    }

    /// Flip the author's status.
    ///
    /// Going away validates `reason` first; a rejected reason is reported to
    /// the author and returned as `Error::Validation` with no state change.
    pub async fn toggle(&self, message: &InboundMessage, reason: Option<&str>) -> Result<Toggle> {
        if self.is_away(&message.author).await {
            self.return_present(message, None).await?;
            return Ok(Toggle::Returned);
        }

        let bundle = self.translations.bundle(&message.locale, "afk");
        let reason = match reason.map(str::trim) {
            Some(reason) if !reason.is_empty() => reason.to_string(),
            _ => bundle.get("no_reason").into_owned(),
        };

        if let Err(failure) = self.validate(&reason) {
            let notice = match &failure {
                ValidationFailure::TooLong { max, .. } => bundle.format("too_long", &[max]),
                ValidationFailure::ContainsLink => bundle.get("no_links").into_owned(),
                other => other.to_string(),
            };
            self.post(message, Output::text(notice), None).await;
            return Err(failure.into());
        }

        let record = AwayRecord::new(reason);
        self.away.put(message.author.id, record.clone()).await?;
        info!(user = %message.author.id, reason = %record.reason, "User is away");

        self.apply_marker(message, &bundle).await;

        let embed = Embed::titled(bundle.format("embed.title", &[&message.author.display_name]))
            .color(AWAY_COLOR);
        self.post(message, Output::embed(embed), None).await;
        Ok(Toggle::Away(record))
    }

    /// Passive trigger run for every inbound message.
    ///
    /// `is_toggle` marks a message that invokes the toggle command itself, so
    /// its author is not returned twice.
    pub async fn observe(&self, message: &InboundMessage, is_toggle: bool) -> Result<Observed> {
        let mut observed = Observed::default();

        if !is_toggle && self.is_away(&message.author).await {
            observed.returned = self
                .return_present(message, Some(self.config.return_notice))
                .await?;
        }

        if message.mentions.is_empty() {
            return Ok(observed);
        }

        let bundle = self.translations.bundle(&message.locale, "afk_event");
        for mentioned in &message.mentions {
            let Some(record) = self.away.get(&mentioned.id).await else {
                continue;
            };
            let embed = Embed::titled(bundle.format("embed.title", &[&mentioned.display_name]))
                .description(bundle.format("embed.reason", &[&record.reason]))
                .timestamp(record.since)
                .color(NOTICE_COLOR);
            self.post(message, Output::embed(embed), Some(self.config.mention_notice))
                .await;
            observed.notices += 1;
        }
        Ok(observed)
    }

    fn validate(&self, reason: &str) -> std::result::Result<(), ValidationFailure> {
        let length = reason.chars().count();
        if length > self.config.max_reason_chars {
            return Err(ValidationFailure::TooLong {
                max: self.config.max_reason_chars,
                actual: length,
            });
        }
        if contains_link(reason) {
            return Err(ValidationFailure::ContainsLink);
        }
        Ok(())
    }

    /// Clear the author's record, strip the marker and announce the return.
    ///
    /// Returns false when a concurrent call already returned the author.
    async fn return_present(
        &self,
        message: &InboundMessage,
        delete_after: Option<Duration>,
    ) -> Result<bool> {
        let author = &message.author;
        match self.away.remove(&author.id).await {
            Ok(_) => {}
            Err(Error::NotPresent { .. }) => return Ok(false),
            Err(e) => return Err(e),
        }
        info!(user = %author.id, "User is no longer away");

        let name = author.display_name.replace(&self.config.marker, "");
        if let Some(guild) = message.guild {
            if name != author.display_name {
                if let Err(e) = self.host.set_nickname(guild, author.id, &name).await {
                    self.marker_failed(message, e, delete_after).await;
                }
            }
        }

        let bundle = self.translations.bundle(&message.locale, "afk_event");
        let embed = Embed::titled(bundle.format("no_longer_afk", &[&name])).color(NOTICE_COLOR);
        self.post(message, Output::embed(embed), delete_after).await;
        Ok(true)
    }

    async fn apply_marker(&self, message: &InboundMessage, bundle: &Bundle) {
        let Some(guild) = message.guild else {
            return;
        };
        let author = &message.author;
        if author.display_name.starts_with(&self.config.marker) {
            return;
        }
        if author.display_name.chars().count() > self.config.max_marked_name_chars {
            let notice = bundle.format("max_name_length", &[&author.mention()]);
            self.post(message, Output::text(notice), None).await;
            return;
        }

        let marked = format!("{}{}", self.config.marker, author.display_name);
        if let Err(e) = self.host.set_nickname(guild, author.id, &marked).await {
            self.marker_failed(message, e, None).await;
        }
    }

    async fn marker_failed(
        &self,
        message: &InboundMessage,
        error: HostError,
        delete_after: Option<Duration>,
    ) {
        match error {
            HostError::PermissionDenied(_) => {
                debug!(user = %message.author.id, "No permission to change nickname");
                let notice = self
                    .translations
                    .bundle(&message.locale, "afk")
                    .get("no_permissions")
                    .into_owned();
                self.post(message, Output::text(notice), delete_after).await;
            }
            other => warn!(user = %message.author.id, error = %other, "Failed to change nickname"),
        }
    }

    /// Post to the message's channel; delivery failures are logged.
    async fn post(&self, message: &InboundMessage, output: Output, delete_after: Option<Duration>) {
        if let Err(e) = self.host.render(message.channel, output, delete_after).await {
            warn!(channel = %message.channel, error = %e, "Failed to post away notice");
        }
    }
}
