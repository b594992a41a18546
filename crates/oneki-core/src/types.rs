//! Shared types for oneki-core.
//!
//! Identity types, inbound events delivered by the transport and the
//! transport-neutral output model produced by sessions and monitors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

// ─────────────────────────────────────────────────────────────────────────────
// Identity Types
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

snowflake!(
    /// Identity of a chat user.
    UserId
);
snowflake!(
    /// Identity of a guild (server).
    GuildId
);
snowflake!(
    /// Identity of a text channel.
    ChannelId
);
snowflake!(
    /// Identity of a delivered message.
    MessageId
);

/// Reference to a message the transport has delivered.
///
/// Interactive sessions are keyed by the handle of the message that carries
/// their components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    pub channel: ChannelId,
    pub message: MessageId,
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel, self.message)
    }
}

/// A user as seen inside a guild (or a DM).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub bot: bool,
}

impl Member {
    pub fn new(id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            bot: false,
        }
    }

    /// Mention markup for this member.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound Events
// ─────────────────────────────────────────────────────────────────────────────

/// A plain message delivered by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: MessageId,
    pub guild: Option<GuildId>,
    pub channel: ChannelId,
    pub author: Member,
    pub content: String,
    /// Users mentioned by the message, in transport order.
    #[serde(default)]
    pub mentions: Vec<Member>,
    /// Preferred locale of the guild (or of the author for DMs).
    pub locale: String,
}

/// A component interaction (button press, select) on a session's message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentEvent {
    /// Message carrying the component.
    pub message: MessageHandle,
    /// Identifier of the component that was used.
    pub component_id: String,
    /// User who triggered the interaction.
    pub user: Member,
    /// Locale reported by the interacting client.
    pub locale: String,
    /// Selected values for select menus.
    #[serde(default)]
    pub values: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Output Model
// ─────────────────────────────────────────────────────────────────────────────

/// Transport-neutral rendered output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub content: Option<String>,
    pub embed: Option<Embed>,
    #[serde(default)]
    pub components: Vec<Component>,
}

impl Output {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            embed: Some(embed),
            ..Default::default()
        }
    }

    pub fn with_components(mut self, components: Vec<Component>) -> Self {
        self.components = components;
        self
    }

    /// Copy of this output with every interactive affordance removed.
    pub fn without_components(&self) -> Self {
        Self {
            content: self.content.clone(),
            embed: self.embed.clone(),
            components: Vec::new(),
        }
    }

    /// Human readable text of the output, used in diagnostics.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(content) = &self.content {
            parts.push(content.clone());
        }
        if let Some(embed) = &self.embed {
            if let Some(title) = &embed.title {
                parts.push(title.clone());
            }
            if let Some(description) = &embed.description {
                parts.push(description.clone());
            }
        }
        parts.join("\n")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub footer: Option<String>,
    pub color: Option<u32>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonStyle {
    Primary,
    #[default]
    Secondary,
    Success,
    Danger,
}

/// An interactive affordance attached to a rendered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub label: String,
    pub style: ButtonStyle,
    pub emoji: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

impl Component {
    pub fn button(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            style: ButtonStyle::default(),
            emoji: None,
            disabled: false,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = style;
        self
    }

    pub fn emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}
