//! The transport contract.
//!
//! `SessionHost` is implemented by whatever delivers messages to users (a
//! chat gateway, or the console transport of the bot binary). The subsystem
//! only ever renders, edits and posts through it. Inbound events are pushed
//! the other way: the transport calls `SessionManager::route` for component
//! interactions and the message router for plain messages.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::types::{ChannelId, ComponentEvent, GuildId, MessageHandle, Output, UserId};

/// Errors reported by the transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The bot lacks the privilege for the requested side effect.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("message not found: {0}")]
    NotFound(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

pub type HostResult<T> = std::result::Result<T, HostError>;

/// Operations the subsystem needs from the chat transport.
#[async_trait]
pub trait SessionHost: Send + Sync {
    /// Deliver output to a channel and return a handle to the delivered message.
    ///
    /// Transient notices pass `delete_after`; the transport removes them once
    /// the delay elapses.
    async fn render(
        &self,
        channel: ChannelId,
        output: Output,
        delete_after: Option<Duration>,
    ) -> HostResult<MessageHandle>;

    /// Replace the content of a delivered message.
    async fn edit(&self, handle: MessageHandle, output: Output) -> HostResult<()>;

    /// Answer an interaction with a notice only its author can see.
    async fn respond_ephemeral(&self, event: &ComponentEvent, output: Output) -> HostResult<()>;

    /// Change a member's display name in a guild.
    async fn set_nickname(&self, guild: GuildId, user: UserId, nickname: &str) -> HostResult<()>;
}
