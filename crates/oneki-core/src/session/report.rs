//! Handler fault diagnostics and the bug-report follow-up session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;

use super::views::ReportBug;
use super::{SessionId, SessionOptions};
use crate::error::Error;
use crate::types::{ChannelId, ComponentEvent, UserId};

/// Diagnostic bundle captured when a handler fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub session: SessionId,
    /// Error kind (`Persistence`, `HandlerFault`, `Other`, ...)
    pub kind: String,
    pub message: String,
    /// Text of the output the user was interacting with
    pub origin: String,
    /// Where the fault happened: view, component, state
    pub context: Vec<String>,
    pub user: UserId,
    pub locale: String,
    pub channel: ChannelId,
    pub at: DateTime<Utc>,
}

impl FailureReport {
    pub(crate) fn from_error(
        session: SessionId,
        error: &Error,
        event: &ComponentEvent,
        origin: String,
        context: Vec<String>,
    ) -> Self {
        Self::new(session, error.kind(), error.to_string(), event, origin, context)
    }

    /// A panic payload becomes an `Error::HandlerFault`.
    pub(crate) fn from_panic(
        session: SessionId,
        payload: &(dyn Any + Send),
        event: &ComponentEvent,
        origin: String,
        context: Vec<String>,
    ) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::from_error(session, &Error::HandlerFault(message), event, origin, context)
    }

    fn new(
        session: SessionId,
        kind: &str,
        message: String,
        event: &ComponentEvent,
        origin: String,
        context: Vec<String>,
    ) -> Self {
        Self {
            session,
            kind: kind.to_string(),
            message,
            origin,
            context,
            user: event.user.id,
            locale: event.locale.clone(),
            channel: event.message.channel,
            at: Utc::now(),
        }
    }

    /// One-line description, `Kind: message`
    pub fn headline(&self) -> String {
        format!("{}: {}", self.kind, self.message)
    }

    /// Multi-line detail block used when filing the report.
    pub fn detail(&self) -> String {
        let mut lines = vec![
            format!("session: {}", self.session),
            format!("user: {}", self.user),
            format!("at: {}", self.at.to_rfc3339()),
        ];
        lines.extend(self.context.iter().cloned());
        if !self.origin.is_empty() {
            lines.push(format!("origin: {}", self.origin));
        }
        lines.join("\n")
    }
}

/// Build the follow-up session offering to file a failure report.
///
/// The session belongs to the user whose event triggered the fault and is
/// posted in the channel where it happened.
pub fn report_failure(
    report: FailureReport,
    report_channel: Option<ChannelId>,
) -> (ReportBug, SessionOptions) {
    let options = SessionOptions::new(report.user).locale(report.locale.clone());
    (ReportBug::new(report, report_channel), options)
}
