//! Built-in views.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::oneshot;
use tracing::error;

use super::{EventContext, FailureReport, Flow, View};
use crate::error::Result;
use crate::i18n::Bundle;
use crate::types::{ButtonStyle, ChannelId, Component, Embed, Output};

// ─────────────────────────────────────────────────────────────────────────────
// Confirm
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves once the owner picks an answer, or with `None` when the
/// session ends without one.
pub struct ConfirmAnswer(oneshot::Receiver<bool>);

impl ConfirmAnswer {
    pub async fn wait(self) -> Option<bool> {
        self.0.await.ok()
    }
}

/// Yes/no prompt with a confirm and a cancel button.
pub struct Confirm {
    content: Option<String>,
    embed: Option<Embed>,
    answer: Option<oneshot::Sender<bool>>,
}

impl Confirm {
    pub fn new(content: impl Into<String>) -> (Self, ConfirmAnswer) {
        Self::build(Some(content.into()), None)
    }

    pub fn with_embed(embed: Embed) -> (Self, ConfirmAnswer) {
        Self::build(None, Some(embed))
    }

    fn build(content: Option<String>, embed: Option<Embed>) -> (Self, ConfirmAnswer) {
        let (sender, receiver) = oneshot::channel();
        let view = Self {
            content,
            embed,
            answer: Some(sender),
        };
        (view, ConfirmAnswer(receiver))
    }
}

#[async_trait]
impl View for Confirm {
    fn name(&self) -> &'static str {
        "Confirm"
    }

    fn scope(&self) -> Option<&'static str> {
        Some("confirm")
    }

    fn render(&self, bundle: &Bundle) -> Output {
        let output = Output {
            content: self.content.clone(),
            embed: self.embed.clone(),
            components: Vec::new(),
        };
        output.with_components(vec![
            Component::button("confirm", bundle.get("confirm.label")).style(ButtonStyle::Danger),
            Component::button("cancel", bundle.get("cancel.label")),
        ])
    }

    async fn handle(&mut self, ctx: &EventContext<'_>) -> Result<Flow> {
        let value = match ctx.event.component_id.as_str() {
            "confirm" => true,
            "cancel" => false,
            _ => return Ok(Flow::Continue),
        };

        if let Some(component) = &ctx.component {
            ctx.reply_ephemeral(component.get("done")).await?;
        }
        if let Some(answer) = self.answer.take() {
            let _ = answer.send(value);
        }
        Ok(Flow::Stop)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ReportBug
// ─────────────────────────────────────────────────────────────────────────────

const REPORT_COLOR: u32 = 0x3498DB;

/// Follow-up offered after a handler fault; files the report on request.
pub struct ReportBug {
    report: FailureReport,
    report_channel: Option<ChannelId>,
}

impl ReportBug {
    pub fn new(report: FailureReport, report_channel: Option<ChannelId>) -> Self {
        Self {
            report,
            report_channel,
        }
    }

    fn filed(&self, bundle: &Bundle, reporter: &str) -> Embed {
        let mut embed = Embed::titled(bundle.get("embed.title"))
            .field(bundle.get("embed.kind"), self.report.kind.clone(), true)
            .field(bundle.get("embed.message"), self.report.message.clone(), false)
            .field(
                bundle.get("embed.detail"),
                format!("```\n{}\n```", self.report.detail()),
                false,
            )
            .color(REPORT_COLOR)
            .timestamp(Utc::now());
        embed.author = Some(reporter.to_string());
        embed
    }
}

#[async_trait]
impl View for ReportBug {
    fn name(&self) -> &'static str {
        "ReportBug"
    }

    fn scope(&self) -> Option<&'static str> {
        Some("report_bug")
    }

    fn render(&self, bundle: &Bundle) -> Output {
        Output::text(bundle.format("content", &[&self.report.headline()])).with_components(vec![
            Component::button("report", bundle.get("report.label"))
                .style(ButtonStyle::Danger)
                .emoji("🪲"),
        ])
    }

    async fn handle(&mut self, ctx: &EventContext<'_>) -> Result<Flow> {
        if ctx.event.component_id != "report" {
            return Ok(Flow::Continue);
        }

        if let Some(component) = &ctx.component {
            ctx.reply_ephemeral(component.get("done")).await?;
        }

        match self.report_channel {
            Some(channel) => {
                let embed = self.filed(ctx.bundle, &ctx.event.user.display_name);
                ctx.host.render(channel, Output::embed(embed), None).await?;
            }
            None => error!(
                session_id = %self.report.session,
                kind = %self.report.kind,
                detail = %self.report.detail(),
                "Bug reported without a report channel"
            ),
        }
        Ok(Flow::Stop)
    }
}
