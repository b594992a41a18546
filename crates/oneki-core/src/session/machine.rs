//! The per-session state machine.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::guard::AuthorizationGuard;
use super::report::FailureReport;
use super::{Capabilities, EventContext, Flow, SessionId, SessionOptions, SessionState, View};
use crate::error::{Error, Result};
use crate::host::SessionHost;
use crate::i18n::{Bundle, Translations};
use crate::types::{ButtonStyle, ChannelId, Component, ComponentEvent, MessageHandle, Output};

/// Component id of the exit button rendered by exitable sessions.
pub const EXIT_COMPONENT: &str = "__exit";

/// Result of dispatching one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Handled and re-rendered; the session is active again.
    Handled,
    /// The session closed as a result of the event.
    Closed,
    /// The handler failed; the session is closed.
    Faulted(FailureReport),
}

/// One interactive component's lifecycle.
pub struct Session {
    id: SessionId,
    options: SessionOptions,
    capabilities: Capabilities,
    state: SessionState,
    view: Box<dyn View>,
    bundle: Bundle,
    generic: Bundle,
    handle: Option<MessageHandle>,
    last_render: Option<Output>,
    deadline: Instant,
    host: Arc<dyn SessionHost>,
    guard: AuthorizationGuard,
}

impl Session {
    /// Create a session in the `Created` state.
    pub fn create(
        view: impl View,
        options: SessionOptions,
        host: Arc<dyn SessionHost>,
        translations: Arc<Translations>,
    ) -> Self {
        let bundle = match view.scope() {
            Some(scope) => translations.bundle(&options.locale, scope),
            None => Bundle::empty(""),
        };
        let generic = translations.bundle(&options.locale, "generic");
        let deadline = Instant::now() + options.timeout;

        Self {
            id: SessionId::new(),
            capabilities: view.capabilities(),
            state: SessionState::Created,
            view: Box::new(view),
            bundle,
            generic,
            handle: None,
            last_render: None,
            deadline,
            guard: AuthorizationGuard::new(Arc::clone(&host), translations),
            host,
            options,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Handle of the delivered message, once started
    pub fn handle(&self) -> Option<MessageHandle> {
        self.handle
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn last_render(&self) -> Option<&Output> {
        self.last_render.as_ref()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Render the initial output and hand it to the transport.
    ///
    /// A transport failure closes the session.
    pub async fn start(&mut self, channel: ChannelId) -> Result<MessageHandle> {
        if self.state != SessionState::Created {
            return Err(Error::SessionClosed(self.id.to_string()));
        }

        let (output, condition_failed) = self.compose();
        let handle = match self.host.render(channel, output.clone(), None).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Initial render failed, closing session");
                self.state = SessionState::Closed;
                return Err(e.into());
            }
        };

        self.handle = Some(handle);
        self.last_render = Some(output);
        self.deadline = Instant::now() + self.options.timeout;

        if condition_failed {
            self.state = SessionState::Closed;
            info!(session_id = %self.id, view = self.view.name(), "Session closed on first render");
        } else {
            self.state = SessionState::Active;
            info!(
                session_id = %self.id,
                view = self.view.name(),
                message = %handle,
                owner = %self.options.owner,
                "Session started"
            );
        }
        Ok(handle)
    }

    /// Run one component event through the guard and the view's handler.
    pub async fn dispatch(&mut self, event: ComponentEvent) -> Result<Dispatch> {
        match self.state {
            SessionState::Active => {}
            SessionState::Closed | SessionState::Terminating => {
                return Err(Error::SessionClosed(self.id.to_string()));
            }
            SessionState::Created | SessionState::AwaitingEvent => {
                return Err(Error::Other(format!(
                    "session {} cannot accept events while {}",
                    self.id, self.state
                )));
            }
        }

        self.guard.authorize(&event, &self.options.policy()).await?;

        self.state = SessionState::AwaitingEvent;
        debug!(session_id = %self.id, component = %event.component_id, user = %event.user.id, "Dispatching event");

        if self.capabilities.exit_affordance && event.component_id == EXIT_COMPONENT {
            self.close().await;
            return Ok(Dispatch::Closed);
        }

        let flow = {
            let ctx = EventContext {
                event: &event,
                host: self.host.as_ref(),
                bundle: &self.bundle,
                component: self.bundle.nested(&event.component_id),
            };
            AssertUnwindSafe(self.view.handle(&ctx)).catch_unwind().await
        };

        match flow {
            Ok(Ok(Flow::Continue)) => self.rerender().await,
            Ok(Ok(Flow::Stop)) => {
                self.close().await;
                Ok(Dispatch::Closed)
            }
            Ok(Err(e)) => {
                let report = FailureReport::from_error(
                    self.id,
                    &e,
                    &event,
                    self.origin(),
                    self.fault_context(&event),
                );
                Ok(self.fault(report).await)
            }
            Err(payload) => {
                let report = FailureReport::from_panic(
                    self.id,
                    payload.as_ref(),
                    &event,
                    self.origin(),
                    self.fault_context(&event),
                );
                Ok(self.fault(report).await)
            }
        }
    }

    /// Close after the deadline passed without an event.
    ///
    /// Strips every component from the rendered output. The owner is only
    /// notified when the session asked for it.
    pub async fn expire(&mut self) {
        if self.is_closed() {
            return;
        }
        self.state = SessionState::Terminating;
        self.view.on_timeout().await;
        self.strip_components().await;

        if self.options.notify_on_timeout {
            if let Some(handle) = self.handle {
                let notice = Output::text(self.generic.get("timed_out"));
                if let Err(e) = self.host.render(handle.channel, notice, None).await {
                    warn!(session_id = %self.id, error = %e, "Failed to post timeout notice");
                }
            }
        }

        self.state = SessionState::Closed;
        info!(session_id = %self.id, view = self.view.name(), "Session timed out");
    }

    /// Close the session. Closing a closed session is a no-op.
    pub async fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.state = SessionState::Terminating;
        self.strip_components().await;
        self.state = SessionState::Closed;
        info!(session_id = %self.id, view = self.view.name(), "Session closed");
    }

    /// Current output plus the exit button, and whether the dependent
    /// condition failed (in which case the output has no components).
    fn compose(&self) -> (Output, bool) {
        let mut output = self.view.render(&self.bundle);
        if self.capabilities.rerender_on_condition && !self.view.condition_holds() {
            return (output.without_components(), true);
        }
        if self.capabilities.exit_affordance {
            output.components.push(
                Component::button(EXIT_COMPONENT, self.generic.get("exit"))
                    .style(ButtonStyle::Danger),
            );
        }
        (output, false)
    }

    async fn rerender(&mut self) -> Result<Dispatch> {
        let (output, condition_failed) = self.compose();
        let Some(handle) = self.handle else {
            return Err(Error::Other(format!("session {} was never rendered", self.id)));
        };

        if let Err(e) = self.host.edit(handle, output.clone()).await {
            warn!(session_id = %self.id, error = %e, "Re-render failed, closing session");
            self.state = SessionState::Closed;
            return Err(e.into());
        }
        self.last_render = Some(output);

        if condition_failed {
            self.state = SessionState::Closed;
            info!(session_id = %self.id, view = self.view.name(), "Dependent condition gone, session closed");
            return Ok(Dispatch::Closed);
        }

        self.deadline = Instant::now() + self.options.timeout;
        self.state = SessionState::Active;
        Ok(Dispatch::Handled)
    }

    async fn fault(&mut self, report: FailureReport) -> Dispatch {
        error!(
            session_id = %self.id,
            view = self.view.name(),
            kind = %report.kind,
            error = %report.message,
            "Handler fault, closing session"
        );
        self.strip_components().await;
        self.state = SessionState::Closed;
        Dispatch::Faulted(report)
    }

    /// Edit the delivered message so stale components can't be driven.
    async fn strip_components(&mut self) {
        let (Some(handle), Some(last)) = (self.handle, self.last_render.as_ref()) else {
            return;
        };
        if last.components.is_empty() {
            return;
        }
        let stripped = last.without_components();
        match self.host.edit(handle, stripped.clone()).await {
            Ok(()) => self.last_render = Some(stripped),
            Err(e) => warn!(session_id = %self.id, error = %e, "Failed to detach components"),
        }
    }

    fn origin(&self) -> String {
        self.last_render
            .as_ref()
            .map(Output::summary)
            .unwrap_or_default()
    }

    fn fault_context(&self, event: &ComponentEvent) -> Vec<String> {
        vec![
            format!("view: {}", self.view.name()),
            format!("component: {}", event.component_id),
            format!("scope: {}", self.view.scope().unwrap_or("-")),
            format!("locale: {}", self.options.locale),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::RecordingHost;
    use crate::session::testing::Counter;
    use crate::types::{Member, UserId};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const OWNER: u64 = 10;

    fn translations() -> Arc<Translations> {
        Arc::new(Translations::builtin().unwrap())
    }

    fn event(handle: MessageHandle, component: &str, user: u64) -> ComponentEvent {
        ComponentEvent {
            message: handle,
            component_id: component.into(),
            user: Member::new(user, "user"),
            locale: "en".into(),
            values: vec![],
        }
    }

    async fn started(view: Counter, host: &Arc<RecordingHost>) -> (Session, MessageHandle) {
        let mut session = Session::create(
            view,
            SessionOptions::new(UserId(OWNER)),
            host.clone(),
            translations(),
        );
        let handle = session.start(ChannelId(1)).await.unwrap();
        (session, handle)
    }

    #[tokio::test]
    async fn test_create_then_start() {
        let host = Arc::new(RecordingHost::new());
        let mut session = Session::create(
            Counter::new(),
            SessionOptions::new(UserId(OWNER)),
            host.clone(),
            translations(),
        );
        assert_eq!(session.state(), SessionState::Created);

        session.start(ChannelId(1)).await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        let renders = host.renders();
        assert_eq!(renders.len(), 1);
        assert_eq!(renders[0].1.content.as_deref(), Some("count: 0"));
        assert_eq!(renders[0].1.components.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_initial_render_closes() {
        let host = Arc::new(RecordingHost::new());
        host.fail_renders.store(true, Ordering::SeqCst);
        let mut session = Session::create(
            Counter::new(),
            SessionOptions::new(UserId(OWNER)),
            host.clone(),
            translations(),
        );
        let err = session.start(ChannelId(1)).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(session.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_rerenders_and_resets_deadline() {
        let host = Arc::new(RecordingHost::new());
        let (mut session, handle) = started(Counter::new(), &host).await;
        let first_deadline = session.deadline();

        tokio::time::advance(Duration::from_secs(30)).await;

        let outcome = session.dispatch(event(handle, "inc", OWNER)).await.unwrap();
        assert_eq!(outcome, Dispatch::Handled);
        assert_eq!(session.state(), SessionState::Active);
        assert!(session.deadline() > first_deadline);

        let edits = host.edits();
        assert_eq!(edits.last().unwrap().1.content.as_deref(), Some("count: 1"));
    }

    #[tokio::test]
    async fn test_unauthorized_event_leaves_session_untouched() {
        let host = Arc::new(RecordingHost::new());
        let (mut session, handle) = started(Counter::new(), &host).await;

        let err = session.dispatch(event(handle, "inc", 99)).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));
        assert_eq!(session.state(), SessionState::Active);
        assert!(host.edits().is_empty());
        assert_eq!(host.ephemerals().len(), 1);
    }

    #[tokio::test]
    async fn test_public_session_accepts_anyone() {
        let host = Arc::new(RecordingHost::new());
        let mut session = Session::create(
            Counter::new(),
            SessionOptions::new(UserId(OWNER)).public(true),
            host.clone(),
            translations(),
        );
        let handle = session.start(ChannelId(1)).await.unwrap();
        let outcome = session.dispatch(event(handle, "inc", 99)).await.unwrap();
        assert_eq!(outcome, Dispatch::Handled);
    }

    #[tokio::test]
    async fn test_handler_error_closes_with_report() {
        let host = Arc::new(RecordingHost::new());
        let (mut session, handle) = started(Counter::new(), &host).await;

        let outcome = session.dispatch(event(handle, "boom", OWNER)).await.unwrap();
        let Dispatch::Faulted(report) = outcome else {
            panic!("expected a fault, got {outcome:?}");
        };
        assert_eq!(report.kind, "Other");
        assert_eq!(report.message, "counter exploded");
        assert_eq!(report.origin, "count: 0");
        assert!(report.context.contains(&"component: boom".to_string()));
        assert_eq!(session.state(), SessionState::Closed);

        // Components are detached from the faulted message
        assert!(host.edits().last().unwrap().1.components.is_empty());
    }

    #[tokio::test]
    async fn test_handler_panic_closes_with_report() {
        let host = Arc::new(RecordingHost::new());
        let (mut session, handle) = started(Counter::new(), &host).await;

        let outcome = session.dispatch(event(handle, "panic", OWNER)).await.unwrap();
        let Dispatch::Faulted(report) = outcome else {
            panic!("expected a fault, got {outcome:?}");
        };
        assert_eq!(report.kind, "HandlerFault");
        assert_eq!(report.message, "Handler fault: counter panicked");
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_events() {
        let host = Arc::new(RecordingHost::new());
        let (mut session, handle) = started(Counter::new(), &host).await;
        session.close().await;

        let err = session.dispatch(event(handle, "inc", OWNER)).await.unwrap_err();
        assert!(matches!(err, Error::SessionClosed(_)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let host = Arc::new(RecordingHost::new());
        let (mut session, _) = started(Counter::new(), &host).await;

        session.close().await;
        session.close().await;
        assert!(session.is_closed());
        assert_eq!(host.edits().len(), 1);
    }

    #[tokio::test]
    async fn test_expire_strips_components_silently() {
        let host = Arc::new(RecordingHost::new());
        let (mut session, _) = started(Counter::new(), &host).await;

        session.expire().await;
        assert!(session.is_closed());
        assert_eq!(host.renders().len(), 1);
        let (_, output) = host.edits().pop().unwrap();
        assert!(output.components.is_empty());
        assert_eq!(output.content.as_deref(), Some("count: 0"));
    }

    #[tokio::test]
    async fn test_expire_notifies_when_asked() {
        let host = Arc::new(RecordingHost::new());
        let mut session = Session::create(
            Counter::new(),
            SessionOptions::new(UserId(OWNER)).notify_on_timeout(true),
            host.clone(),
            translations(),
        );
        session.start(ChannelId(1)).await.unwrap();
        session.expire().await;

        let renders = host.renders();
        assert_eq!(renders.len(), 2);
        assert_eq!(renders[1].1.content.as_deref(), Some("This menu timed out."));
    }

    #[tokio::test]
    async fn test_exit_affordance() {
        let host = Arc::new(RecordingHost::new());
        let view = Counter {
            capabilities: Capabilities::exitable(),
            ..Counter::new()
        };
        let (mut session, handle) = started(view, &host).await;

        let rendered = &host.renders()[0].1;
        let exit = rendered.components.last().unwrap();
        assert_eq!(exit.id, EXIT_COMPONENT);
        assert_eq!(exit.label, "Exit");

        let outcome = session.dispatch(event(handle, EXIT_COMPONENT, OWNER)).await.unwrap();
        assert_eq!(outcome, Dispatch::Closed);
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_exit_component_without_capability_goes_to_view() {
        let host = Arc::new(RecordingHost::new());
        let (mut session, handle) = started(Counter::new(), &host).await;

        let outcome = session.dispatch(event(handle, EXIT_COMPONENT, OWNER)).await.unwrap();
        assert_eq!(outcome, Dispatch::Handled);
    }

    #[tokio::test]
    async fn test_condition_change_closes_on_next_render() {
        let host = Arc::new(RecordingHost::new());
        let view = Counter {
            capabilities: Capabilities::conditional(),
            ..Counter::new()
        };
        let present = Arc::clone(&view.present);
        let (mut session, handle) = started(view, &host).await;

        present.store(false, Ordering::SeqCst);
        let outcome = session.dispatch(event(handle, "inc", OWNER)).await.unwrap();
        assert_eq!(outcome, Dispatch::Closed);
        assert!(session.is_closed());

        let (_, output) = host.edits().pop().unwrap();
        assert!(output.components.is_empty());
        assert_eq!(output.content.as_deref(), Some("count: 1"));
    }

    #[tokio::test]
    async fn test_stop_flow_closes() {
        let host = Arc::new(RecordingHost::new());
        let (mut session, handle) = started(Counter::new(), &host).await;
        let outcome = session.dispatch(event(handle, "stop", OWNER)).await.unwrap();
        assert_eq!(outcome, Dispatch::Closed);
    }

    #[tokio::test]
    async fn test_failed_rerender_closes() {
        let host = Arc::new(RecordingHost::new());
        let (mut session, handle) = started(Counter::new(), &host).await;
        host.fail_edits.store(true, Ordering::SeqCst);

        assert!(session.dispatch(event(handle, "inc", OWNER)).await.is_err());
        assert!(session.is_closed());
    }
}
