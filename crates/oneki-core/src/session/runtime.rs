//! Session registry and per-session tasks.
//!
//! Every started session runs on its own task that owns the [`Session`].
//! The task waits on its command queue and on the session deadline:
//!
//! - queued events are dispatched one at a time, in arrival order
//! - the deadline is re-read after every command, so an accepted event
//!   reschedules the timer
//! - once the session is closed the task unregisters it, answers whatever is
//!   still queued with `SessionClosed` and exits, releasing the timer

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::machine::{Dispatch, Session};
use super::report::report_failure;
use super::{DEFAULT_TIMEOUT, FailureReport, SessionId, SessionOptions, View};
use crate::error::{Error, Result};
use crate::host::SessionHost;
use crate::i18n::Translations;
use crate::types::{ChannelId, ComponentEvent, MessageHandle, UserId};

/// Queue depth per session
const COMMAND_BUFFER: usize = 32;

/// Settings shared by every session of a manager.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub timeout: Duration,
    /// Channel that receives filed bug reports
    pub report_channel: Option<ChannelId>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            report_channel: None,
        }
    }
}

enum Command {
    Event {
        event: ComponentEvent,
        reply: oneshot::Sender<Result<Dispatch>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

struct SessionEntry {
    id: SessionId,
    commands: mpsc::Sender<Command>,
}

type Registry = Arc<RwLock<HashMap<MessageHandle, SessionEntry>>>;

/// A session that was started and handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartedSession {
    pub id: SessionId,
    pub message: MessageHandle,
}

/// Starts sessions and routes component events to them.
#[derive(Clone)]
pub struct SessionManager {
    host: Arc<dyn SessionHost>,
    translations: Arc<Translations>,
    config: SessionConfig,
    sessions: Registry,
}

impl SessionManager {
    pub fn new(
        host: Arc<dyn SessionHost>,
        translations: Arc<Translations>,
        config: SessionConfig,
    ) -> Self {
        Self {
            host,
            translations,
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Options for a new session owned by `owner`, with the configured timeout.
    pub fn options(&self, owner: UserId) -> SessionOptions {
        SessionOptions::new(owner).timeout(self.config.timeout)
    }

    /// Create and start a session, then run it until it closes.
    pub async fn start(
        &self,
        view: impl View,
        options: SessionOptions,
        channel: ChannelId,
    ) -> Result<StartedSession> {
        let mut session = Session::create(
            view,
            options,
            Arc::clone(&self.host),
            Arc::clone(&self.translations),
        );
        let message = session.start(channel).await?;
        let id = session.id();

        if session.is_closed() {
            return Ok(StartedSession { id, message });
        }

        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        self.sessions
            .write()
            .await
            .insert(message, SessionEntry { id, commands });

        tokio::spawn(run_session(session, receiver, Arc::clone(&self.sessions)));
        Ok(StartedSession { id, message })
    }

    /// Deliver a component event to the session owning its message.
    ///
    /// Waits until the event is handled. A faulted handler starts the
    /// bug-report follow-up session before returning.
    pub async fn route(&self, event: ComponentEvent) -> Result<Dispatch> {
        let message = event.message;
        let commands = self
            .sessions
            .read()
            .await
            .get(&message)
            .map(|entry| entry.commands.clone())
            .ok_or_else(|| Error::SessionNotFound(message.to_string()))?;

        let channel = message.channel;
        let (reply, answer) = oneshot::channel();
        commands
            .send(Command::Event { event, reply })
            .await
            .map_err(|_| Error::SessionClosed(message.to_string()))?;
        let outcome = answer
            .await
            .map_err(|_| Error::SessionClosed(message.to_string()))??;

        if let Dispatch::Faulted(report) = &outcome {
            self.offer_report(report.clone(), channel).await;
        }
        Ok(outcome)
    }

    /// Close the session owning `message`.
    pub async fn close(&self, message: MessageHandle) -> Result<()> {
        let commands = self
            .sessions
            .read()
            .await
            .get(&message)
            .map(|entry| entry.commands.clone())
            .ok_or_else(|| Error::SessionNotFound(message.to_string()))?;

        let (reply, done) = oneshot::channel();
        if commands.send(Command::Close { reply }).await.is_err() {
            return Ok(());
        }
        let _ = done.await;
        Ok(())
    }

    /// Whether a live session owns `message`
    pub async fn is_active(&self, message: &MessageHandle) -> bool {
        self.sessions.read().await.contains_key(message)
    }

    /// Number of live sessions
    pub async fn active(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Close every live session.
    pub async fn shutdown(&self) {
        let messages: Vec<MessageHandle> = self.sessions.read().await.keys().copied().collect();
        info!(count = messages.len(), "Closing live sessions");
        for message in messages {
            let _ = self.close(message).await;
        }
    }

    async fn offer_report(&self, report: FailureReport, channel: ChannelId) {
        let session = report.session;
        let (view, options) = report_failure(report, self.config.report_channel);
        let options = options.timeout(self.config.timeout);
        if let Err(e) = self.start(view, options, channel).await {
            warn!(session_id = %session, error = %e, "Failed to offer bug report");
        }
    }
}

async fn run_session(
    mut session: Session,
    mut commands: mpsc::Receiver<Command>,
    sessions: Registry,
) {
    let id = session.id();

    while !session.is_closed() {
        let deadline = session.deadline();
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Event { event, reply }) => {
                    let outcome = session.dispatch(event).await;
                    if let Err(e) = &outcome {
                        debug!(session_id = %id, error = %e, "Event not handled");
                    }
                    let _ = reply.send(outcome);
                }
                Some(Command::Close { reply }) => {
                    session.close().await;
                    let _ = reply.send(());
                }
                None => session.close().await,
            },
            _ = tokio::time::sleep_until(deadline) => session.expire().await,
        }
    }

    if let Some(message) = session.handle() {
        let mut sessions = sessions.write().await;
        if sessions.get(&message).is_some_and(|entry| entry.id == id) {
            sessions.remove(&message);
        }
    }

    commands.close();
    while let Ok(command) = commands.try_recv() {
        match command {
            Command::Event { reply, .. } => {
                let _ = reply.send(Err(Error::SessionClosed(id.to_string())));
            }
            Command::Close { reply } => {
                let _ = reply.send(());
            }
        }
    }
    debug!(session_id = %id, "Session task finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::RecordingHost;
    use crate::session::testing::Counter;
    use crate::types::{Member, MessageId};
    use futures::future::join_all;
    use std::sync::atomic::Ordering;

    const OWNER: u64 = 10;

    fn manager(host: &Arc<RecordingHost>) -> SessionManager {
        SessionManager::new(
            host.clone(),
            Arc::new(Translations::builtin().unwrap()),
            SessionConfig {
                timeout: Duration::from_secs(60),
                report_channel: Some(ChannelId(500)),
            },
        )
    }

    fn event(message: MessageHandle, component: &str, user: u64) -> ComponentEvent {
        ComponentEvent {
            message,
            component_id: component.into(),
            user: Member::new(user, "user"),
            locale: "en".into(),
            values: vec![],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_to_started_session() {
        let host = Arc::new(RecordingHost::new());
        let manager = manager(&host);
        let started = manager
            .start(Counter::new(), manager.options(UserId(OWNER)), ChannelId(1))
            .await
            .unwrap();

        let outcome = manager.route(event(started.message, "inc", OWNER)).await.unwrap();
        assert_eq!(outcome, Dispatch::Handled);
        assert_eq!(manager.active().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_message_is_not_found() {
        let host = Arc::new(RecordingHost::new());
        let manager = manager(&host);
        let message = MessageHandle {
            channel: ChannelId(1),
            message: MessageId(404),
        };
        let err = manager.route(event(message, "inc", OWNER)).await.unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_for_one_session_never_overlap() {
        let host = Arc::new(RecordingHost::new());
        let manager = manager(&host);
        let view = Counter {
            delay: Some(Duration::from_millis(50)),
            ..Counter::new()
        };
        let handled = Arc::clone(&view.handled);
        let max_in_flight = Arc::clone(&view.max_in_flight);
        let started = manager
            .start(view, manager.options(UserId(OWNER)), ChannelId(1))
            .await
            .unwrap();

        let components = ["inc", "a", "b", "c", "inc"];
        let routes = components
            .iter()
            .map(|component| manager.route(event(started.message, component, OWNER)));
        let outcomes = join_all(routes).await;

        assert!(outcomes.iter().all(|outcome| outcome.is_ok()));
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(*handled.lock().unwrap(), components.map(String::from).to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expires_and_rejects_later_events() {
        let host = Arc::new(RecordingHost::new());
        let manager = manager(&host);
        let started = manager
            .start(Counter::new(), manager.options(UserId(OWNER)), ChannelId(1))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(!manager.is_active(&started.message).await);
        let err = manager.route(event(started.message, "inc", OWNER)).await.unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));

        let (_, output) = host.edits().pop().unwrap();
        assert!(output.components.is_empty());
        // Silent timeout: only the initial render
        assert_eq!(host.renders().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_event_reschedules_timeout() {
        let host = Arc::new(RecordingHost::new());
        let manager = manager(&host);
        let started = manager
            .start(Counter::new(), manager.options(UserId(OWNER)), ChannelId(1))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(40)).await;
        manager.route(event(started.message, "inc", OWNER)).await.unwrap();

        // 80s after start, 40s after the event
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert!(manager.is_active(&started.message).await);

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert!(!manager.is_active(&started.message).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_event_does_not_reschedule_timeout() {
        let host = Arc::new(RecordingHost::new());
        let manager = manager(&host);
        let started = manager
            .start(Counter::new(), manager.options(UserId(OWNER)), ChannelId(1))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(40)).await;
        let err = manager.route(event(started.message, "inc", 99)).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert!(!manager.is_active(&started.message).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_closes_and_offers_report() {
        let host = Arc::new(RecordingHost::new());
        let manager = manager(&host);
        let started = manager
            .start(Counter::new(), manager.options(UserId(OWNER)), ChannelId(1))
            .await
            .unwrap();

        let outcome = manager.route(event(started.message, "boom", OWNER)).await.unwrap();
        assert!(matches!(outcome, Dispatch::Faulted(_)));
        assert!(!manager.is_active(&started.message).await);

        // The follow-up session lives in the same channel
        let renders = host.renders();
        assert_eq!(renders.len(), 2);
        let (channel, follow_up, _) = &renders[1];
        assert_eq!(*channel, ChannelId(1));
        assert!(follow_up.content.as_deref().unwrap().contains("counter exploded"));
        assert_eq!(follow_up.components[0].id, "report");
        assert_eq!(manager.active().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_close() {
        let host = Arc::new(RecordingHost::new());
        let manager = manager(&host);
        let started = manager
            .start(Counter::new(), manager.options(UserId(OWNER)), ChannelId(1))
            .await
            .unwrap();

        manager.close(started.message).await.unwrap();
        tokio::task::yield_now().await;
        assert!(!manager.is_active(&started.message).await);

        let err = manager.close(started.message).await.unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_registers_nothing() {
        let host = Arc::new(RecordingHost::new());
        host.fail_renders.store(true, Ordering::SeqCst);
        let manager = manager(&host);

        let result = manager
            .start(Counter::new(), manager.options(UserId(OWNER)), ChannelId(1))
            .await;
        assert!(result.is_err());
        assert_eq!(manager.active().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_all() {
        let host = Arc::new(RecordingHost::new());
        let manager = manager(&host);
        for _ in 0..3 {
            manager
                .start(Counter::new(), manager.options(UserId(OWNER)), ChannelId(1))
                .await
                .unwrap();
        }
        manager.shutdown().await;
        tokio::task::yield_now().await;
        assert_eq!(manager.active().await, 0);
        assert_eq!(host.edits().len(), 3);
    }
}
