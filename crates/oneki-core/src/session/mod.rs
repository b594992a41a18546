//! Interactive component sessions.
//!
//! A session is the server-side lifecycle of one message carrying
//! interactive components. Its content comes from a [`View`]; the
//! [`Session`] state machine owns the view and drives it:
//!
//! ```text
//! Created --start--> Active --dispatch--> AwaitingEvent --handled--> Active
//!                      |                       |
//!                      |                       +--fault/stop--> Closed
//!                      +--expire/close--> Terminating --> Closed
//! ```
//!
//! The [`SessionManager`] runs each started session on its own task. Events
//! for one session are queued on that task and handled in arrival order; the
//! timeout timer is rescheduled after every accepted event.

mod guard;
mod machine;
mod report;
mod runtime;
pub mod views;

pub use guard::{AccessPolicy, AuthorizationGuard};
pub use machine::{Dispatch, EXIT_COMPONENT, Session};
pub use report::{FailureReport, report_failure};
pub use runtime::{SessionConfig, SessionManager, StartedSession};
pub use views::{Confirm, ConfirmAnswer, ReportBug};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::host::SessionHost;
use crate::i18n::{Bundle, DEFAULT_LOCALE};
use crate::types::{ComponentEvent, Output, UserId};

/// Default inactivity timeout of a session.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(320);

/// Opaque session identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Active,
    AwaitingEvent,
    Terminating,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::AwaitingEvent => "awaiting_event",
            Self::Terminating => "terminating",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Optional behaviours of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Render an always-visible exit button that closes the session.
    pub exit_affordance: bool,
    /// Close quietly, without components, once `View::condition_holds` is false.
    pub rerender_on_condition: bool,
}

impl Capabilities {
    pub fn exitable() -> Self {
        Self {
            exit_affordance: true,
            ..Self::default()
        }
    }

    pub fn conditional() -> Self {
        Self {
            rerender_on_condition: true,
            ..Self::default()
        }
    }
}

/// Who may drive a session and how long it lives.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub owner: UserId,
    pub locale: String,
    /// Anyone may drive a public session.
    pub public: bool,
    pub timeout: Duration,
    /// Post a timeout notice when the session expires.
    pub notify_on_timeout: bool,
}

impl SessionOptions {
    pub fn new(owner: UserId) -> Self {
        Self {
            owner,
            locale: DEFAULT_LOCALE.to_string(),
            public: false,
            timeout: DEFAULT_TIMEOUT,
            notify_on_timeout: false,
        }
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn notify_on_timeout(mut self, notify: bool) -> Self {
        self.notify_on_timeout = notify;
        self
    }

    pub fn policy(&self) -> AccessPolicy {
        AccessPolicy {
            owner: self.owner,
            public: self.public,
        }
    }
}

/// What a handler wants the session to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Re-render and wait for the next event.
    Continue,
    /// Close the session.
    Stop,
}

/// Everything a handler sees while processing one event.
pub struct EventContext<'a> {
    pub event: &'a ComponentEvent,
    pub host: &'a dyn SessionHost,
    /// Bundle of the view's translation scope
    pub bundle: &'a Bundle,
    /// Entries of the scope named after the component, if any
    pub component: Option<Bundle>,
}

impl EventContext<'_> {
    /// Answer the interaction with a notice only its author sees.
    pub async fn reply_ephemeral(&self, content: impl Into<String> + Send) -> Result<()> {
        self.host
            .respond_ephemeral(self.event, Output::text(content))
            .await?;
        Ok(())
    }
}

/// Content and behaviour of an interactive component.
#[async_trait]
pub trait View: Send + 'static {
    /// Name used in logs and failure reports
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Translation scope of the view; `None` renders without localization.
    fn scope(&self) -> Option<&'static str> {
        None
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Produce the current output, components included.
    fn render(&self, bundle: &Bundle) -> Output;

    /// Handle one authorized component event.
    async fn handle(&mut self, ctx: &EventContext<'_>) -> Result<Flow>;

    /// Dependent condition checked before each render when the session has
    /// the `rerender_on_condition` capability.
    fn condition_holds(&self) -> bool {
        true
    }

    /// Called once when the session expires.
    async fn on_timeout(&mut self) {}
}

#[cfg(test)]
pub(crate) mod testing {
    //! Views used by the session tests.

    use super::*;
    use crate::error::Error;
    use crate::types::Component;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Counts presses of its `inc` button; `boom` fails, `panic` panics,
    /// `stop` closes.
    #[derive(Default)]
    pub(crate) struct Counter {
        pub(crate) count: usize,
        pub(crate) capabilities: Capabilities,
        pub(crate) present: Arc<AtomicBool>,
        pub(crate) handled: Arc<Mutex<Vec<String>>>,
        pub(crate) in_flight: Arc<AtomicUsize>,
        pub(crate) max_in_flight: Arc<AtomicUsize>,
        pub(crate) delay: Option<Duration>,
    }

    impl Counter {
        pub(crate) fn new() -> Self {
            Self {
                present: Arc::new(AtomicBool::new(true)),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl View for Counter {
        fn name(&self) -> &'static str {
            "Counter"
        }

        fn capabilities(&self) -> Capabilities {
            self.capabilities
        }

        fn render(&self, _bundle: &Bundle) -> Output {
            Output::text(format!("count: {}", self.count)).with_components(vec![
                Component::button("inc", "+1"),
                Component::button("boom", "fail"),
            ])
        }

        async fn handle(&mut self, ctx: &EventContext<'_>) -> Result<Flow> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.handled
                .lock()
                .unwrap()
                .push(ctx.event.component_id.clone());

            match ctx.event.component_id.as_str() {
                "inc" => {
                    self.count += 1;
                    Ok(Flow::Continue)
                }
                "boom" => Err(Error::Other("counter exploded".into())),
                "panic" => panic!("counter panicked"),
                "stop" => Ok(Flow::Stop),
                _ => Ok(Flow::Continue),
            }
        }

        fn condition_holds(&self) -> bool {
            self.present.load(Ordering::SeqCst)
        }
    }
}
