//! Authorization of component events.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::host::SessionHost;
use crate::i18n::Translations;
use crate::types::{ComponentEvent, Output, UserId};

/// Who may drive a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    pub owner: UserId,
    pub public: bool,
}

/// Decides whether an event may drive a session and tells the user when not.
#[derive(Clone)]
pub struct AuthorizationGuard {
    host: Arc<dyn SessionHost>,
    translations: Arc<Translations>,
}

impl AuthorizationGuard {
    pub fn new(host: Arc<dyn SessionHost>, translations: Arc<Translations>) -> Self {
        Self { host, translations }
    }

    /// Only the owner may drive a session unless it is public.
    pub fn allowed(event: &ComponentEvent, policy: &AccessPolicy) -> bool {
        policy.public || event.user.id == policy.owner
    }

    /// Check an event, posting the localized "not yours" notice on rejection.
    ///
    /// Never alters the session; a failed notice is only logged.
    pub async fn authorize(&self, event: &ComponentEvent, policy: &AccessPolicy) -> Result<()> {
        if Self::allowed(event, policy) {
            return Ok(());
        }

        debug!(
            user = %event.user.id,
            owner = %policy.owner,
            message = %event.message,
            "Rejected component event from non-owner"
        );
        let notice = self
            .translations
            .bundle(&event.locale, "generic")
            .format("user_check", &[&event.user.mention()]);
        if let Err(e) = self.host.respond_ephemeral(event, Output::text(notice)).await {
            warn!(user = %event.user.id, error = %e, "Failed to send authorization notice");
        }

        Err(Error::Unauthorized {
            session: event.message.to_string(),
            user: event.user.id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::RecordingHost;
    use crate::types::{ChannelId, Member, MessageHandle, MessageId};

    fn event(user: u64) -> ComponentEvent {
        ComponentEvent {
            message: MessageHandle {
                channel: ChannelId(1),
                message: MessageId(2),
            },
            component_id: "inc".into(),
            user: Member::new(user, "someone"),
            locale: "en-US".into(),
            values: vec![],
        }
    }

    fn policy(public: bool) -> AccessPolicy {
        AccessPolicy {
            owner: UserId(10),
            public,
        }
    }

    #[test]
    fn test_allowed() {
        assert!(AuthorizationGuard::allowed(&event(10), &policy(false)));
        assert!(!AuthorizationGuard::allowed(&event(11), &policy(false)));
        assert!(AuthorizationGuard::allowed(&event(11), &policy(true)));
    }

    #[tokio::test]
    async fn test_rejection_sends_localized_notice() {
        let host = Arc::new(RecordingHost::new());
        let guard = AuthorizationGuard::new(
            host.clone(),
            Arc::new(Translations::builtin().unwrap()),
        );

        let err = guard.authorize(&event(11), &policy(false)).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));

        let notices = host.ephemerals();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].0, UserId(11));
        let content = notices[0].1.content.clone().unwrap();
        assert!(content.contains("isn't yours"));
        assert!(content.contains("<@11>"));
    }

    #[tokio::test]
    async fn test_owner_passes_silently() {
        let host = Arc::new(RecordingHost::new());
        let guard = AuthorizationGuard::new(
            host.clone(),
            Arc::new(Translations::builtin().unwrap()),
        );
        guard.authorize(&event(10), &policy(false)).await.unwrap();
        assert!(host.calls().is_empty());
    }
}
