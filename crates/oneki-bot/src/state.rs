//! Process-wide application state

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use oneki_core::away::AwayMonitor;
use oneki_core::cache::{AwayCache, AwayScope, BlacklistCache, PrefixCache, ScopedCache};
use oneki_core::i18n::Translations;
use oneki_core::session::SessionManager;
use oneki_core::store::StateStore;
use oneki_core::types::UserId;
use oneki_core::{OnekiConfig, SessionHost};

/// Singletons shared by every handler of the bot.
pub struct AppState {
    pub config: OnekiConfig,
    pub translations: Arc<Translations>,
    pub host: Arc<dyn SessionHost>,
    pub prefixes: Arc<PrefixCache>,
    pub blacklist: Arc<BlacklistCache>,
    pub away: Arc<AwayCache>,
    pub monitor: AwayMonitor,
    pub sessions: SessionManager,
}

impl AppState {
    /// Materialise the caches from the store and wire the services.
    ///
    /// Any load failure is fatal: the bot must not answer commands with a
    /// partial view of the store.
    pub async fn load(
        config: OnekiConfig,
        store: Arc<dyn StateStore>,
        host: Arc<dyn SessionHost>,
        translations: Arc<Translations>,
    ) -> anyhow::Result<Arc<Self>> {
        store.ping().await.context("document store is unreachable")?;

        let prefixes = PrefixCache::load(
            Arc::clone(&store),
            config.prefixes.defaults.clone(),
            config.prefixes.direct_message.clone(),
        )
        .await
        .context("failed to load prefixes")?;
        let blacklist = BlacklistCache::load(Arc::clone(&store))
            .await
            .context("failed to load blacklist")?;
        let away = ScopedCache::load(AwayScope, Arc::clone(&store))
            .await
            .context("failed to load away records")?;

        info!(
            prefixes = prefixes.scope().len().await,
            blacklist = blacklist.scope().len().await,
            away = away.len().await,
            "Caches loaded"
        );

        let away = Arc::new(away);
        let monitor = AwayMonitor::new(
            Arc::clone(&away),
            Arc::clone(&host),
            Arc::clone(&translations),
            config.away_config(),
        );
        let sessions = SessionManager::new(
            Arc::clone(&host),
            Arc::clone(&translations),
            config.session_config(),
        );

        Ok(Arc::new(Self {
            config,
            translations,
            host,
            prefixes: Arc::new(prefixes),
            blacklist: Arc::new(blacklist),
            away,
            monitor,
            sessions,
        }))
    }

    /// The bot's own user id
    pub fn bot_id(&self) -> UserId {
        self.config.bot.user_id
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A bot wired to a memory store and a buffered console.

    use super::*;
    use crate::console::{CONSOLE_CHANNEL, ConsoleHost};
    use crate::router::Router;
    use oneki_core::config::StoreBackend;
    use oneki_core::store::MemoryStateStore;
    use oneki_core::types::{GuildId, InboundMessage, Member, MessageId};
    use std::io::Write;
    use std::sync::Mutex;

    /// Writer whose bytes the test can read back.
    #[derive(Clone, Default)]
    pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    pub(crate) struct TestBot {
        pub(crate) state: Arc<AppState>,
        pub(crate) host: Arc<ConsoleHost>,
        pub(crate) router: Router,
        buffer: SharedBuffer,
    }

    impl TestBot {
        pub(crate) async fn new() -> Self {
            let mut config = OnekiConfig::default();
            config.store.backend = StoreBackend::Memory;
            let buffer = SharedBuffer::default();
            let host = Arc::new(ConsoleHost::with_writer(buffer.clone()));
            let state = AppState::load(
                config,
                Arc::new(MemoryStateStore::new()),
                host.clone(),
                Arc::new(Translations::builtin().unwrap()),
            )
            .await
            .unwrap();
            Self {
                router: Router::new(state.clone()),
                state,
                host,
                buffer,
            }
        }

        pub(crate) fn guild(&self) -> GuildId {
            self.state.config.bot.console_guild
        }

        pub(crate) fn developer(&self) -> UserId {
            self.state.config.bot.dev_user_id
        }

        /// Everything printed so far.
        pub(crate) fn output(&self) -> String {
            self.buffer.contents()
        }
    }

    /// A message from the developer in `guild`.
    pub(crate) fn message(guild: GuildId, content: &str) -> InboundMessage {
        InboundMessage {
            id: MessageId(100),
            guild: Some(guild),
            channel: CONSOLE_CHANNEL,
            author: Member::new(2, "developer"),
            content: content.to_string(),
            mentions: vec![],
            locale: "en".to_string(),
        }
    }
}
