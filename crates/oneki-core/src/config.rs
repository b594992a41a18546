//! Oneki configuration
//!
//! Shared by the bot and the operator CLI. Everything lives under the Oneki
//! home directory:
//!
//! ```text
//! ~/.oneki/               # or $ONEKI_HOME
//! ├── config.toml         # this file, optional
//! └── oneki.db            # SQLite document store
//! ```
//!
//! Missing sections and fields fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::away::AwayConfig;
use crate::error::{Error, Result};
use crate::i18n::Translations;
use crate::session::SessionConfig;
use crate::store::{MemoryStateStore, StateStore};
use crate::types::{ChannelId, GuildId, UserId};

/// Environment variable overriding the home directory
pub const HOME_ENV: &str = "ONEKI_HOME";
/// Environment variable overriding the database path
pub const DATABASE_ENV: &str = "ONEKI_DATABASE_PATH";

/// Oneki configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OnekiConfig {
    /// Home directory the config was loaded from
    #[serde(skip)]
    pub home: PathBuf,

    pub store: StoreConfig,
    pub sessions: SessionsConfig,
    pub prefixes: PrefixesConfig,
    pub locales: LocalesConfig,
    pub away: AwaySettings,
    pub bot: BotConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Document store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// SQLite file (default: `<home>/oneki.db`)
    pub database_path: Option<PathBuf>,
}

/// Interactive session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Inactivity timeout in seconds (default: 320)
    pub timeout_secs: u64,
    /// Channel receiving filed bug reports
    pub report_channel: Option<ChannelId>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 320,
            report_channel: None,
        }
    }
}

/// Command prefix fallbacks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefixesConfig {
    /// Prefixes of guilds without a custom list
    pub defaults: Vec<String>,
    /// Prefixes accepted in direct messages
    pub direct_message: Vec<String>,
}

impl Default for PrefixesConfig {
    fn default() -> Self {
        Self {
            defaults: vec!["?".to_string(), ">".to_string()],
            direct_message: vec!["?".to_string(), ">".to_string()],
        }
    }
}

/// Locale catalogs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalesConfig {
    pub default: String,
    /// Extra `<locale>.toml` catalogs merged over the built-in ones
    pub directory: Option<PathBuf>,
}

impl Default for LocalesConfig {
    fn default() -> Self {
        Self {
            default: crate::i18n::DEFAULT_LOCALE.to_string(),
            directory: None,
        }
    }
}

/// Away-status tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwaySettings {
    pub max_reason_chars: usize,
    pub marker: String,
    pub max_marked_name_chars: usize,
    pub return_notice_secs: u64,
    pub mention_notice_secs: u64,
}

impl Default for AwaySettings {
    fn default() -> Self {
        let away = AwayConfig::default();
        Self {
            max_reason_chars: away.max_reason_chars,
            marker: away.marker,
            max_marked_name_chars: away.max_marked_name_chars,
            return_notice_secs: away.return_notice.as_secs(),
            mention_notice_secs: away.mention_notice.as_secs(),
        }
    }
}

/// Identity of the bot process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// The bot's own user id, used for mention prefixes
    pub user_id: UserId,
    /// User the console transport speaks as
    pub dev_user_id: UserId,
    pub dev_user_name: String,
    /// Guild the console transport pretends to be in
    pub console_guild: GuildId,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            user_id: UserId(1),
            dev_user_id: UserId(2),
            dev_user_name: "developer".to_string(),
            console_guild: GuildId(1),
        }
    }
}

impl OnekiConfig {
    /// Home directory: `$ONEKI_HOME`, otherwise `~/.oneki`
    pub fn home_dir() -> PathBuf {
        std::env::var(HOME_ENV).map(PathBuf::from).unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".oneki")
        })
    }

    /// Load `config.toml` from the home directory, or defaults when absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::home_dir())
    }

    /// Load `config.toml` from `home`, or defaults when absent.
    pub fn load_from(home: &Path) -> Result<Self> {
        let path = home.join("config.toml");
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str::<Self>(&content)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
        } else {
            Self::default()
        };
        config.home = home.to_path_buf();

        if let Ok(database_path) = std::env::var(DATABASE_ENV) {
            config.store.database_path = Some(PathBuf::from(database_path));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// SQLite file of the document store
    pub fn database_path(&self) -> PathBuf {
        self.store
            .database_path
            .clone()
            .unwrap_or_else(|| self.home.join("oneki.db"))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            timeout: Duration::from_secs(self.sessions.timeout_secs),
            report_channel: self.sessions.report_channel,
        }
    }

    pub fn away_config(&self) -> AwayConfig {
        AwayConfig {
            max_reason_chars: self.away.max_reason_chars,
            marker: self.away.marker.clone(),
            max_marked_name_chars: self.away.max_marked_name_chars,
            return_notice: Duration::from_secs(self.away.return_notice_secs),
            mention_notice: Duration::from_secs(self.away.mention_notice_secs),
        }
    }

    /// Built-in catalogs plus the configured directory, validated.
    pub fn translations(&self) -> Result<Translations> {
        let translations = Translations::builtin_with_default(&self.locales.default)?;
        match &self.locales.directory {
            Some(directory) => translations.load_dir(directory),
            None => Ok(translations),
        }
    }

    /// Open the configured document store.
    pub fn open_store(&self) -> Result<Arc<dyn StateStore>> {
        match self.store.backend {
            StoreBackend::Memory => Ok(Arc::new(MemoryStateStore::new())),
            #[cfg(feature = "db")]
            StoreBackend::Sqlite => {
                let store = crate::store::SqliteStateStore::open_path(&self.database_path())?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "db"))]
            StoreBackend::Sqlite => Err(Error::Config(
                "the sqlite backend requires the `db` feature".into(),
            )),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if self.sessions.timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "sessions.timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.prefixes.defaults.is_empty() {
            return Err(ConfigValidationError::InvalidValue {
                field: "prefixes.defaults".into(),
                message: "at least one prefix is required".into(),
            });
        }

        if self.prefixes.defaults.iter().any(|prefix| prefix.trim().is_empty()) {
            return Err(ConfigValidationError::InvalidValue {
                field: "prefixes.defaults".into(),
                message: "prefixes must not be blank".into(),
            });
        }

        if self.away.max_reason_chars == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "away.max_reason_chars".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.locales.default.trim().is_empty() {
            return Err(ConfigValidationError::MissingDefaultLocale);
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("locales.default is required")]
    MissingDefaultLocale,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<ConfigValidationError> for Error {
    fn from(e: ConfigValidationError) -> Self {
        Error::Config(e.to_string())
    }
}
