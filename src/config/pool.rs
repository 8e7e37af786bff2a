//! Waitlist pool configuration structures.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::lifecycle::{offer_window, LifecycleSettings, DEFAULT_NOTIFICATION_WINDOW_SECS};
use crate::core::AppResult;

const fn default_notification_window_secs() -> u64 {
    DEFAULT_NOTIFICATION_WINDOW_SECS
}

const fn default_notifier_timeout_secs() -> u64 {
    10
}

const fn default_sweep_interval_secs() -> u64 {
    300
}

const fn default_max_connections() -> u32 {
    5
}

fn default_registration_base_url() -> String {
    LifecycleSettings::default().registration_base_url
}

/// Store backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// In-memory store for development/testing.
    #[default]
    InMemory,
    /// Postgres store.
    Postgres {
        /// Connection string.
        database_url: String,
        /// Upper bound on pooled connections.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

/// Pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistConfig {
    /// Number of member slots.
    pub capacity: u32,
    /// How long an offer stays open, in seconds.
    #[serde(default = "default_notification_window_secs")]
    pub notification_window_secs: u64,
    /// Upper bound on one notifier call, in seconds.
    #[serde(default = "default_notifier_timeout_secs")]
    pub notifier_timeout_secs: u64,
    /// Period of the expiry sweep, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Base of the registration link sent with offers.
    #[serde(default = "default_registration_base_url")]
    pub registration_base_url: String,
    /// Store backend selection.
    #[serde(default)]
    pub store: StoreBackendConfig,
}

impl WaitlistConfig {
    /// Configuration with defaults for everything but capacity.
    #[must_use]
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            capacity,
            notification_window_secs: default_notification_window_secs(),
            notifier_timeout_secs: default_notifier_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            registration_base_url: default_registration_base_url(),
            store: StoreBackendConfig::InMemory,
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("capacity must be greater than 0".into());
        }
        if i32::try_from(self.capacity).is_err() {
            return Err(format!("capacity must be at most {}", i32::MAX));
        }
        if self.notification_window_secs == 0 {
            return Err("notification_window_secs must be greater than 0".into());
        }
        if offer_window(self.notification_window_secs).is_none() {
            return Err("notification_window_secs is too large".into());
        }
        if self.notifier_timeout_secs == 0 {
            return Err("notifier_timeout_secs must be greater than 0".into());
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be greater than 0".into());
        }
        if !(self.registration_base_url.starts_with("http://")
            || self.registration_base_url.starts_with("https://"))
        {
            return Err("registration_base_url must be an http(s) URL".into());
        }
        if let StoreBackendConfig::Postgres {
            database_url,
            max_connections,
        } = &self.store
        {
            if database_url.trim().is_empty() {
                return Err("database_url must not be empty".into());
            }
            if *max_connections == 0 {
                return Err("max_connections must be greater than 0".into());
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the process environment, reading `.env` first
    /// when present.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from `WAITLIST_*` variables and `DATABASE_URL`
    /// resolved through `lookup`, then validate.
    ///
    /// The backend comes from `WAITLIST_STORE` (`in_memory` or `postgres`);
    /// when unset, a present `DATABASE_URL` selects Postgres.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
            default: T,
        ) -> AppResult<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            lookup(key).map_or(Ok(default), |raw| {
                raw.trim()
                    .parse()
                    .with_context(|| format!("{key} must be a valid number"))
            })
        }

        let capacity: u32 = lookup("WAITLIST_CAPACITY")
            .context("WAITLIST_CAPACITY must be set")?
            .trim()
            .parse()
            .context("WAITLIST_CAPACITY must be a valid number")?;

        let database_url = lookup("DATABASE_URL");
        let store = match lookup("WAITLIST_STORE").as_deref().map(str::trim) {
            Some("in_memory") => StoreBackendConfig::InMemory,
            Some("postgres") => StoreBackendConfig::Postgres {
                database_url: database_url
                    .context("DATABASE_URL must be set for the postgres store")?,
                max_connections: parsed(
                    &lookup,
                    "WAITLIST_DB_MAX_CONNECTIONS",
                    default_max_connections(),
                )?,
            },
            Some(other) => anyhow::bail!("WAITLIST_STORE `{other}` is not a known backend"),
            None => match database_url {
                Some(database_url) => StoreBackendConfig::Postgres {
                    database_url,
                    max_connections: parsed(
                        &lookup,
                        "WAITLIST_DB_MAX_CONNECTIONS",
                        default_max_connections(),
                    )?,
                },
                None => StoreBackendConfig::InMemory,
            },
        };

        let cfg = Self {
            capacity,
            notification_window_secs: parsed(
                &lookup,
                "WAITLIST_NOTIFICATION_WINDOW_SECS",
                default_notification_window_secs(),
            )?,
            notifier_timeout_secs: parsed(
                &lookup,
                "WAITLIST_NOTIFIER_TIMEOUT_SECS",
                default_notifier_timeout_secs(),
            )?,
            sweep_interval_secs: parsed(
                &lookup,
                "WAITLIST_SWEEP_INTERVAL_SECS",
                default_sweep_interval_secs(),
            )?,
            registration_base_url: lookup("WAITLIST_REGISTRATION_BASE_URL")
                .unwrap_or_else(default_registration_base_url),
            store,
        };
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }

    /// Offer window as a chrono duration.
    #[must_use]
    pub fn notification_window(&self) -> chrono::Duration {
        offer_window(self.notification_window_secs).unwrap_or(chrono::Duration::MAX)
    }

    /// Notifier timeout.
    #[must_use]
    pub const fn notifier_timeout(&self) -> Duration {
        Duration::from_secs(self.notifier_timeout_secs)
    }

    /// Sweep period.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Lifecycle tunables derived from this configuration.
    #[must_use]
    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            notification_window: self.notification_window(),
            notifier_timeout: self.notifier_timeout(),
            registration_base_url: self.registration_base_url.clone(),
        }
    }
}
