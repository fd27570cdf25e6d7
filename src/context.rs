use anyhow::{Context, Result};
use std::path::Path;

use crate::config::AppConfig;
use crate::notify::NotificationDispatcher;
use crate::store::Store;

/// Shared handles built once at startup and handed to every component
#[derive(Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub store: Store,
    pub dispatcher: NotificationDispatcher,
}

impl AppContext {
    /// Load, override and validate configuration
    pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
        let mut config = AppConfig::load(path).context("Failed to load configuration")?;
        config.apply_env();
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Open the store, seed initial users, and build the dispatcher
    pub fn initialize(config: AppConfig) -> Result<Self> {
        let db_path = config.database_path();
        let store = Store::open(&db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        tracing::info!("Database: {}", store.path().display());

        let seeded = store
            .seed_users(
                config
                    .seed_users
                    .iter()
                    .map(|seed| (seed.identifier.as_str(), seed.name.as_str())),
            )
            .context("Failed to seed initial users")?;
        if seeded > 0 {
            tracing::info!("Seeded {} initial users", seeded);
        }

        let dispatcher = NotificationDispatcher::from_settings(&config.notifications)
            .context("Failed to set up notifications")?;
        if !dispatcher.is_enabled() {
            tracing::warn!("No webhook configured; notifications are disabled");
        }

        Ok(Self {
            config,
            store,
            dispatcher,
        })
    }

    /// Shorthand for `load_config` followed by `initialize`
    pub fn from_path(path: Option<&Path>) -> Result<Self> {
        Self::initialize(Self::load_config(path)?)
    }
}
