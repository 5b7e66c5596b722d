//! Process configuration read from the environment (and `.env`).

use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

use crate::storage::StorageConfig;
use crate::sync::SyncConfig;

pub const DEFAULT_STORAGE_PATH: &str = "./data/uniconnect.sled";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_path: String,
    /// sled page cache; sled's own default when unset
    pub storage_cache_bytes: Option<u64>,
    pub notification_window: usize,
    pub listener_buffer: usize,
    pub change_feed_capacity: usize,
    /// User followed by the watcher binary
    pub watch_user_id: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Missing or unparsable values fall back to
    /// their defaults with a log line.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SyncConfig::default();
        let storage = StorageConfig::default();

        Self {
            storage_path: lookup("STORAGE_PATH").unwrap_or_else(|| {
                info!("STORAGE_PATH not set, using default: {DEFAULT_STORAGE_PATH}");
                DEFAULT_STORAGE_PATH.to_string()
            }),
            storage_cache_bytes: lookup("STORAGE_CACHE_BYTES").and_then(|raw| parse_or_warn("STORAGE_CACHE_BYTES", &raw)),
            notification_window: try_load(&lookup, "NOTIFICATION_WINDOW", defaults.notification_window),
            listener_buffer: try_load(&lookup, "LISTENER_BUFFER", storage.listener_buffer),
            change_feed_capacity: try_load(&lookup, "CHANGE_FEED_CAPACITY", storage.change_feed_capacity),
            watch_user_id: lookup("WATCH_USER_ID").filter(|uid| !uid.trim().is_empty()),
        }
    }

    pub fn storage_config(&self) -> StorageConfig {
        let config = StorageConfig::new(self.storage_path.clone())
            .with_listener_buffer(self.listener_buffer)
            .with_change_feed_capacity(self.change_feed_capacity);
        match self.storage_cache_bytes {
            Some(bytes) => config.with_cache_size(bytes),
            None => config,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::default().with_notification_window(self.notification_window)
    }
}

fn parse_or_warn<T: FromStr>(key: &str, raw: &str) -> Option<T>
where
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value '{raw}': {e}");
        })
        .ok()
}

fn try_load<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => parse_or_warn(key, &raw).unwrap_or_else(|| {
            warn!("Using default {key}: {default}");
            default
        }),
        None => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}
