//! UniConnect sync watcher
//!
//! Opens the local document store and follows one user's live views:
//! - Chat list, most recent first
//! - Notification feed
//! - Unread notification count
//!
//! Usage: `uniconnect-sync [USER_ID]` (falls back to `WATCH_USER_ID`).

use anyhow::{bail, Context};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use uniconnect_sync::identity::{CurrentUser, SessionIdentity};
use uniconnect_sync::storage::{SharedStore, SledStore};
use uniconnect_sync::sync::sort_by_recency;
use uniconnect_sync::{AppConfig, Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uniconnect_sync=info".into()),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env();

    // ========================================================================
    // STORAGE
    // ========================================================================

    info!("Initializing storage at: {}", config.storage_path);
    let sled = Arc::new(
        SledStore::open(config.storage_config())
            .with_context(|| format!("Failed to open storage at {}", config.storage_path))?,
    );
    info!("Storage initialized ({} documents)", sled.document_count());
    let store: SharedStore = sled.clone();

    // ========================================================================
    // SESSION
    // ========================================================================

    let Some(user_id) = std::env::args().nth(1).or_else(|| config.watch_user_id.clone()) else {
        bail!("No user to watch: pass a user id or set WATCH_USER_ID");
    };

    let session = Arc::new(SessionIdentity::signed_in(CurrentUser::new(user_id.clone())));
    let services = Services::new(store, session, &config.sync_config());

    let known = services.chat_list.my_chats().await;
    info!("Watching {} ({} chats)", user_id, known.len());

    // ========================================================================
    // LIVE VIEWS
    // ========================================================================

    let mut chats = Box::pin(services.chat_list.stream_chats_for_user(&user_id));
    let mut notifications = Box::pin(services.notifications.stream_notifications(&user_id));
    let mut unread = Box::pin(services.notifications.stream_unread_count(&user_id));

    loop {
        tokio::select! {
            Some(previews) = chats.next() => {
                let previews = sort_by_recency(previews);
                info!("{} chats", previews.len());
                for preview in &previews {
                    info!(
                        "  {} with {}: {:?} ({})",
                        preview.chat_id, preview.other_user_name, preview.last_message, preview.last_message_time
                    );
                }
            }
            Some(feed) = notifications.next() => {
                info!("{} notifications", feed.len());
                if let Some(latest) = feed.first() {
                    info!("  latest [{}] {} ({})", latest.kind, latest.message, latest.timestamp);
                }
            }
            Some(count) = unread.next() => {
                info!("Unread notifications: {}", count);
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
        }
    }

    info!("Shutting down ({} listeners attached)", sled.active_listeners());
    drop(chats);
    drop(notifications);
    drop(unread);
    sled.flush().context("Failed to flush storage")?;
    info!("Stopped; {} listeners left", sled.active_listeners());

    Ok(())
}
