use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde_json::json;
use tokio::signal;
use uuid::Uuid;

use crate::models::User;
use crate::store::{server_timestamp, ChangeSource, USERS_COLLECTION};
use crate::utils::timeline;

/// Maintains the local user's advisory online flag in the store.
///
/// Presence is never a correctness input anywhere else in the system: every
/// write here is best-effort, and failures are logged and swallowed. A
/// process killed without a termination signal leaves a stale "online" flag
/// behind; readers compensate with the staleness window check below.
pub struct PresenceTracker<S: ChangeSource> {
    store: Arc<S>,
    user_id: Uuid,
}

impl<S: ChangeSource> Clone for PresenceTracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            user_id: self.user_id,
        }
    }
}

impl<S: ChangeSource> PresenceTracker<S> {
    pub fn new(store: Arc<S>, user_id: Uuid) -> Self {
        Self { store, user_id }
    }

    pub async fn mark_online(&self) {
        self.write_presence(true).await;
    }

    pub async fn mark_offline(&self) {
        self.write_presence(false).await;
    }

    async fn write_presence(&self, online: bool) {
        let patch = json!({
            "is_online": online,
            "last_active": server_timestamp(),
        });
        match self.store.update(USERS_COLLECTION, self.user_id, patch).await {
            Ok(()) => info!(
                "Presence for user {} set to {}",
                self.user_id,
                if online { "online" } else { "offline" }
            ),
            // Presence is advisory; nothing downstream may depend on this
            // write having happened.
            Err(e) => warn!("Presence write for user {} failed: {}", self.user_id, e),
        }
    }

    /// Waits for a termination signal, then marks the user offline. Spawn
    /// this alongside the session. Termination without a signal skips the
    /// offline write entirely.
    pub async fn mark_offline_on_shutdown(self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => warn!("Failed to install signal handler: {}", e),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        info!("Termination signal received, marking user offline");
        self.mark_offline().await;
    }
}

/// Whether a user should be displayed as online, treating flags older than
/// `stale_secs` as expired.
pub fn is_effectively_online(user: &User, now: DateTime<Utc>, stale_secs: u64) -> bool {
    if !user.is_online {
        return false;
    }
    match user.last_active {
        Some(last) => now - last <= Duration::seconds(stale_secs as i64),
        // An online flag with no last_active predates the staleness window;
        // trust it.
        None => true,
    }
}

/// Header line for a counterpart: "Online", "Last seen <relative>", or
/// "Offline" when nothing is known.
pub fn presence_label(user: &User, now: DateTime<Utc>, stale_secs: u64) -> String {
    if is_effectively_online(user, now, stale_secs) {
        return "Online".to_string();
    }
    match user.last_active {
        Some(last) => format!("Last seen {}", timeline::time_ago(last, now)),
        None => "Offline".to_string(),
    }
}
