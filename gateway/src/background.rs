//! Background tasks (§4.K).
//!
//! Two distinct things live here even though the header groups them:
//! the registry reconciler is a single process-wide loop started once at
//! process startup; the online-notify debounce is evaluated once per
//! connection attach, not on a recurring schedule — see
//! `notify_online_once`, called from the session actor's `started()`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use presence_store::PresenceKeys;
use tracing::{info, warn};

use crate::control::ControlMessage;
use crate::state::AppState;

/// Every `reconcile_interval_secs`, recompute the registry's connection
/// counter from the true map size.
pub fn spawn_registry_reconciler(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_secs(state.config.reconcile_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            state.registry.reconcile();
        }
    })
}

/// Debounces online notifications: if `online_notify_ts` is unset or older
/// than `online_notify_debounce_secs`, republishes `USER_ONLINE` and
/// `USER_ONLINE_STATUS_ONLINE` and refreshes the timestamp. Called once
/// when a connection attaches.
pub async fn notify_online_once(state: &Arc<AppState>, user_id: &str) {
    let keys = PresenceKeys {
        env: &state.config.env,
        user_id,
    };

    let last_notify = match state.presence.get_int64(&keys.online_notify_ts()).await {
        Ok(value) => value,
        Err(err) => {
            warn!(user_id, %err, "failed to read online-notify timestamp");
            return;
        }
    };

    let now = Utc::now().timestamp();
    let is_stale = match last_notify {
        Some(ts) => now - ts >= state.config.online_notify_debounce_secs,
        None => true,
    };
    if !is_stale {
        return;
    }

    let trace_id = format!("{}-attach", user_id);
    for msg in [
        ControlMessage::UserOnline {
            trace_id: trace_id.clone(),
        },
        ControlMessage::UserOnlineStatusOnline { trace_id },
    ] {
        if let Err(err) = state.bus_producer.publish_by_key(user_id, &msg.to_bytes()).await {
            warn!(user_id, %err, "failed to publish online notification");
            return;
        }
    }

    if let Err(err) = state.presence.set_int64(&keys.online_notify_ts(), now, 0).await {
        warn!(user_id, %err, "failed to update online-notify timestamp");
        return;
    }
    info!(user_id, "online-notify published on attach");
}
