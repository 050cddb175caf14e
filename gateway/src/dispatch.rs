//! Outbound Dispatcher (§4.I): the bus consumer callback. Looks the
//! recipient up in the registry and writes to its socket if this node owns
//! the connection; otherwise the message is for a user connected to some
//! other node (or currently offline) and is left alone here.

use std::sync::Arc;

use presence_store::PresenceKeys;
use tracing::{debug, warn};

use crate::session::OutboundFrame;
use crate::state::AppState;

/// Builds the closure registered with the bus consumer at startup. `key` is
/// the recipient user id the producer side keyed the record with.
pub fn make_dispatcher(state: Arc<AppState>) -> bus::Dispatcher {
    Arc::new(move |key: String, payload: Vec<u8>| {
        let Some(record) = state.registry.get_conn(&key) else {
            debug!(user_id = %key, "dispatched message has no local socket, dropping");
            reconcile_stale_owner(state.clone(), key);
            // The reserved extension point for persisting this message via
            // `MailboxStore::store_delivery_required` when this node is the
            // message's owner but the socket has since closed is not wired
            // up; see the open question in the design notes.
            return;
        };

        if !record.addr.connected() {
            warn!(user_id = %key, "registry held a stale record for a disconnected actor");
            return;
        }

        record.addr.do_send(OutboundFrame(payload));
    })
}

/// When the registry has no local record, the cached `conn` pointer may
/// still claim this node as owner from a connection that exited without
/// clearing it. If so, and the cache still says online, correct it.
fn reconcile_stale_owner(state: Arc<AppState>, user_id: String) {
    tokio::spawn(async move {
        let keys = PresenceKeys {
            env: &state.config.env,
            user_id: &user_id,
        };

        let owner_host = match state.presence.get_string(&keys.conn()).await {
            Ok(Some(host)) => host,
            Ok(None) => return,
            Err(err) => {
                warn!(%user_id, %err, "failed to read connection owner pointer");
                return;
            }
        };
        if owner_host != *state.pod_identity {
            return;
        }

        match state.presence.get_int(&keys.online()).await {
            Ok(Some(1)) => {
                if let Err(err) = state.presence.set_int(&keys.online(), 0, 0).await {
                    warn!(%user_id, %err, "failed to clear stale online flag");
                }
            }
            Ok(_) => {}
            Err(err) => warn!(%user_id, %err, "failed to read online flag"),
        }
    });
}
