//! Connection Registry (§3, §4.E): the in-memory user→socket map.
//!
//! Registry mutations are serialized by a `RwLock`; the write path to an
//! individual socket is serialized separately by the fact that each
//! connection is an `actix` actor with a single mailbox — sending it a
//! message is the "per-record write mutex" from §9, since actix guarantees
//! in-order, single-consumer handling of an actor's mailbox. The registry
//! lock itself is never held while a message is in flight to a socket.

use actix::Addr;
use once_cell::sync::Lazy;
use prometheus::{register_int_gauge, IntGauge};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::session::{GatewaySession, Shutdown};

static WEBSOCKET_CONNECTION_TOTAL_CNT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "infra_websocket_gateway_service_websocket_connection_total_cnt",
        "Live WebSocket connections held by this node"
    )
    .expect("metric registration should succeed at startup")
});

#[derive(Clone)]
pub struct ConnectionRecord {
    pub conn_id: Uuid,
    pub user_id: String,
    pub client_ip: String,
    pub addr: Addr<GatewaySession>,
}

pub struct Registry {
    conns: RwLock<HashMap<String, ConnectionRecord>>,
    count: AtomicI64,
    cap: i64,
}

impl Registry {
    pub fn new(cap: i64) -> Self {
        Self {
            conns: RwLock::new(HashMap::new()),
            count: AtomicI64::new(0),
            cap,
        }
    }

    /// Registers `record`. Displaces any existing record for the same user;
    /// the displaced session is left to notice the abandonment on its own
    /// (it is never actively closed here — see the tie-break note in §4.E).
    pub fn add_conn(&self, record: ConnectionRecord) -> Result<(), GatewayError> {
        let mut guard = self.conns.write().expect("registry lock poisoned");
        if self.count.load(Ordering::SeqCst) + 1 > self.cap {
            return Err(GatewayError::CapacityExceeded);
        }
        guard.insert(record.user_id.clone(), record);
        self.count.fetch_add(1, Ordering::SeqCst);
        WEBSOCKET_CONNECTION_TOTAL_CNT.inc();
        Ok(())
    }

    /// Removes the record for `user_id` **only if** it is still the one
    /// identified by `conn_id`. A stale `DelConn` from a displaced
    /// connection's own cleanup is a no-op: the newer record must survive.
    pub fn del_conn(&self, user_id: &str, conn_id: Uuid) {
        let mut guard = self.conns.write().expect("registry lock poisoned");
        let still_current = matches!(guard.get(user_id), Some(r) if r.conn_id == conn_id);
        if !still_current {
            return;
        }
        if let Some(record) = guard.remove(user_id) {
            self.count.fetch_sub(1, Ordering::SeqCst);
            WEBSOCKET_CONNECTION_TOTAL_CNT.dec();
            record.addr.do_send(Shutdown);
        }
    }

    pub fn get_conn(&self, user_id: &str) -> Option<ConnectionRecord> {
        let guard = self.conns.read().expect("registry lock poisoned");
        guard.get(user_id).cloned()
    }

    pub fn connection_count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn cap(&self) -> i64 {
        self.cap
    }

    /// Closes every socket and empties the map. Used on shutdown.
    pub fn close_all(&self) {
        let mut guard = self.conns.write().expect("registry lock poisoned");
        for (_, record) in guard.drain() {
            record.addr.do_send(Shutdown);
        }
        self.count.store(0, Ordering::SeqCst);
        WEBSOCKET_CONNECTION_TOTAL_CNT.set(0);
    }

    /// Recomputes the counter from the true map size, correcting drift from
    /// concurrent add/delete races. Run every 10 minutes (§4.E, §4.K).
    pub fn reconcile(&self) {
        let guard = self.conns.read().expect("registry lock poisoned");
        let true_count = guard.len() as i64;
        let prior = self.count.swap(true_count, Ordering::SeqCst);
        WEBSOCKET_CONNECTION_TOTAL_CNT.set(true_count);
        if prior != true_count {
            warn!(prior, true_count, "registry reconciler corrected drift");
        } else {
            info!(true_count, "registry reconciler: no drift");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_addr() -> Addr<GatewaySession> {
        // Actors in this test context are never started; we only exercise
        // registry bookkeeping, never actual message delivery.
        actix::Actor::start(GatewaySession::new_for_test())
    }

    #[actix::test]
    async fn add_conn_at_exactly_cap_succeeds() {
        let registry = Registry::new(2);
        registry
            .add_conn(ConnectionRecord {
                conn_id: Uuid::new_v4(),
                user_id: "U1".into(),
                client_ip: "10.0.0.1".into(),
                addr: dummy_addr(),
            })
            .unwrap();
        registry
            .add_conn(ConnectionRecord {
                conn_id: Uuid::new_v4(),
                user_id: "U2".into(),
                client_ip: "10.0.0.2".into(),
                addr: dummy_addr(),
            })
            .unwrap();
        assert_eq!(registry.connection_count(), 2);
    }

    #[actix::test]
    async fn add_conn_over_cap_fails_and_does_not_register() {
        let registry = Registry::new(1);
        registry
            .add_conn(ConnectionRecord {
                conn_id: Uuid::new_v4(),
                user_id: "U1".into(),
                client_ip: "10.0.0.1".into(),
                addr: dummy_addr(),
            })
            .unwrap();
        let err = registry
            .add_conn(ConnectionRecord {
                conn_id: Uuid::new_v4(),
                user_id: "U2".into(),
                client_ip: "10.0.0.2".into(),
                addr: dummy_addr(),
            })
            .unwrap_err();
        assert!(matches!(err, GatewayError::CapacityExceeded));
        assert_eq!(registry.connection_count(), 1);
    }

    #[actix::test]
    async fn displaced_connections_del_conn_is_a_no_op() {
        let registry = Registry::new(5);
        let old_id = Uuid::new_v4();
        registry
            .add_conn(ConnectionRecord {
                conn_id: old_id,
                user_id: "U1".into(),
                client_ip: "10.0.0.1".into(),
                addr: dummy_addr(),
            })
            .unwrap();

        let new_id = Uuid::new_v4();
        registry
            .add_conn(ConnectionRecord {
                conn_id: new_id,
                user_id: "U1".into(),
                client_ip: "10.0.0.2".into(),
                addr: dummy_addr(),
            })
            .unwrap();

        // The displaced session's deferred cleanup must not evict the
        // newer one.
        registry.del_conn("U1", old_id);
        let current = registry.get_conn("U1").unwrap();
        assert_eq!(current.conn_id, new_id);
    }

    #[actix::test]
    async fn reconcile_corrects_counter_drift() {
        let registry = Registry::new(5);
        registry
            .add_conn(ConnectionRecord {
                conn_id: Uuid::new_v4(),
                user_id: "U1".into(),
                client_ip: "10.0.0.1".into(),
                addr: dummy_addr(),
            })
            .unwrap();
        // Simulate drift directly on the counter.
        registry.count.fetch_add(41, Ordering::SeqCst);
        assert_eq!(registry.connection_count(), 42);
        registry.reconcile();
        assert_eq!(registry.connection_count(), 1);
    }
}
