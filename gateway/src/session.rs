//! The per-connection actor (§4.G, §4.H): one `actix` actor per admitted
//! WebSocket, combining the Liveness Supervisor and the Inbound Pump. Its
//! mailbox is also the Outbound Dispatcher's write path — sending it an
//! `OutboundFrame` is how a bus-consumed message reaches the socket.

use std::sync::Arc;
use std::time::Instant;

use actix::{Actor, ActorContext, AsyncContext, Handler, Message, StreamHandler};
use actix_web_actors::ws;
use tracing::{error, info, warn};
use uuid::Uuid;

use presence_store::PresenceKeys;

use crate::background::notify_online_once;
use crate::control::{ControlMessage, PONG_BODY};
use crate::registry::ConnectionRecord;
use crate::replay::replay_offline_messages;
use crate::state::AppState;

#[derive(Message)]
#[rtype(result = "()")]
pub struct Shutdown;

/// A frame the Outbound Dispatcher wants written to this socket.
#[derive(Message)]
#[rtype(result = "()")]
pub struct OutboundFrame(pub Vec<u8>);

pub struct GatewaySession {
    pub conn_id: Uuid,
    pub user_id: String,
    pub client_ip: String,
    state: Option<Arc<AppState>>,
    keepalive_interval: std::time::Duration,
    failure_budget: u8,
    ping_failures: u8,
    last_client_activity: Instant,
}

impl GatewaySession {
    pub fn new(user_id: String, client_ip: String, state: Arc<AppState>) -> Self {
        let keepalive_interval =
            std::time::Duration::from_secs(state.config.keepalive_interval_secs);
        let failure_budget = state.config.keepalive_failure_budget;
        Self {
            conn_id: Uuid::new_v4(),
            user_id,
            client_ip,
            state: Some(state),
            keepalive_interval,
            failure_budget,
            ping_failures: 0,
            last_client_activity: Instant::now(),
        }
    }

    /// A bare session with no backing state, for registry unit tests that
    /// only need a valid `Addr<GatewaySession>` to exist.
    #[cfg(test)]
    pub fn new_for_test() -> Self {
        Self {
            conn_id: Uuid::new_v4(),
            user_id: "test-user".to_string(),
            client_ip: "127.0.0.1".to_string(),
            state: None,
            keepalive_interval: std::time::Duration::from_secs(15),
            failure_budget: 3,
            ping_failures: 0,
            last_client_activity: Instant::now(),
        }
    }

    fn trace_id(&self) -> String {
        format!("{}-{}", self.user_id, self.conn_id)
    }

    /// Server-driven keepalive tick: sends an application-level
    /// `KeepalivePing` and counts consecutive misses against the failure
    /// budget. Exceeding the budget marks the user offline and tears the
    /// connection down.
    fn send_server_keepalive(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        self.ping_failures += 1;
        if self.ping_failures > self.failure_budget {
            warn!(
                user_id = %self.user_id,
                conn_id = %self.conn_id,
                "keepalive failure budget exhausted, marking offline"
            );
            self.mark_offline_and_stop(ctx);
            return;
        }

        let msg = ControlMessage::KeepalivePing {
            trace_id: self.trace_id(),
        };
        ctx.text(String::from_utf8_lossy(&msg.to_bytes()).to_string());
        ctx.ping(b"");
    }

    fn mark_offline_and_stop(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if let Some(state) = &self.state {
            let bus_producer = state.bus_producer.clone();
            let user_id = self.user_id.clone();
            let trace_id = self.trace_id();
            actix::spawn(async move {
                let msg = ControlMessage::UserOnlineStatusOffline { trace_id };
                if let Err(err) = bus_producer.publish_by_key(&user_id, &msg.to_bytes()).await {
                    warn!(%user_id, %err, "failed to publish offline status");
                }
            });
        }
        ctx.stop();
    }

    /// Writes the three presence keys on attach: `online=1`, `online_ts`,
    /// and `conn` pointing at this node, so the Outbound Dispatcher's
    /// owner check and the offline-replay/online-notify tasks see a
    /// consistent record.
    fn write_initial_presence(&self) {
        let Some(state) = self.state.clone() else {
            return;
        };
        let user_id = self.user_id.clone();
        actix::spawn(async move {
            let keys = PresenceKeys {
                env: &state.config.env,
                user_id: &user_id,
            };
            let now = chrono::Utc::now().timestamp();
            if let Err(err) = state.presence.set_int(&keys.online(), 1, 0).await {
                warn!(%user_id, %err, "failed to set online flag on attach");
            }
            if let Err(err) = state.presence.set_int64(&keys.online_ts(), now, 0).await {
                warn!(%user_id, %err, "failed to set online_ts on attach");
            }
            if let Err(err) = state
                .presence
                .set_string(&keys.conn(), &state.pod_identity, 0)
                .await
            {
                warn!(%user_id, %err, "failed to set conn owner on attach");
            }
        });
    }

    /// Clears the cache's online flag. Called on every exit path, not just
    /// the keepalive-failure path.
    fn clear_online_flag(&self) {
        let Some(state) = self.state.clone() else {
            return;
        };
        let user_id = self.user_id.clone();
        actix::spawn(async move {
            let keys = PresenceKeys {
                env: &state.config.env,
                user_id: &user_id,
            };
            if let Err(err) = state.presence.set_int(&keys.online(), 0, 0).await {
                warn!(%user_id, %err, "failed to clear online flag on session exit");
            }
        });
    }

    /// Classifies and forwards a client-originated payload frame. Wrapped in
    /// `catch_unwind` per the panic-propagation policy: a classification bug
    /// must not take down the whole connection actor thread.
    fn handle_inbound_frame(&mut self, payload: Vec<u8>, ctx: &mut ws::WebsocketContext<Self>) {
        self.last_client_activity = Instant::now();
        self.ping_failures = 0;

        let Some(state) = self.state.clone() else {
            return;
        };
        let user_id = self.user_id.clone();

        let classified = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| payload));
        let payload = match classified {
            Ok(payload) => payload,
            Err(panic) => {
                error!(%user_id, ?panic, "inbound frame classification panicked");
                return;
            }
        };

        actix::spawn(async move {
            if let Err(err) = state.bus_producer.publish_by_key(&user_id, &payload).await {
                warn!(%user_id, %err, "failed to publish inbound frame to bus");
            }
        });
        let _ = ctx;
    }
}

impl Actor for GatewaySession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let Some(state) = self.state.clone() else {
            return;
        };

        let record = ConnectionRecord {
            conn_id: self.conn_id,
            user_id: self.user_id.clone(),
            client_ip: self.client_ip.clone(),
            addr: ctx.address(),
        };
        if let Err(err) = state.registry.add_conn(record) {
            warn!(user_id = %self.user_id, %err, "rejected at registry after handshake admitted");
            ctx.stop();
            return;
        }

        ctx.run_interval(self.keepalive_interval, |session, ctx| {
            session.send_server_keepalive(ctx);
        });

        self.write_initial_presence();

        let page_size = state.config.mailbox_page_size;
        let user_id = self.user_id.clone();
        actix::spawn(async move {
            notify_online_once(&state, &user_id).await;
            replay_offline_messages(
                state.presence.as_ref(),
                state.mailbox.as_ref(),
                state.registry.as_ref(),
                &state.config.env,
                &user_id,
                page_size,
            )
            .await;
        });

        info!(user_id = %self.user_id, conn_id = %self.conn_id, "session started");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(state) = &self.state {
            state.registry.del_conn(&self.user_id, self.conn_id);
        }
        self.clear_online_flag();
        info!(user_id = %self.user_id, conn_id = %self.conn_id, "session stopped");
    }
}

impl Handler<Shutdown> for GatewaySession {
    type Result = ();

    fn handle(&mut self, _msg: Shutdown, ctx: &mut Self::Context) {
        ctx.stop();
    }
}

impl Handler<OutboundFrame> for GatewaySession {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        ctx.binary(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for GatewaySession {
    fn handle(&mut self, item: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let msg = match item {
            Ok(msg) => msg,
            Err(err) => {
                warn!(user_id = %self.user_id, %err, "websocket protocol error");
                ctx.stop();
                return;
            }
        };

        match msg {
            ws::Message::Ping(_) => {
                self.last_client_activity = Instant::now();
                ctx.pong(PONG_BODY);
            }
            ws::Message::Pong(_) => {
                self.ping_failures = 0;
                self.last_client_activity = Instant::now();
            }
            ws::Message::Text(_) => {
                self.last_client_activity = Instant::now();
                self.ping_failures = 0;
                info!(user_id = %self.user_id, "non-binary frame received, logging and continuing");
            }
            ws::Message::Binary(bin) => {
                self.handle_inbound_frame(bin.to_vec(), ctx);
            }
            ws::Message::Close(reason) => {
                info!(user_id = %self.user_id, ?reason, "client closed connection");
                ctx.close(reason);
                ctx.stop();
            }
            ws::Message::Continuation(_) | ws::Message::Nop => {}
        }
    }
}
