//! Shared application state handed to every request handler and session.

use std::sync::Arc;

use bus::BusProducer;
use mailbox_store::MailboxStore;
use presence_store::PresenceStore;
use token_verifier::TokenVerifier;

use crate::config::Config;
use crate::registry::Registry;

pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
    pub presence: Arc<PresenceStore>,
    pub mailbox: Arc<MailboxStore>,
    pub bus_producer: Arc<BusProducer>,
    pub token_verifier: Arc<TokenVerifier>,
    pub pod_identity: Arc<str>,
}
