use std::sync::Arc;
use std::time::Duration;

use actix_web::{get, web, App, HttpServer};
use db_pool::{create_pool, DbConfig};
use redis_utils::RedisPool;
use tokio::signal::unix::{signal, SignalKind};

use ws_gateway::admission::{ws_handler, HANDSHAKE_TIMEOUT};
use ws_gateway::background::spawn_registry_reconciler;
use ws_gateway::config::Config;
use ws_gateway::dispatch::make_dispatcher;
use ws_gateway::hostname::pod_identity;
use ws_gateway::logging::init_tracing;
use ws_gateway::metrics::metrics_handler;
use ws_gateway::registry::Registry;
use ws_gateway::state::AppState;

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::load()?;
    tracing::info!(host = %config.host, port = config.port, "loaded gateway configuration");

    let redis_pool = RedisPool::connect(&config.redis_connection_string(), None).await?;
    let presence = Arc::new(presence_store::PresenceStore::new(redis_pool.manager()));

    let db_config = DbConfig {
        service_name: "ws-gateway".to_string(),
        database_url: config.postgres_connection_string("ws_gateway", "ws_gateway"),
        ..DbConfig::default()
    };
    let pg_pool = create_pool(db_config).await?;
    let mailbox = Arc::new(mailbox_store::MailboxStore::new(pg_pool));

    let token_verifier = Arc::new(token_verifier::TokenVerifier::from_key_source(
        &token_verifier::OsFileSource,
        &config.jwt_public_key_path,
    )?);

    let bus_producer = Arc::new(bus::BusProducer::new(&bus::ProducerConfig {
        brokers: config.bus_brokers.clone(),
        topic: config.bus_topic.clone(),
        flush_interval: Duration::from_millis(500),
        max_retries: 5,
    })?);

    let registry = Arc::new(Registry::new(config.connection_cap));
    let pod_identity: Arc<str> = Arc::from(pod_identity());

    let state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        registry: registry.clone(),
        presence,
        mailbox,
        bus_producer,
        token_verifier,
        pod_identity: pod_identity.clone(),
    });

    let dispatcher = make_dispatcher(state.clone());
    let bus_consumer = bus::BusConsumer::start(
        bus::ConsumerConfig {
            brokers: config.bus_brokers.clone(),
            topics: vec![config.bus_topic.clone()],
            group_id: "ws-gateway".to_string(),
            pod_name: Some(pod_identity.to_string()),
            concurrency: config.bus_consumer_concurrency,
            channel_capacity: 1024,
        },
        dispatcher,
    )?;

    let _reconciler = spawn_registry_reconciler(state.clone());

    let bind_addr = format!("{}:{}", config.host, config.port);
    tracing::info!(%bind_addr, "starting ws-gateway");

    let app_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .service(ws_handler)
            .service(health)
            .service(metrics_handler)
    })
    .client_request_timeout(HANDSHAKE_TIMEOUT)
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let shutdown_signal = async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        tracing::info!("shutdown signal received, draining connections");
        state.registry.close_all();
        server_handle.stop(true).await;
    };

    let (server_result, _) = tokio::join!(server, shutdown_signal);
    server_result?;

    bus_consumer.shutdown().await;
    Ok(())
}
