//! shopbridge - commerce platform adapter
//!
//! Serves the webhook and mapping management HTTP API and answers
//! `requests/#` on NATS until interrupted.

use std::error::Error;
use std::process;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use shopbridge::config::{AdapterConfig, StoreBackend};
use shopbridge::handlers::{register_handlers, AuthService};
use shopbridge::http::{self, AppState};
use shopbridge::mapping::{FieldMapper, MappingCache, MappingRuleService};
use shopbridge::rpc::{Dispatcher, REQUEST_WILDCARD};
use shopbridge::store::{MappingRuleStore, MemoryStore, SeedData, TokenStore, TrustedServiceStore};
use shopbridge::{NatsBus, PlatformClient, TransformRegistry, WebhookService};

/// The three repositories, backed by one store
struct Stores {
    rules: Arc<dyn MappingRuleStore>,
    services: Arc<dyn TrustedServiceStore>,
    tokens: Arc<dyn TokenStore>,
}

impl Stores {
    fn from_one<S>(store: S) -> Self
    where
        S: MappingRuleStore + TrustedServiceStore + TokenStore + 'static,
    {
        let store = Arc::new(store);
        Self {
            rules: store.clone(),
            services: store.clone(),
            tokens: store,
        }
    }
}

fn open_stores(backend: &StoreBackend) -> Result<Stores, Box<dyn Error>> {
    match backend {
        StoreBackend::Memory { seed_file } => {
            let store = match seed_file {
                Some(path) => {
                    tracing::info!("Seeding in-memory store from {}", path.display());
                    MemoryStore::from_seed(SeedData::load_from_file(path)?)?
                }
                None => MemoryStore::new(),
            };
            Ok(Stores::from_one(store))
        }
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres { database_url } => {
            let db = shopbridge::store::Database::new(database_url)?;
            db.ensure_schema()?;
            tracing::info!("Connected to PostgreSQL");
            Ok(Stores::from_one(shopbridge::store::PgStore::new(db)))
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres { .. } => {
            Err("STORE_BACKEND=postgres requires the `postgres` feature".into())
        }
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let config = AdapterConfig::from_env()?;
    let stores = open_stores(&config.store)?;

    let mapper = Arc::new(FieldMapper::new(
        stores.rules.clone(),
        Arc::new(MappingCache::new(config.mapping_cache_ttl)),
        Arc::new(TransformRegistry::builtin()),
    ));

    let bus = Arc::new(NatsBus::connect(config.nats.clone()).await?);
    let upstream = Arc::new(PlatformClient::new(config.upstream.clone(), stores.tokens.clone())?);
    let auth = Arc::new(AuthService::new(stores.services.clone()));

    let mut dispatcher = Dispatcher::new(bus.clone());
    register_handlers(&mut dispatcher, auth, upstream, mapper.clone());
    tracing::info!("Registered actions: {:?}", dispatcher.actions());

    let requests = bus.subscribe(REQUEST_WILDCARD).await?;
    let dispatch_loop = tokio::spawn(async move { dispatcher.run(requests).await });

    if config.webhook_secret.is_empty() {
        tracing::warn!("WEBHOOK_SECRET is not set; every webhook will be rejected");
    }
    let ready_bus = bus.clone();
    let state = AppState {
        webhooks: Arc::new(WebhookService::new(
            config.webhook_secret.clone(),
            bus.clone(),
            mapper.clone(),
        )),
        rules: MappingRuleService::new(stores.rules.clone(), mapper),
        bus_ready: Arc::new(move || ready_bus.is_connected()),
    };

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("shopbridge listening on {}", addr);

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    dispatch_loop.abort();
    bus.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Fatal: {}", e);
        process::exit(1);
    }
}
