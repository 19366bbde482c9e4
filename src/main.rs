// Copyright 2025 Cowboy AI, LLC.

//! `realm-server`: the substrate services behind one process
//!
//! Reads configuration, opens the stores and the bus, registers the
//! consumers, starts the sweepers and serves the REST surface until
//! interrupted.

use anyhow::{Context as _, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use realm_substrate::ban::{
    BanExpirySweeper, BanProcessor, BanStore, HistoryProcessor, HistoryStore, InMemoryBanStore,
    InMemoryHistoryStore, PgBanStore, PgHistoryStore,
};
use realm_substrate::config::{AppConfig, Args, DatabaseSettings, TenantConfigStore};
use realm_substrate::conversation::{
    ConversationProcessor, ConversationStore, InMemoryConversationStore, PgConversationStore,
};
use realm_substrate::expression::{ExpressionExpirySweeper, ExpressionProcessor};
use realm_substrate::infrastructure::nats;
use realm_substrate::invite::{InviteProcessor, InviteTimeoutSweeper};
use realm_substrate::map::{
    CharacterStatusHandler, CommandSpawner, InMemoryVisitStore, MapProcessor, PgVisitStore,
    StaticMapScripts, VisitStore,
};
use realm_substrate::message::topics::{
    COMMAND_TOPIC_STORAGE, EVENT_TOPIC_CHARACTER_STATUS, EVENT_TOPIC_SAGA_STATUS,
};
use realm_substrate::message::{ConsumerManager, Emitter, InMemoryPublisher, Publisher};
use realm_substrate::persistence::postgres;
use realm_substrate::portal::PortalProcessor;
use realm_substrate::rest::{self, AppState};
use realm_substrate::saga::{
    CommandDispatcher, InMemorySagaStore, PgSagaStore, SagaCoordinator, SagaStatusHandler,
    SagaStore, SagaTimeoutSweeper,
};
use realm_substrate::storage::{
    DecoratorPipeline, InMemoryStorageStore, StorageCommandHandler, StorageProcessor,
};
use realm_substrate::{logging, spawn_sweeper, Context, Registries, Sweeper, TenantSource};

/// Store implementations chosen by configuration
struct Stores {
    bans: Arc<dyn BanStore>,
    history: Arc<dyn HistoryStore>,
    sagas: Arc<dyn SagaStore>,
    visits: Arc<dyn VisitStore>,
    conversations: Arc<dyn ConversationStore>,
}

impl Stores {
    async fn open(settings: &DatabaseSettings) -> Result<Self> {
        let Some(url) = &settings.url else {
            warn!("No database configured; state is kept in memory");
            return Ok(Self {
                bans: Arc::new(InMemoryBanStore::new()),
                history: Arc::new(InMemoryHistoryStore::new()),
                sagas: Arc::new(InMemorySagaStore::new()),
                visits: Arc::new(InMemoryVisitStore::new()),
                conversations: Arc::new(InMemoryConversationStore::new()),
            });
        };
        let pool = postgres::connect(url, settings.max_connections)
            .await
            .context("connecting to Postgres")?;
        postgres::ensure_schema(&pool).await.context("creating schema")?;
        Ok(Self {
            bans: Arc::new(PgBanStore::new(pool.clone())),
            history: Arc::new(PgHistoryStore::new(pool.clone())),
            sagas: Arc::new(PgSagaStore::new(pool.clone())),
            visits: Arc::new(PgVisitStore::new(pool.clone())),
            conversations: Arc::new(PgConversationStore::new(pool)),
        })
    }
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

async fn shutdown_signal(shutdown: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
    }
    info!("Shutdown requested");
    let _ = shutdown.send(true);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = AppConfig::load_from_file(&args.config)?;
    config.apply_env();
    config.apply_args(&args);
    config.validate()?;
    logging::init(&config.logging)?;
    info!(config = %args.config.display(), bind = %config.server.bind, "Starting realm-server");

    let tenants = Arc::new(TenantConfigStore::from_configs(config.tenants.clone())?);
    let topics = Arc::new(config.topics());
    let registries = Registries::init(config.expression_ttl());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let client = if config.bus.enabled {
        Some(nats::connect(&config.bus.nats).await?)
    } else {
        warn!("Message bus disabled; events are recorded in memory");
        None
    };
    let publisher: Arc<dyn Publisher> = match &client {
        Some(client) => Arc::new(nats::NatsPublisher::new(client.clone(), topics.clone())),
        None => Arc::new(InMemoryPublisher::new()),
    };
    let emitter = Emitter::new(publisher);
    let stores = Stores::open(&config.database).await?;

    let bans = BanProcessor::new(stores.bans, emitter.clone());
    let history = HistoryProcessor::new(stores.history);
    let expressions = ExpressionProcessor::new(registries.expressions.clone(), emitter.clone());
    let invites = InviteProcessor::new(registries.invites.clone(), emitter.clone());
    let portals = PortalProcessor::new(registries.portals.clone(), emitter.clone());
    let maps = MapProcessor::new(
        registries.occupancy.clone(),
        stores.visits,
        Arc::new(StaticMapScripts::new()),
        Arc::new(CommandSpawner::new(emitter.clone())),
        emitter.clone(),
    );
    let sagas = SagaCoordinator::new(
        stores.sagas,
        Arc::new(CommandDispatcher::new(emitter.clone())),
    );
    let storage = StorageProcessor::new(
        Arc::new(InMemoryStorageStore::new()),
        DecoratorPipeline::new(),
        emitter.clone(),
    );
    let conversations = ConversationProcessor::new(stores.conversations);

    for tenant in tenants.tenants() {
        let ctx = Context::new(tenant);
        match sagas.recover(&ctx).await {
            Ok(resumed) => info!(tenant_id = %ctx.tenant().id, resumed, "Saga recovery complete"),
            Err(err) => warn!(tenant_id = %ctx.tenant().id, error = %err, "Saga recovery failed"),
        }
        if let Some(dir) = &args.seed_conversations {
            let result = conversations.seed_from_dir(&ctx, dir).await?;
            info!(
                tenant_id = %ctx.tenant().id,
                created = result.created_count,
                failed = result.failed_count,
                "Conversations seeded"
            );
        }
    }

    let mut handles: Vec<JoinHandle<()>> = Vec::new();
    if let Some(client) = client {
        let consumers = ConsumerManager::new();
        let group = config.bus.nats.consumer_group.clone();
        consumers.subscribe(
            EVENT_TOPIC_SAGA_STATUS,
            group.as_str(),
            Arc::new(SagaStatusHandler::new(sagas.clone())),
        );
        consumers.subscribe(
            EVENT_TOPIC_CHARACTER_STATUS,
            group.as_str(),
            Arc::new(CharacterStatusHandler::new(maps.clone(), portals)),
        );
        consumers.subscribe(
            COMMAND_TOPIC_STORAGE,
            group.as_str(),
            Arc::new(StorageCommandHandler::new(storage.clone())),
        );
        handles.extend(
            nats::spawn_consumers(client, topics, group, consumers, shutdown_rx.clone()).await?,
        );
    }

    let sweepers: Vec<Arc<dyn Sweeper>> = vec![
        Arc::new(ExpressionExpirySweeper::new(
            expressions,
            millis(config.sweep.expression_interval_ms),
        )),
        Arc::new(InviteTimeoutSweeper::new(
            invites,
            config.invite_timeout(),
            millis(config.sweep.invite_interval_ms),
        )?),
        Arc::new(BanExpirySweeper::new(
            bans.clone(),
            tenants.clone(),
            millis(config.sweep.ban_interval_ms),
        )),
        Arc::new(SagaTimeoutSweeper::new(
            sagas,
            tenants.clone(),
            config.saga_timeout(),
            millis(config.sweep.saga_interval_ms),
        )?),
    ];
    handles.extend(sweepers.into_iter().map(|s| spawn_sweeper(s, shutdown_rx.clone())));

    let state = AppState {
        bans,
        history,
        maps,
        storage,
        conversations,
    };
    let listener = tokio::net::TcpListener::bind(config.bind_addr()?)
        .await
        .context("binding HTTP listener")?;
    info!(addr = %listener.local_addr()?, "REST surface listening");
    axum::serve(listener, rest::router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("HTTP server")?;

    for handle in handles {
        if let Err(err) = handle.await {
            warn!(error = %err, "Background task ended abnormally");
        }
    }
    info!("realm-server stopped");
    Ok(())
}
