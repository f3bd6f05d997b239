//! Call agent server entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use call_agent_ari::AriClient;
use call_agent_config::{load_settings, Settings};
use call_agent_core::CallControl;
use call_agent_engine::{ConversationEngine, EngineConfig, Providers};
use call_agent_orchestrator::{CallOrchestrator, PersonaCache};
use call_agent_persistence::{PersistenceLayer, ScyllaConfig};
use call_agent_providers::build_providers;
use call_agent_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Priority: env vars > config/{env}.toml > config/default.toml > defaults
    let env = std::env::var("CALL_AGENT_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing not yet initialized, use eprintln for early logging
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Settings::default()
        }
    };

    init_tracing(&settings);

    tracing::info!("Starting call agent server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config = env.as_deref().unwrap_or("default"),
        app = %settings.ari.app,
        switch = %settings.ari.url,
        "Configuration loaded"
    );

    // Stores: ScyllaDB when enabled, in-memory otherwise
    let persistence = if settings.persistence.enabled {
        let scylla = ScyllaConfig {
            hosts: settings.persistence.scylla_hosts.clone(),
            keyspace: settings.persistence.keyspace.clone(),
            replication_factor: settings.persistence.replication_factor,
        };
        match call_agent_persistence::init(scylla).await {
            Ok(layer) => {
                tracing::info!(
                    hosts = ?settings.persistence.scylla_hosts,
                    keyspace = %settings.persistence.keyspace,
                    "ScyllaDB persistence initialized"
                );
                layer
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Failed to initialize ScyllaDB; falling back to in-memory stores"
                );
                call_agent_persistence::init_in_memory()
            }
        }
    } else {
        tracing::info!("Persistence disabled; using in-memory stores");
        call_agent_persistence::init_in_memory()
    };

    let PersistenceLayer {
        leads,
        calls,
        personas,
        recordings,
    } = persistence;

    // Provider backends (STT/TTS/reply generation)
    let provider_set = build_providers(&settings.providers)?;

    // Protocol client and its internal event feed
    let (ari_client, events_rx) = AriClient::new(settings.ari.clone())?;
    let _event_pump = ari_client.start();
    let control: Arc<dyn CallControl> = Arc::new(ari_client);

    // Conversation engine
    let engine = ConversationEngine::new(
        control.clone(),
        Providers {
            stt: provider_set.stt,
            tts: provider_set.tts,
            generator: provider_set.generator,
        },
        calls.clone(),
        recordings,
        EngineConfig::from_settings(&settings),
    );

    // Orchestrator (also the engine's call authority)
    let orchestrator = CallOrchestrator::new(
        control.clone(),
        engine.clone(),
        leads.clone(),
        calls,
        PersonaCache::new(
            personas,
            Duration::from_secs(settings.conversation.persona_ttl_secs),
        ),
        settings.calling.clone(),
        settings.ari.clone(),
    );

    let _dispatcher = engine.run(events_rx, orchestrator.clone());

    let state = AppState::new(orchestrator, engine, control, leads);
    let app = create_router(
        state,
        settings.server.cors_enabled,
        &settings.server.cors_origins,
    );

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &settings.observability.log_level;
        format!("call_agent={},tower_http=debug", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
