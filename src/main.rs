use battle_server::*;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use combat::hooks::{PersistenceHook, ProgressionHook, TracingHooks};
use combat::{BattleManager, BattleModules, BroadcastEventSink, Collaborators};

const REDIS_QUEUE_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    dotenv::dotenv().ok();

    let config = config::Config::from_env();
    let timing = config.battle_timing();

    // Load move data and type chart
    let move_repository = monsters::MoveRepository::new(&config.monsters.moves_path, &config.monsters.type_chart_path);

    let events = BroadcastEventSink::new(config.performance.event_channel_size);
    let (persistence, progression) = build_hooks(config.redis.url.as_deref()).await;
    let collaborators = Collaborators {
        events: Arc::new(events.clone()),
        persistence,
        progression,
    };

    let modules = BattleModules::standard(&timing, Some(move_repository.clone()));
    let battle_manager = Arc::new(BattleManager::new(modules, collaborators, timing));
    let state = app_state::AppState::new(config.clone(), battle_manager.clone(), move_repository, events);

    let app = Router::new()
        .route("/battles", post(handlers::start_battle_handler))
        .route("/battles/{battle_id}/actions", post(handlers::submit_action_handler))
        .route("/battles/{battle_id}/diagnostics", get(handlers::diagnostics_handler))
        .route("/battles/{battle_id}/events", get(handlers::ws_battle_events_handler))
        .route("/health", get(handlers::health_handler))
        .layer(cors_layer(&config.server.cors_origins))
        .with_state(state);

    let addr = config.server_addr();
    tracing::info!("Starting battle server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await.expect("Failed to bind port");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(battle_manager))
        .await
        .expect("Server failed");
}

async fn build_hooks(redis_url: Option<&str>) -> (Arc<dyn PersistenceHook>, Arc<dyn ProgressionHook>) {
    if let Some(url) = redis_url {
        match redis_manager::RedisHooks::connect(url, REDIS_QUEUE_CAPACITY).await {
            Ok(hooks) => {
                let hooks = Arc::new(hooks);
                return (hooks.clone(), hooks);
            }
            Err(e) => tracing::error!("Redis unavailable at {}, falling back to log-only hooks: {}", url, e),
        }
    }
    (Arc::new(TracingHooks), Arc::new(TracingHooks))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| origin.parse().ok()))
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn shutdown_signal(battle_manager: Arc<BattleManager>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    battle_manager.shutdown().await;
}
