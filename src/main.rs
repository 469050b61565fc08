mod api;
mod auth;
mod config;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use code_relations_api::{indexer::Indexer, storage::Storage};
use config::Config;
use tokio::sync::{Mutex, RwLock};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub indexer: Arc<RwLock<Indexer>>,
    /// Serializes imports; one writer at a time.
    pub import_lock: Arc<Mutex<()>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "code_relations_api=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    prepare_storage(&config).await?;

    let state = AppState {
        config: config.clone(),
        indexer: Arc::new(RwLock::new(Indexer::new())),
        import_lock: Arc::new(Mutex::new(())),
    };

    let app = Router::new()
        .route("/healthz", get(api::healthz))
        .route("/v1/projects/import", post(api::import_project))
        .route("/v1/graphs/import", post(api::import_graphs))
        .route("/v1/query", post(api::query_nodes))
        .route("/v1/nodes/{id}", get(api::get_node))
        .route("/v1/similar", get(api::similar_nodes))
        .route("/v1/relationships", get(api::list_relationships))
        .route("/v1/relationships/stats", get(api::relationship_stats))
        .route("/v1/relationships/between", get(api::relationships_between))
        .route("/v1/relationships/{id}", get(api::get_relationship))
        .route("/v1/snippets", get(api::search_snippets))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(
        db = %config.db_path.display(),
        auth = config.api_key.is_some(),
        parser = config.parser_cmd.is_some(),
        "code-relations-api listening on {}",
        config.bind_addr
    );
    axum::serve(listener, app).await?;
    Ok(())
}

async fn prepare_storage(config: &Config) -> Result<()> {
    let db_path = config.db_path.clone();
    let reset = config.reset_on_start;
    tokio::task::spawn_blocking(move || -> Result<()> {
        let storage = Storage::open(&db_path)?;
        if reset {
            storage.reset()?;
        }
        storage.close()?;
        Ok(())
    })
    .await??;
    Ok(())
}
