use std::{collections::BTreeMap, path::PathBuf};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use code_relations_api::{
    importer::{self, ImportOptions, ImportOutcome, Importer, SkippedFile},
    models::{FileGraph, IndexedNode, RelationshipType, StoredRelationship},
    parser::ExternalCommandParser,
    query::{QueryEngine, QueryOptions},
    storage::{RelationshipFilter, SnippetQuery, Storage},
    CoreError, CoreResult,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::{auth::verify_bearer, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProjectRequest {
    pub project_path: String,
}

#[derive(Debug, Deserialize)]
pub struct ImportGraphsRequest {
    pub graphs: Vec<FileGraph>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub files: usize,
    pub nodes: usize,
    pub virtual_nodes: usize,
    pub relationships: usize,
    pub skipped: Vec<SkippedFile>,
}

impl From<&ImportOutcome> for ImportSummary {
    fn from(outcome: &ImportOutcome) -> Self {
        Self {
            files: outcome.graphs.len(),
            nodes: outcome.nodes.len(),
            virtual_nodes: outcome.virtual_nodes,
            relationships: outcome.relationships.len(),
            skipped: outcome.skipped.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SimilarParams {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RelationshipParams {
    #[serde(default, rename = "type")]
    pub relationship_type: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct BetweenParams {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

#[derive(Debug, Serialize)]
pub struct RelationshipPage {
    pub relationships: Vec<StoredRelationship>,
    pub total: usize,
    pub nodes: BTreeMap<String, IndexedNode>,
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true, "timestamp": Utc::now() }))
}

pub async fn import_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ImportProjectRequest>,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    let project_path = payload.project_path.trim().to_string();
    if project_path.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_INPUT",
            "Request must include projectPath.",
        );
    }
    let Some(parser_cmd) = state.config.parser_cmd.clone() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "PARSER_NOT_CONFIGURED",
            "Set CODEGRAPH_PARSER_CMD to import projects from disk.",
        );
    };

    let _guard = state.import_lock.lock().await;
    let options = ImportOptions {
        scan: state.config.scan.clone(),
        granularity: state.config.granularity,
    };
    let db_path = state.config.db_path.clone();
    let root = PathBuf::from(&project_path);
    let joined = tokio::task::spawn_blocking(move || -> CoreResult<ImportOutcome> {
        let parser = ExternalCommandParser::from_command_line(&parser_cmd)?;
        Importer::new(&parser, options).import_project(&root, &db_path)
    })
    .await;

    match flatten_join(joined) {
        Ok(outcome) => {
            info!(
                project = %project_path,
                nodes = outcome.nodes.len(),
                relationships = outcome.relationships.len(),
                skipped = outcome.skipped.len(),
                "project imported"
            );
            let summary = ImportSummary::from(&outcome);
            state.indexer.write().await.extend(outcome.nodes);
            (StatusCode::OK, Json(summary)).into_response()
        }
        Err(response) => response,
    }
}

pub async fn import_graphs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ImportGraphsRequest>,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    if payload.graphs.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_INPUT",
            "Request must include at least one graph.",
        );
    }

    let _guard = state.import_lock.lock().await;
    let granularity = state.config.granularity;
    let outcome = match with_storage(&state, move |storage| {
        importer::import_graphs(payload.graphs, storage, granularity)
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(response) => return response,
    };

    info!(
        graphs = outcome.graphs.len(),
        nodes = outcome.nodes.len(),
        relationships = outcome.relationships.len(),
        "graphs imported"
    );
    let summary = ImportSummary::from(&outcome);
    state.indexer.write().await.extend(outcome.nodes);
    (StatusCode::OK, Json(summary)).into_response()
}

pub async fn query_nodes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(options): Json<QueryOptions>,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    let indexer = state.indexer.read().await;
    let result = QueryEngine::new(&indexer)
        .with_default_limit(state.config.default_query_limit)
        .query(&options);
    (StatusCode::OK, Json(result)).into_response()
}

pub async fn similar_nodes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SimilarParams>,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    let name = params.name.trim();
    if name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "INVALID_INPUT", "name is required.");
    }

    let limit = params
        .limit
        .filter(|limit| *limit > 0)
        .unwrap_or(state.config.default_query_limit);
    let indexer = state.indexer.read().await;
    let nodes = QueryEngine::new(&indexer).similar(name, limit);
    (StatusCode::OK, Json(json!({ "nodes": nodes }))).into_response()
}

pub async fn get_node(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    match with_storage(&state, move |storage| storage.get_node_by_id(&id)).await {
        Ok(Some(node)) => (StatusCode::OK, Json(node)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "NODE_NOT_FOUND", "Node not found."),
        Err(response) => response,
    }
}

pub async fn list_relationships(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RelationshipParams>,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    let relationship_type = match params.relationship_type.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse::<RelationshipType>() {
            Ok(relationship_type) => Some(relationship_type),
            Err(_) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "INVALID_INPUT",
                    &format!("Unknown relationship type: {raw}"),
                )
            }
        },
    };
    let filter = RelationshipFilter {
        relationship_type,
        from: params.from,
        to: params.to,
    };

    let page = with_storage(&state, move |storage| {
        let relationships = storage.get_relationships(&filter, params.limit, params.offset)?;
        let total = storage.count_relationships(&filter)?;
        let nodes = endpoint_nodes(storage, &relationships)?;
        Ok(RelationshipPage {
            relationships,
            total,
            nodes,
        })
    })
    .await;

    match page {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(response) => response,
    }
}

pub async fn relationship_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    match with_storage(&state, |storage| storage.relationship_stats()).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(response) => response,
    }
}

pub async fn relationships_between(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BetweenParams>,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    if params.from.trim().is_empty() || params.to.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_INPUT",
            "Both from and to are required.",
        );
    }

    match with_storage(&state, move |storage| {
        storage.get_relationships_between(params.from.trim(), params.to.trim())
    })
    .await
    {
        Ok(relationships) => {
            (StatusCode::OK, Json(json!({ "relationships": relationships }))).into_response()
        }
        Err(response) => response,
    }
}

pub async fn get_relationship(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    let found = with_storage(&state, move |storage| {
        let Some(relationship) = storage.get_relationship_by_id(&id)? else {
            return Ok(None);
        };
        let from = storage.get_node_by_id(&relationship.relationship.from)?;
        let to = storage.get_node_by_id(&relationship.relationship.to)?;
        Ok(Some(json!({ "relationship": relationship, "from": from, "to": to })))
    })
    .await;

    match found {
        Ok(Some(body)) => (StatusCode::OK, Json(body)).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "RELATIONSHIP_NOT_FOUND",
            "Relationship not found.",
        ),
        Err(response) => response,
    }
}

pub async fn search_snippets(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(mut query): Query<SnippetQuery>,
) -> impl IntoResponse {
    if let Err(err) = verify_bearer(&headers, state.config.api_key.as_deref()) {
        return err.into_response();
    }

    if query.limit.is_none() {
        query.limit = Some(state.config.default_query_limit);
    }
    match with_storage(&state, move |storage| storage.snippets(&query)).await {
        Ok(nodes) => (StatusCode::OK, Json(json!({ "nodes": nodes }))).into_response(),
        Err(response) => response,
    }
}

fn endpoint_nodes(
    storage: &Storage,
    relationships: &[StoredRelationship],
) -> CoreResult<BTreeMap<String, IndexedNode>> {
    let mut nodes = BTreeMap::new();
    for rel in relationships {
        for endpoint in [&rel.relationship.from, &rel.relationship.to] {
            if nodes.contains_key(endpoint) {
                continue;
            }
            if let Some(node) = storage.get_node_by_id(endpoint)? {
                nodes.insert(endpoint.clone(), node);
            }
        }
    }
    Ok(nodes)
}

async fn with_storage<T, F>(state: &AppState, operation: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&Storage) -> CoreResult<T> + Send + 'static,
{
    let db_path = state.config.db_path.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let storage = Storage::open(&db_path)?;
        let result = operation(&storage);
        if let Err(err) = storage.close() {
            warn!(error = %err, "failed to close storage");
        }
        result
    })
    .await;
    flatten_join(joined)
}

fn flatten_join<T>(
    joined: Result<CoreResult<T>, tokio::task::JoinError>,
) -> Result<T, Response> {
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(core_error_response(&err)),
        Err(err) => {
            warn!(error = %err, "storage task failed");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "TASK_FAILED",
                "Background task failed.",
            ))
        }
    }
}

fn core_error_response(err: &CoreError) -> Response {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        warn!(code = err.code(), error = %err, "request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    error_response(status, err.code(), &err.to_string())
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        })),
    )
        .into_response()
}
