//! HTTP surface over the enrichment, aggregation, and topic engines.
//!
//! # Endpoints
//!
//! | Method | Path | Query parameters |
//! |--------|------|------------------|
//! | `GET`  | `/` | |
//! | `GET`  | `/health` | |
//! | `GET`  | `/data/all` | `limits` |
//! | `GET`  | `/data` | `column`, `value` |
//! | `PUT`  | `/update/sentiments` | `_id` |
//! | `PUT`  | `/update/sentiments/all` | |
//! | `GET`  | `/get_sentiment` | `aggregate`, `date_only`, `filter_column`, `filter_value` |
//! | `PUT`  | `/update/ner` | `_id` |
//! | `PUT`  | `/update/ner/all` | |
//! | `GET`  | `/get_ner` | `date_only`, `filter_column`, `filter_value` |
//! | `GET`  | `/get_topic_model` | `num_topics`, `relevant_terms` |
//! | `GET`  | `/get_topic_model/visual` | `num_topics` |
//!
//! Any query parameter a route does not list is rejected with `404` before
//! the engines run.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "document 42 not found" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `not_found`, `unchanged`, `unexpected_parameter` | 404 |
//! | `bad_request` | 400 |
//! | `missing_parameter` | 422 |
//! | `batch_failed`, `analysis_failed`, `internal` | 500 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser dashboards can
//! call the API directly.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::aggregate::{AggregationEngine, ColumnFilter, SeriesQuery};
use crate::analysis::{AnalysisProvider, LexiconProvider};
use crate::browse;
use crate::config::Config;
use crate::db;
use crate::enrich::{BatchOutcome, EnrichmentEngine};
use crate::error::EngineError;
use crate::models::Document;
use crate::store::sqlite::SqliteStore;
use crate::store::DocumentStore;
use crate::topics::{FsArtifactStore, TopicModelEngine, VISUAL_FILE_NAME};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn DocumentStore>,
    enrich: Arc<EnrichmentEngine>,
    aggregate: Arc<AggregationEngine>,
    topics: Arc<TopicModelEngine>,
}

impl AppState {
    /// Wires the three engines over one store and one provider.
    pub fn new(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn AnalysisProvider>,
    ) -> Self {
        let artifacts = Arc::new(FsArtifactStore::new(&config.topics.artifact_dir));
        Self {
            enrich: Arc::new(EnrichmentEngine::new(store.clone(), provider.clone())),
            aggregate: Arc::new(AggregationEngine::new(store.clone())),
            topics: Arc::new(TopicModelEngine::new(
                store.clone(),
                provider,
                artifacts,
                config.topics.clone(),
            )),
            store,
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/data/all", get(handle_all_data))
        .route("/data", get(handle_filtered_data))
        .route("/update/sentiments", put(handle_update_sentiment))
        .route("/update/sentiments/all", put(handle_update_all_sentiment))
        .route("/get_sentiment", get(handle_get_sentiment))
        .route("/update/ner", put(handle_update_ner))
        .route("/update/ner/all", put(handle_update_all_ner))
        .route("/get_ner", get(handle_get_ner))
        .route("/get_topic_model", get(handle_topic_model))
        .route("/get_topic_model/visual", get(handle_topic_visual))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`.
///
/// The analysis provider is constructed here, once, and shared by every
/// handler until the server stops.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::new(pool.clone()));
    let provider: Arc<dyn AnalysisProvider> = Arc::new(LexiconProvider::new(&config.analysis));
    tracing::info!(provider = provider.name(), "analysis provider ready");

    let app = router(AppState::new(config, store, provider));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "listening");
    println!("Listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    pool.close().await;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        let (status, code) = match &err {
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            EngineError::NoChange(_) => (StatusCode::NOT_FOUND, "unchanged"),
            EngineError::InvalidParameter(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            EngineError::MissingParameter(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "missing_parameter")
            }
            EngineError::PartialBatchFailure { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "batch_failed")
            }
            EngineError::AnalysisFailure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "analysis_failed")
            }
            EngineError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        AppError::new(status, code, message)
    }
}

// ============ Query parameters ============

type Params = HashMap<String, String>;

fn check_params(params: &Params, allowed: &[&str]) -> Result<(), AppError> {
    let mut extra: Vec<&str> = params
        .keys()
        .map(String::as_str)
        .filter(|k| !allowed.contains(k))
        .collect();
    if extra.is_empty() {
        return Ok(());
    }
    extra.sort_unstable();
    Err(AppError::new(
        StatusCode::NOT_FOUND,
        "unexpected_parameter",
        format!("unexpected query parameter: {}", extra.join(", ")),
    ))
}

fn parse_param<T: FromStr>(params: &Params, name: &str) -> Result<Option<T>, AppError> {
    match params.get(name) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            EngineError::InvalidParameter(format!("{} has an invalid value '{}'", name, raw)).into()
        }),
    }
}

fn parse_flag(params: &Params, name: &str) -> Result<bool, AppError> {
    match params.get(name).map(|v| v.to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(EngineError::InvalidParameter(format!(
                "{} must be a boolean, got '{}'",
                name, v
            ))
            .into()),
        },
    }
}

fn series_query(params: &Params) -> Result<SeriesQuery, AppError> {
    Ok(SeriesQuery {
        date_only: parse_flag(params, "date_only")?,
        filter: ColumnFilter::from_params(
            params.get("filter_column").map(String::as_str),
            params.get("filter_value").map(String::as_str),
        )?,
    })
}

/// Document id from `_id`, or `id` as an alias.
fn document_id(params: &Params) -> Result<&str, AppError> {
    params
        .get("_id")
        .or_else(|| params.get("id"))
        .map(String::as_str)
        .ok_or_else(|| EngineError::MissingParameter("_id".into()).into())
}

fn batch_response(outcome: BatchOutcome) -> serde_json::Value {
    match outcome {
        BatchOutcome::NotNeeded => json!({ "update": false }),
        BatchOutcome::Updated(report) => json!({ "update": true, "report": report }),
    }
}

// ============ Handlers ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Default Page: Please specify route for relevant output" }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_all_data(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Json<Vec<Document>>, AppError> {
    check_params(&params, &["limits"])?;
    let limit = parse_param::<usize>(&params, "limits")?;
    Ok(Json(browse::list_documents(state.store.as_ref(), limit).await?))
}

async fn handle_filtered_data(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Json<Vec<Document>>, AppError> {
    check_params(&params, &["column", "value"])?;
    let column = params
        .get("column")
        .ok_or_else(|| AppError::from(EngineError::MissingParameter("column".into())))?;
    let value = params.get("value").map(String::as_str).unwrap_or("");
    Ok(Json(
        browse::filter_documents(state.store.as_ref(), column, value).await?,
    ))
}

async fn handle_update_sentiment(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_params(&params, &["_id", "id"])?;
    let updated = state.enrich.update_sentiment(document_id(&params)?).await?;
    Ok(Json(json!({
        "update": true,
        "id": updated.id,
        "sentiment": updated.sentiment,
    })))
}

async fn handle_update_all_sentiment(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_params(&params, &[])?;
    let outcome = state.enrich.update_all_sentiment().await?;
    Ok(Json(batch_response(outcome)))
}

async fn handle_get_sentiment(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_params(
        &params,
        &["aggregate", "date_only", "filter_column", "filter_value"],
    )?;
    let mode = params
        .get("aggregate")
        .ok_or_else(|| AppError::from(EngineError::MissingParameter("aggregate".into())))?;
    let query = series_query(&params)?;
    let data = state.aggregate.sentiment_series(mode, &query).await?;
    Ok(Json(json!({ "data": data })))
}

async fn handle_update_ner(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_params(&params, &["_id", "id"])?;
    let updated = state.enrich.update_entities(document_id(&params)?).await?;
    Ok(Json(json!({
        "update": true,
        "id": updated.id,
        "ner": updated.entities,
    })))
}

async fn handle_update_all_ner(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_params(&params, &[])?;
    let outcome = state.enrich.update_all_entities().await?;
    Ok(Json(batch_response(outcome)))
}

async fn handle_get_ner(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_params(&params, &["date_only", "filter_column", "filter_value"])?;
    let query = series_query(&params)?;
    let data = state.aggregate.entity_series(&query).await?;
    Ok(Json(json!({ "data": data })))
}

async fn handle_topic_model(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_params(&params, &["num_topics", "relevant_terms"])?;
    let num_topics = parse_param::<usize>(&params, "num_topics")?;
    let relevant_terms = parse_param::<usize>(&params, "relevant_terms")?;
    let report = state.topics.fit(num_topics, relevant_terms).await?;
    Ok(Json(json!(report)))
}

async fn handle_topic_visual(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Response, AppError> {
    check_params(&params, &["num_topics"])?;
    let num_topics = parse_param::<usize>(&params, "num_topics")?;
    let html = state.topics.visualize(num_topics).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", VISUAL_FILE_NAME),
            ),
        ],
        html,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_unexpected_params_rejected() {
        let err = check_params(&params(&[("limits", "2"), ("zzz", "1")]), &["limits"]).unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "unexpected_parameter");
        assert!(check_params(&params(&[("limits", "2")]), &["limits"]).is_ok());
    }

    #[test]
    fn test_flag_parsing() {
        assert!(parse_flag(&params(&[("date_only", "True")]), "date_only").unwrap());
        assert!(!parse_flag(&params(&[]), "date_only").unwrap());
        let err = parse_flag(&params(&[("date_only", "maybe")]), "date_only").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_mapping() {
        let cases = [
            (EngineError::NotFound("x".into()), StatusCode::NOT_FOUND, "not_found"),
            (EngineError::NoChange("x".into()), StatusCode::NOT_FOUND, "unchanged"),
            (
                EngineError::MissingParameter("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "missing_parameter",
            ),
            (
                EngineError::PartialBatchFailure {
                    failed: 1,
                    total: 1,
                    field: "entities",
                },
                StatusCode::INTERNAL_SERVER_ERROR,
                "batch_failed",
            ),
        ];
        for (err, status, code) in cases {
            let app = AppError::from(err);
            assert_eq!(app.status, status);
            assert_eq!(app.code, code);
        }
    }
}
