//! HTTP surface: one set of routes per mounted resource.
//!
//! | method   | path            | engine operation |
//! |----------|-----------------|------------------|
//! | `GET`    | `/<name>`       | list             |
//! | `GET`    | `/<name>/{id}`  | get              |
//! | `POST`   | `/<name>`       | create / upsert  |
//! | `PUT`    | `/<name>/{id}`  | update by id     |
//! | `PUT`    | `/<name>`       | filtered update  |
//! | `DELETE` | `/<name>/{id}`  | delete by id     |
//! | `DELETE` | `/<name>`       | filtered delete  |

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, Request, State};
use axum::http::{StatusCode, Uri};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use deadpool_postgres::Pool;
use pgresource::engine::require_filters;
use pgresource::filter::{parse_filters, parse_query_string};
use pgresource::{
    CreateInput, CreateOutcome, ListQuery, ResourceEngine, ResourceError, ResourceRegistry, Row,
    UpdateManyOutcome, UpdateOutcome,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A [`ResourceError`] rendered as `{"error": "..."}` with a matching status.
#[derive(Debug)]
pub struct ApiError(pub ResourceError);

impl From<ResourceError> for ApiError {
    fn from(err: ResourceError) -> Self {
        Self(err)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[must_use]
pub fn error_status(err: &ResourceError) -> StatusCode {
    match err {
        ResourceError::Validation(_) => StatusCode::BAD_REQUEST,
        ResourceError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = error_status(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

#[derive(Clone)]
struct ResourceState {
    engine: Arc<ResourceEngine>,
    pool: Pool,
}

impl ResourceState {
    async fn connection(&self) -> ApiResult<deadpool_postgres::Client> {
        Ok(self.pool.get().await.map_err(ResourceError::from)?)
    }

    fn not_found(&self, id: &str) -> ApiError {
        ApiError(ResourceError::not_found(format!(
            "{} '{id}' not found",
            self.engine.name()
        )))
    }
}

/// Build the application router for every engine in `registry`.
pub fn router(registry: &ResourceRegistry, pool: Pool, request_timeout: Option<Duration>) -> Router {
    let mut app = Router::new().route("/healthz", get(healthz));
    for engine in registry.engines() {
        app = app.merge(resource_routes(ResourceState {
            engine: engine.clone(),
            pool: pool.clone(),
        }));
    }
    app.fallback(unknown_route)
        .layer(from_fn_with_state(request_timeout, request_middleware))
}

fn resource_routes(state: ResourceState) -> Router {
    let name = state.engine.name().to_string();
    Router::new()
        .route(
            &format!("/{name}"),
            get(list).post(create).put(update_where).delete(delete_where),
        )
        .route(
            &format!("/{name}/{{id}}"),
            get(get_one).put(update_one).delete(delete_one),
        )
        .with_state(state)
}

/// Log each request and enforce the configured timeout.
async fn request_middleware(
    State(timeout): State<Option<Duration>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = match timeout {
        Some(limit) => match tokio::time::timeout(limit, next.run(request)).await {
            Ok(response) => response,
            Err(_) => ApiError(ResourceError::Timeout(limit)).into_response(),
        },
        None => next.run(request).await,
    };

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

async fn unknown_route(uri: Uri) -> ApiError {
    ApiError(ResourceError::not_found(format!("no resource at {}", uri.path())))
}

async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

fn status(message: &str) -> Json<Value> {
    Json(json!({"status": message}))
}

fn parse_body(body: &Bytes) -> Result<Value, ResourceError> {
    serde_json::from_slice(body)
        .map_err(|e| ResourceError::validation(format!("invalid JSON body: {e}")))
}

fn parse_patch(body: &Bytes) -> Result<Row, ResourceError> {
    match parse_body(body)? {
        Value::Object(patch) => Ok(patch),
        _ => Err(ResourceError::validation("request body must be a JSON object")),
    }
}

/// `on_conflict=a,b` → `["a", "b"]`.
fn conflict_columns(pairs: &[(String, Option<String>)]) -> Option<Vec<String>> {
    pairs
        .iter()
        .find(|(key, _)| key == "on_conflict")
        .and_then(|(_, value)| value.as_deref())
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
}

async fn list(State(state): State<ResourceState>, RawQuery(raw): RawQuery) -> ApiResult<Json<Vec<Value>>> {
    let query = ListQuery::from_query_string(raw.as_deref().unwrap_or_default())?;
    let conn = state.connection().await?;
    Ok(Json(state.engine.list(&conn, &query).await?))
}

async fn get_one(State(state): State<ResourceState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let conn = state.connection().await?;
    match state.engine.get(&conn, &id).await? {
        Some(row) => Ok(Json(row)),
        None => Err(state.not_found(&id)),
    }
}

async fn create(
    State(state): State<ResourceState>,
    RawQuery(raw): RawQuery,
    body: Bytes,
) -> ApiResult<Response> {
    let pairs = parse_query_string(raw.as_deref().unwrap_or_default());
    let conflict = conflict_columns(&pairs);
    let input = CreateInput::from_json(parse_body(&body)?)?;
    if matches!(&input, CreateInput::Many(rows) if rows.is_empty()) {
        return Ok((StatusCode::OK, Json(json!([]))).into_response());
    }

    let conn = state.connection().await?;
    let outcome = state.engine.create(&conn, input, conflict.as_deref()).await?;
    Ok(match outcome {
        CreateOutcome::One(Some(row)) => (StatusCode::CREATED, Json(row)).into_response(),
        CreateOutcome::One(None) => status("no changes").into_response(),
        CreateOutcome::Many(rows) => (StatusCode::CREATED, Json(rows)).into_response(),
    })
}

async fn update_one(
    State(state): State<ResourceState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let patch = parse_patch(&body)?;
    let conn = state.connection().await?;
    match state.engine.update_by_id(&conn, &id, patch).await? {
        UpdateOutcome::Updated(row) => Ok(Json(row).into_response()),
        UpdateOutcome::NoChanges => Ok(status("no changes").into_response()),
        UpdateOutcome::NotFound => Err(state.not_found(&id)),
    }
}

async fn update_where(
    State(state): State<ResourceState>,
    RawQuery(raw): RawQuery,
    body: Bytes,
) -> ApiResult<Response> {
    let filters = parse_filters(parse_query_string(raw.as_deref().unwrap_or_default()));
    require_filters(&filters, "update")?;
    let patch = parse_patch(&body)?;
    let conn = state.connection().await?;
    Ok(match state.engine.update_where(&conn, &filters, patch).await? {
        UpdateManyOutcome::Updated(rows) => Json(rows).into_response(),
        UpdateManyOutcome::NoChanges => status("no changes").into_response(),
    })
}

async fn delete_one(State(state): State<ResourceState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let conn = state.connection().await?;
    // Deleting a missing row is not an error, so repeated deletes succeed.
    state.engine.delete_by_id(&conn, &id).await?;
    Ok(status("deleted"))
}

async fn delete_where(State(state): State<ResourceState>, RawQuery(raw): RawQuery) -> ApiResult<Json<Value>> {
    let filters = parse_filters(parse_query_string(raw.as_deref().unwrap_or_default()));
    require_filters(&filters, "delete")?;
    let conn = state.connection().await?;
    state.engine.delete_where(&conn, &filters).await?;
    Ok(status("deleted"))
}
