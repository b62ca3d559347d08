use crate::engine::AlertEngine;
use crate::errors::Error;
use crate::gateway::Gateway;
use crate::metrics;
use crate::model::{Context, DeviceId};
use crate::registry::Registry;
use crate::store::Store;
use crate::wire::v1::{
    AlertV1, CreateDeviceV1, CreateReadingV1, DeleteDeviceV1, DeviceV1, ReadingV1, RecentQuery,
    UpdateDeviceV1,
};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, MethodRouter},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::error;

/// Header carrying the caller identity. Logged, not enforced.
pub const IDENTITY_HEADER: &str = "x-grid-user";

const MAX_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub reading_window: usize,
    pub alert_window: usize,
    pub request_timeout: Duration,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            reading_window: 100,
            alert_window: 50,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub gateway: Arc<Gateway>,
    pub registry: Arc<Registry>,
    pub settings: ApiSettings,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, engine: AlertEngine, settings: ApiSettings) -> Self {
        Self {
            gateway: Arc::new(Gateway::new(store.clone(), engine.clone())),
            registry: Arc::new(Registry::new(store.clone(), engine)),
            store,
            settings,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let timeout = state.settings.request_timeout;

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler));
    let router = with_trailing_slash(
        router,
        "/api/devices",
        get(list_devices).post(create_device),
    );
    let router = with_trailing_slash(
        router,
        "/api/devices/:id",
        get(get_device)
            .put(update_device)
            .patch(update_device)
            .delete(delete_device),
    );
    let router = with_trailing_slash(
        router,
        "/api/sensordata",
        get(list_readings).post(create_reading),
    );
    let router = with_trailing_slash(router, "/api/sensordata/:id", get(get_reading));
    let router = with_trailing_slash(router, "/api/alerts", get(list_alerts));
    let router = with_trailing_slash(router, "/api/alerts/:id", get(get_alert));

    router
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Existing dashboards address every resource with a trailing slash.
fn with_trailing_slash(
    router: Router<AppState>,
    path: &str,
    method_router: MethodRouter<AppState>,
) -> Router<AppState> {
    router
        .route(path, method_router.clone())
        .route(&format!("{}/", path), method_router)
}

fn context(headers: &HeaderMap) -> Context {
    headers
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(Context::with_identity)
        .unwrap_or_default()
}

fn window(requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).min(MAX_LIMIT)
}

async fn healthz(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
                .into_response()
        }
    }
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}

async fn list_devices(State(state): State<AppState>) -> Result<Json<Vec<DeviceV1>>, AppError> {
    let devices = state.registry.list().await?;
    Ok(Json(devices.into_iter().map(DeviceV1::from).collect()))
}

async fn create_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateDeviceV1>, JsonRejection>,
) -> Result<(StatusCode, Json<DeviceV1>), AppError> {
    let Json(body) = payload?;
    let ctx = context(&headers);
    let device = state
        .registry
        .register(&ctx, body.into_new_device(&ctx)?)
        .await?;
    Ok((StatusCode::CREATED, Json(device.into())))
}

async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<DeviceId>,
) -> Result<Json<DeviceV1>, AppError> {
    Ok(Json(state.registry.get(id).await?.into()))
}

async fn update_device(
    State(state): State<AppState>,
    Path(id): Path<DeviceId>,
    headers: HeaderMap,
    payload: Result<Json<UpdateDeviceV1>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = payload?;
    let ctx = context(&headers);
    let update = state
        .registry
        .update(&ctx, id, body.into_changes()?)
        .await?;
    Ok((
        warning_headers(&update.warnings),
        Json(DeviceV1::from(update.device)),
    )
        .into_response())
}

async fn delete_device(
    State(state): State<AppState>,
    Path(id): Path<DeviceId>,
    headers: HeaderMap,
) -> Result<Json<DeleteDeviceV1>, AppError> {
    let report = state.registry.delete(&context(&headers), id).await?;
    Ok(Json(report.into()))
}

async fn list_readings(
    State(state): State<AppState>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<Vec<ReadingV1>>, AppError> {
    let limit = window(params.limit, state.settings.reading_window);
    let readings = state.store.recent_readings(params.device, limit).await?;
    Ok(Json(readings.into_iter().map(ReadingV1::from).collect()))
}

async fn create_reading(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateReadingV1>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = payload?;
    let ingested = state
        .gateway
        .ingest(&context(&headers), body.into_submission()?)
        .await?;
    Ok((
        StatusCode::CREATED,
        warning_headers(&ingested.warnings),
        Json(ReadingV1::from(ingested.reading)),
    )
        .into_response())
}

async fn get_reading(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ReadingV1>, AppError> {
    let reading = state.store.get_reading(id).await?.ok_or(Error::NotFound {
        entity: "Reading",
        id,
    })?;
    Ok(Json(reading.into()))
}

async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<Vec<AlertV1>>, AppError> {
    let limit = window(params.limit, state.settings.alert_window);
    let alerts = state.store.recent_alerts(params.device, limit).await?;
    Ok(Json(alerts.into_iter().map(AlertV1::from).collect()))
}

async fn get_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<AlertV1>, AppError> {
    let alert = state
        .store
        .get_alert(id)
        .await?
        .ok_or(Error::NotFound { entity: "Alert", id })?;
    Ok(Json(alert.into()))
}

/// One `Warning` header per alert that could not be persisted.
fn warning_headers(warnings: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for warning in warnings {
        let text: String = warning
            .chars()
            .map(|c| match c {
                '"' => '\'',
                c if c.is_ascii_graphic() || c == ' ' => c,
                _ => '?',
            })
            .collect();
        if let Ok(value) = HeaderValue::from_str(&format!("199 - \"{}\"", text)) {
            headers.append(header::WARNING, value);
        }
    }
    headers
}

/// Maps domain errors onto JSON error responses.
#[derive(Debug)]
pub enum AppError {
    Domain(Error),
    BadRequest(String),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Domain(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, fields) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            AppError::Domain(err) => match err {
                Error::InvalidFields(fields) => (
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    Error::InvalidFields(fields.clone()).to_string(),
                    Some(fields),
                ),
                Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg, None),
                err @ Error::NotFound { .. } => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string(), None)
                }
                err @ Error::TransientStore(_) => {
                    error!("API error: {}", err);
                    let mut response = (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(json!({
                            "error": "Store temporarily unavailable, retry later",
                            "code": "STORE_UNAVAILABLE",
                        })),
                    )
                        .into_response();
                    response
                        .headers_mut()
                        .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
                    return response;
                }
                err => {
                    error!("API error: {}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                        None,
                    )
                }
            },
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(fields) = fields {
            body["fields"] = json!(fields);
        }

        (status, Json(body)).into_response()
    }
}
