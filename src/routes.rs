use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{info, info_span};
use uuid::Uuid;

use crate::error::AppError;
use crate::feature::FeatureSource;
use crate::models::{MessageBody, PredictionBody, Status, UserRecord, USER_FIELDS};
use crate::registry::ModelRegistry;
use crate::store::{RecordStore, StoreError};

/// Everything a handler needs. Built once in `main` and shared read-only.
pub struct AppState {
    pub store: RecordStore,
    pub registry: ModelRegistry,
    pub features: Box<dyn FeatureSource>,
    pub static_dir: PathBuf,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-");
        info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id,
        )
    });

    let pages = &state.static_dir;

    Router::new()
        .route_service("/", ServeFile::new(pages.join("home.html")))
        .route_service("/login.html", ServeFile::new(pages.join("login.html")))
        .route_service("/signup.html", ServeFile::new(pages.join("signup.html")))
        .route_service("/index.html", ServeFile::new(pages.join("index.html")))
        .route("/signup", post(signup_handler))
        .route("/login", post(login_handler))
        .route("/process", post(process_handler))
        .fallback_service(ServeDir::new(pages))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(RequestUuid))
                .layer(trace)
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors),
        )
        .with_state(state)
}

#[derive(Clone, Copy, Default)]
struct RequestUuid;

impl MakeRequestId for RequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<Json<MessageBody>, AppError> {
    let record = signup_record(&payload)?;
    let email = record.email.clone();
    with_store(&state, move |store| store.append(&record)).await?;

    info!("Registered user {email}");
    Ok(Json(MessageBody::success("User registered successfully")))
}

/// Any email or password that is absent or not a JSON string simply fails
/// to match.
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<Json<MessageBody>, AppError> {
    let text = |field: &str| payload.get(field).and_then(Value::as_str).map(str::to_owned);
    let (Some(email), Some(password)) = (text("email"), text("password")) else {
        return Err(AppError::Unauthorized);
    };

    let found =
        with_store(&state, move |store| store.find_by_credentials(&email, &password)).await?;

    match found {
        Some(_) => Ok(Json(MessageBody::success("Login successful"))),
        None => Err(AppError::Unauthorized),
    }
}

pub async fn process_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PredictionBody>, AppError> {
    if !state.registry.is_ready() {
        return Err(AppError::ServiceUnavailable);
    }

    let feature = state.features.next_feature();
    let result = state.registry.predict(feature)?;

    Ok(Json(PredictionBody {
        status: Status::Success,
        result,
    }))
}

/// Runs a store operation on the blocking pool so file I/O and the store
/// lock never hold an async worker.
async fn with_store<T, F>(state: &Arc<AppState>, op: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&RecordStore) -> Result<T, StoreError> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || op(&state.store))
        .await
        .map_err(|err| AppError::Internal(format!("store task failed: {err}")))?
        .map_err(AppError::from)
}

/// Pulls the five user fields out of a signup body.
///
/// Absent and `null` fields are reported together; strings are taken as-is
/// and numbers or booleans by their JSON text.
fn signup_record(payload: &Value) -> Result<UserRecord, AppError> {
    let mut values = Vec::with_capacity(USER_FIELDS.len());
    let mut missing = Vec::new();

    for field in USER_FIELDS {
        match payload.get(field) {
            None | Some(Value::Null) => missing.push(field),
            Some(Value::String(text)) => values.push(text.clone()),
            Some(Value::Number(number)) => values.push(number.to_string()),
            Some(Value::Bool(flag)) => values.push(flag.to_string()),
            Some(_) => return Err(AppError::InvalidField(field)),
        }
    }

    if !missing.is_empty() {
        return Err(AppError::MissingFields(missing));
    }

    let mut values = values.into_iter();
    let mut next = || values.next().unwrap_or_default();

    Ok(UserRecord {
        name: next(),
        phone: next(),
        email: next(),
        gender: next(),
        password: next(),
    })
}
