use crate::auth::Authenticator;
use crate::errors::AppError;
use crate::requests::{ClientsInterestsRequest, MethodRequest, OnlineScoreRequest};
use crate::scoring::{get_interests, get_score};
use crate::store::ResilientStore;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Store handle created once at startup.
    pub store: Arc<ResilientStore>,
    /// Token checker for method envelopes.
    pub auth: Authenticator,
}

/// Per-request values collected while handling a call and logged at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    pub request_id: String,
    /// Number of clients processed by `clients_interests`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nclients: Option<usize>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            nclients: None,
        }
    }
}

/// Business handler for one API method.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn process(
        &self,
        arguments: &Map<String, Value>,
        context: &mut RequestContext,
        store: &ResilientStore,
    ) -> Result<(Value, StatusCode), AppError>;
}

/// `clients_interests`: interests of every requested client.
pub struct ClientsInterestsHandler;

#[async_trait]
impl MethodHandler for ClientsInterestsHandler {
    async fn process(
        &self,
        arguments: &Map<String, Value>,
        context: &mut RequestContext,
        store: &ResilientStore,
    ) -> Result<(Value, StatusCode), AppError> {
        let request = ClientsInterestsRequest::parse(arguments)?;

        let mut response = Map::new();
        for cid in &request.client_ids {
            response.insert(cid.to_string(), get_interests(store, *cid).await?);
        }
        context.nclients = Some(request.client_ids.len());

        Ok((Value::Object(response), StatusCode::OK))
    }
}

/// `online_score`: score of a caller described by the arguments.
pub struct OnlineScoreHandler;

#[async_trait]
impl MethodHandler for OnlineScoreHandler {
    async fn process(
        &self,
        arguments: &Map<String, Value>,
        _context: &mut RequestContext,
        store: &ResilientStore,
    ) -> Result<(Value, StatusCode), AppError> {
        let request = OnlineScoreRequest::parse(arguments)?;
        let score = get_score(store, &request).await;
        Ok((json!({ "score": score }), StatusCode::OK))
    }
}

/// Looks up the handler for a method name.
pub fn dispatch(method: &str) -> Result<&'static dyn MethodHandler, AppError> {
    match method {
        "online_score" => Ok(&OnlineScoreHandler),
        "clients_interests" => Ok(&ClientsInterestsHandler),
        other => Err(AppError::NotFound(format!("Unknown method: {}", other))),
    }
}

/// Validates the envelope, authenticates the caller, then runs the method.
///
/// Authentication happens before the method lookup, so an unauthenticated
/// call never reaches a handler.
pub async fn method_handler(
    body: Value,
    context: &mut RequestContext,
    state: &AppState,
) -> Result<(Value, StatusCode), AppError> {
    let request = MethodRequest::parse(body)?;

    if !state.auth.check(&request) {
        return Err(AppError::Forbidden(format!(
            "invalid token for login {:?}",
            request.login.as_deref().unwrap_or_default()
        )));
    }

    let handler = dispatch(&request.method)?;
    handler
        .process(&request.arguments, context, &state.store)
        .await
}

/// POST /method
///
/// Entry point for all API methods. Success bodies are
/// `{"response": ..., "code": 200}`, failures `{"error": ..., "code": ...}`.
pub async fn method(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut context = RequestContext::new(request_id(&headers));
    tracing::debug!(request_id = %context.request_id, bytes = body.len(), "POST /method");

    let result = match serde_json::from_slice::<Value>(&body) {
        Ok(body) => {
            tracing::info!(
                request_id = %context.request_id,
                "POST /method: {}",
                describe_envelope(&body)
            );
            method_handler(body, &mut context, &state).await
        }
        Err(e) => Err(AppError::from(e)),
    };

    match result {
        Ok((response, code)) => {
            tracing::info!(
                request_id = %context.request_id,
                nclients = ?context.nclients,
                code = code.as_u16(),
                "Request handled"
            );
            (code, Json(json!({ "response": response, "code": code.as_u16() }))).into_response()
        }
        Err(err) => {
            tracing::info!(
                request_id = %context.request_id,
                code = err.status().as_u16(),
                "Request failed: {}",
                err
            );
            err.into_response()
        }
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "scoring-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

async fn not_found() -> Response {
    AppError::NotFound("Not Found".to_string()).into_response()
}

/// Turns a handler panic into a 500 response.
fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    AppError::InternalError(format!("handler panicked: {}", detail)).into_response()
}

/// Loggable view of an envelope. Credentials and arguments are left out.
fn describe_envelope(body: &Value) -> String {
    let text = |name: &str| body.get(name).and_then(Value::as_str).unwrap_or_default();
    format!(
        "method={:?} account={:?} login={:?}",
        text("method"),
        text("account"),
        text("login")
    )
}

/// Request id from `X-Request-Id`, or a fresh one.
fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string())
}

/// Builds the API router around shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/method", post(method))
        .fallback(not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
}
