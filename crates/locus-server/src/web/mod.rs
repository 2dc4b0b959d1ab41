// crates/locus-server/src/web/mod.rs
// Downstream HTTP surface for interactive clients and diagnostics

pub mod ws;

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::Core;
use crate::dispatch::Origin;
use crate::error::{BrokerError, ErrorKind};
use crate::registry::{ListFilter, ToolCategory};

/// Shared state for the HTTP layer.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<Core>,
}

/// Create the downstream router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/tools", get(tools))
        .route("/invoke", post(invoke))
        .route("/tasks", get(list_tasks))
        .route("/tasks/{id}", get(get_task))
        .route("/ws", get(ws::handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router until the process exits. The same router listens on
/// both configured ports, so interactive clients reach /ws on either.
pub async fn serve(core: Arc<Core>) -> crate::error::Result<()> {
    let http_port = core.http_port();
    let ws_port = core.ws_port();
    let app = create_router(AppState { core });

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", http_port)).await?;
    tracing::info!(port = http_port, "Downstream HTTP endpoint listening");

    if ws_port != http_port {
        match tokio::net::TcpListener::bind(("127.0.0.1", ws_port)).await {
            Ok(ws_listener) => {
                tracing::info!(port = ws_port, "WebSocket endpoint listening");
                let app = app.clone();
                tokio::spawn(async move {
                    if let Err(e) = axum::serve(ws_listener, app).await {
                        tracing::warn!(error = %e, "WebSocket listener stopped");
                    }
                });
            }
            Err(e) => {
                tracing::warn!(port = ws_port, error = %e, "WebSocket port unavailable");
            }
        }
    }

    axum::serve(listener, app)
        .await
        .map_err(|e| BrokerError::Internal(e.to_string()))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let clients = state.core.bridge.client_count().await;
    Json(json!({"status": "healthy", "clients": clients}))
}

#[derive(Debug, Deserialize)]
struct ToolsQuery {
    category: Option<String>,
    query: Option<String>,
    intent: Option<String>,
}

async fn tools(
    State(state): State<AppState>,
    Query(params): Query<ToolsQuery>,
) -> Result<Json<Value>, ApiError> {
    let category = match params.category.as_deref() {
        Some(raw) => Some(ToolCategory::parse(raw).ok_or_else(|| {
            ApiError::from(BrokerError::InvalidArguments(format!(
                "unknown category `{raw}`"
            )))
        })?),
        None => None,
    };
    let filter = ListFilter {
        category,
        query: params.query,
    };
    let payload = state
        .core
        .tools_payload(params.intent.as_deref(), Some(&filter))
        .await;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
struct InvokeRequest {
    name: String,
    #[serde(default)]
    arguments: Value,
    #[serde(rename = "clientId")]
    client_id: Option<String>,
}

async fn invoke(
    State(state): State<AppState>,
    Json(request): Json<InvokeRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut arguments = match request.arguments {
        Value::Null => json!({}),
        other => other,
    };
    if let (Some(client_id), Some(map)) = (request.client_id, arguments.as_object_mut()) {
        map.insert("clientId".to_string(), json!(client_id));
    }
    let result = state
        .core
        .dispatcher
        .dispatch(&request.name, arguments, Origin::Internal)
        .await?;
    Ok(Json(result))
}

async fn list_tasks(State(state): State<AppState>) -> Json<Value> {
    let records = state.core.tasks.snapshot().await;
    Json(json!({"count": records.len(), "tasks": records}))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.core.tasks.get(&id).await {
        Some(record) => Ok(Json(serde_json::to_value(record).unwrap_or(Value::Null))),
        None => Err(ApiError::from(BrokerError::ToolNotFound(format!(
            "task {id}"
        )))),
    }
}

/// Broker errors rendered as structured HTTP responses.
struct ApiError(BrokerError);

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.0.kind() {
            ErrorKind::ToolNotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidArguments
            | ErrorKind::EmptyClipboard
            | ErrorKind::UndoNotSupported => StatusCode::BAD_REQUEST,
            ErrorKind::NoClientAvailable | ErrorKind::ClientDisconnected => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorKind::ClientTimeout | ErrorKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::QueueFull | ErrorKind::UpstreamRateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self.0.to_failure_value())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    async fn app() -> Router {
        let core = Core::with_defaults().await.unwrap();
        create_router(AppState { core })
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_client_count() {
        let app = app().await;
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["clients"], 0);
    }

    #[tokio::test]
    async fn tools_endpoint_filters_by_category() {
        let app = app().await;
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/tools?category=sequence")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let tools = body["tools"].as_array().unwrap();
        assert!(tools.iter().any(|t| t["name"] == "compute_gc"));
        assert!(!tools.iter().any(|t| t["name"] == "uniprot_search"));
    }

    #[tokio::test]
    async fn tools_endpoint_rejects_unknown_category() {
        let app = app().await;
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/tools?category=nonsense")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invoke_mirrors_tools_call() {
        let app = app().await;
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/invoke")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(
                json!({"name": "compute_gc", "arguments": {"sequence": "GGCC"}}).to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["gcContent"], json!(100));
    }

    #[tokio::test]
    async fn invoke_maps_error_kinds_to_status() {
        let app = app().await;
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/invoke")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(
                json!({"name": "navigate_to_position", "arguments": {"chromosome": "chr1", "start": 1, "end": 2}})
                    .to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["kind"], "NoClientAvailable");
    }

    #[tokio::test]
    async fn unknown_task_is_404() {
        let app = app().await;
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/tasks/nope")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
