use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use planner_core::auth::{AuthError, CallerContext, require_debug_token};
use planner_core::context::ContextError;
use planner_core::models::{ErrorResponse, parse_coordinate, parse_plan_request};
use planner_core::orchestrator::PipelineError;
use planner_core::{Orchestrator, PlanFailure};

pub const SERVICE_NAME: &str = "planner-service";
/// Error code for a request that exceeded the configured timeout.
pub const REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub debug_token: Arc<str>,
    /// Upper bound on one pipeline run or context fetch.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, debug_token: &str, request_timeout: Duration) -> Self {
        Self {
            orchestrator,
            debug_token: Arc::from(debug_token),
            request_timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    body: ErrorResponse,
}

impl AppError {
    fn unauthorized(err: AuthError) -> Self {
        let status = match err {
            AuthError::MissingHeader | AuthError::InvalidFormat => StatusCode::UNAUTHORIZED,
            AuthError::InvalidToken => StatusCode::FORBIDDEN,
        };
        Self {
            status,
            body: ErrorResponse::new(
                Uuid::new_v4(),
                format!("HTTP_{}", status.as_u16()),
                err.to_string(),
            ),
        }
    }

    fn pipeline(request_id: Uuid, error: PipelineError) -> Self {
        Self::from(PlanFailure { request_id, error })
    }

    /// Debug route failures keep the context error's own code.
    fn context(err: ContextError) -> Self {
        let code = err.code();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorResponse::new(Uuid::new_v4(), code, PipelineError::from(err).to_string()),
        }
    }

    fn timeout(request_id: Uuid, limit: Duration) -> Self {
        Self {
            status: StatusCode::REQUEST_TIMEOUT,
            body: ErrorResponse::new(
                request_id,
                REQUEST_TIMEOUT,
                format!("Request exceeded {}ms", limit.as_millis()),
            ),
        }
    }
}

impl From<PlanFailure> for AppError {
    fn from(failure: PlanFailure) -> Self {
        let status = if failure.kind().is_client_error() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            body: failure.to_response(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/v1/plan", post(create_plan))
        .route("/v1/debug/context", post(debug_context))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!(addr = %addr, "server_listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server_shutdown");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "ctrl_c_handler_failed");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn create_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let caller = CallerContext::from_authorization(authorization(&headers));
    let mut request = parse_plan_request(&body).map_err(PlanFailure::from)?;
    let request_id = *request.request_id.get_or_insert_with(Uuid::new_v4);

    let run = state.orchestrator.process(request, &caller);
    match tokio::time::timeout(state.request_timeout, run).await {
        Ok(result) => Ok(Json(result?).into_response()),
        Err(_) => {
            tracing::warn!(
                request_id = %request_id,
                timeout_ms = state.request_timeout.as_millis() as u64,
                "plan_request_timed_out"
            );
            Err(AppError::timeout(request_id, state.request_timeout))
        }
    }
}

async fn debug_context(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    require_debug_token(authorization(&headers), &state.debug_token)
        .map_err(AppError::unauthorized)?;

    let coordinate = parse_coordinate(&body)
        .map_err(|e| AppError::pipeline(Uuid::new_v4(), e.into()))?;
    let fetch = state.orchestrator.debug_fetch(&coordinate);
    let context = tokio::time::timeout(state.request_timeout, fetch)
        .await
        .map_err(|_| AppError::timeout(Uuid::new_v4(), state.request_timeout))?
        .map_err(AppError::context)?;
    Ok(Json(context).into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use planner_core::{Backends, Orchestrator};
    use planner_test_utils::{
        failing_context_backends, failing_engine_backends, fixed_payload_backends,
        missing_fixture_backends, sample_body, slow_engine_backends,
    };

    use super::AppState;

    const TOKEN: &str = "test-debug-token";

    // -----------------------------------------------------------------------
    // HTTP helpers
    // -----------------------------------------------------------------------

    fn state_with(backends: Backends) -> AppState {
        AppState::new(Orchestrator::new(backends), TOKEN, Duration::from_secs(5))
    }

    async fn send(
        state: AppState,
        method: &str,
        uri: &str,
        auth: Option<&str>,
        body: Body,
    ) -> axum::response::Response {
        let app = super::build_router(state);
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        app.oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    async fn post_json(
        state: AppState,
        uri: &str,
        auth: Option<&str>,
        body: &Value,
    ) -> axum::response::Response {
        let bytes = serde_json::to_vec(body).unwrap();
        send(state, "POST", uri, auth, Body::from(bytes)).await
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn assert_error_shape(body: &Value, code: &str) {
        assert_eq!(body["error"]["code"], code, "body: {body}");
        assert!(body["error"]["message"].is_string());
        assert!(body["request_id"].is_string());
        assert!(body.get("run_id").is_none(), "error body has run_id: {body}");
    }

    // -----------------------------------------------------------------------
    // Health
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_health_and_healthz_are_identical() {
        let health = send(state_with(Backends::stub()), "GET", "/health", None, Body::empty()).await;
        assert_eq!(health.status(), StatusCode::OK);
        let health = body_json(health).await;

        let healthz =
            send(state_with(Backends::stub()), "GET", "/healthz", None, Body::empty()).await;
        assert_eq!(healthz.status(), StatusCode::OK);
        let healthz = body_json(healthz).await;

        assert_eq!(health, healthz);
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["service"], "planner-service");
        assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_health_survives_failing_backends() {
        let resp = send(
            state_with(failing_context_backends("down")),
            "GET",
            "/health",
            None,
            Body::empty(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    // -----------------------------------------------------------------------
    // POST /v1/plan
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_plan_acme_widgets_ok() {
        let resp = post_json(state_with(Backends::stub()), "/v1/plan", None, &sample_body()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert!(body["run_id"].is_string());
        assert!(body["payload"]["plan_version"].is_string());
        assert_eq!(body["payload"]["request_id"], body["request_id"]);
        assert_eq!(body["payload"]["repository"]["name"], "widgets");
    }

    #[tokio::test]
    async fn test_plan_echoes_client_request_id() {
        let id = Uuid::new_v4();
        let mut request = sample_body();
        request["request_id"] = json!(id.to_string());

        let resp = post_json(
            state_with(Backends::stub()),
            "/v1/plan",
            Some("Bearer anything"),
            &request,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["request_id"], id.to_string());
        assert_ne!(body["run_id"], id.to_string());
    }

    #[tokio::test]
    async fn test_plan_missing_vision_is_422() {
        let id = Uuid::new_v4();
        let mut request = sample_body();
        request["request_id"] = json!(id.to_string());
        request["user_input"].as_object_mut().unwrap().remove("vision");

        let resp = post_json(state_with(Backends::stub()), "/v1/plan", None, &request).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(resp).await;
        assert_error_shape(&body, "MISSING_FIELD");
        assert_eq!(body["request_id"], id.to_string());
    }

    #[tokio::test]
    async fn test_plan_blank_must_entry_is_422() {
        let mut request = sample_body();
        request["user_input"]["must"] = json!(["ok", "   "]);

        let resp = post_json(state_with(Backends::stub()), "/v1/plan", None, &request).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_error_shape(&body_json(resp).await, "EMPTY_FIELD");
    }

    #[tokio::test]
    async fn test_plan_unknown_user_input_field_is_422() {
        let mut request = sample_body();
        request["user_input"]["extra"] = json!("x");

        let resp = post_json(state_with(Backends::stub()), "/v1/plan", None, &request).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_error_shape(&body_json(resp).await, "UNKNOWN_FIELD");
    }

    #[tokio::test]
    async fn test_plan_malformed_json_is_422() {
        let resp = send(
            state_with(Backends::stub()),
            "POST",
            "/v1/plan",
            None,
            Body::from("{not json"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_error_shape(&body_json(resp).await, "MALFORMED_REQUEST");
    }

    #[tokio::test]
    async fn test_plan_unknown_repository_is_ok() {
        let mut request = sample_body();
        request["repository"] = json!({"owner": "nobody", "name": "nothing"});

        let resp = post_json(state_with(Backends::stub()), "/v1/plan", None, &request).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_plan_context_failure_is_500() {
        let resp = post_json(
            state_with(failing_context_backends("github unreachable")),
            "/v1/plan",
            None,
            &sample_body(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_error_shape(&body_json(resp).await, "CONTEXT_DRIVER_ERROR");
    }

    #[tokio::test]
    async fn test_plan_generation_failure_is_500() {
        let resp = post_json(
            state_with(failing_engine_backends("model offline")),
            "/v1/plan",
            None,
            &sample_body(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_error_shape(&body_json(resp).await, "PROMPT_ENGINE_ERROR");
    }

    #[tokio::test]
    async fn test_plan_validation_failure_is_422() {
        let resp = post_json(
            state_with(fixed_payload_backends(json!([1, 2, 3]))),
            "/v1/plan",
            None,
            &sample_body(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_error_shape(&body_json(resp).await, "INVALID_PAYLOAD_TYPE");
    }

    // -----------------------------------------------------------------------
    // POST /v1/debug/context
    // -----------------------------------------------------------------------

    fn coordinate_body() -> Value {
        json!({"owner": "test-owner", "name": "test-repo", "ref": "refs/heads/main"})
    }

    #[tokio::test]
    async fn test_debug_context_with_valid_token() {
        let resp = post_json(
            state_with(Backends::stub()),
            "/v1/debug/context",
            Some(&format!("Bearer {TOKEN}")),
            &coordinate_body(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["repo_owner"], "test-owner");
        assert_eq!(body["repo_name"], "test-repo");
        assert_eq!(body["ref"], "refs/heads/main");
        assert!(body["tree_json"].is_string());
    }

    #[tokio::test]
    async fn test_debug_context_missing_header_is_401() {
        let resp = post_json(
            state_with(Backends::stub()),
            "/v1/debug/context",
            None,
            &coordinate_body(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(resp).await;
        assert_error_shape(&body, "HTTP_401");
        assert_eq!(body["error"]["message"], "Authorization header required");
    }

    #[tokio::test]
    async fn test_debug_context_bad_format_is_401() {
        for header in ["InvalidFormat", "Basic abc"] {
            let resp = post_json(
                state_with(Backends::stub()),
                "/v1/debug/context",
                Some(header),
                &coordinate_body(),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "header: {header}");

            let body = body_json(resp).await;
            assert_error_shape(&body, "HTTP_401");
            let message = body["error"]["message"].as_str().unwrap();
            assert!(message.contains("Invalid authorization format"), "{message}");
        }
    }

    #[tokio::test]
    async fn test_debug_context_wrong_token_is_403() {
        let resp = post_json(
            state_with(Backends::stub()),
            "/v1/debug/context",
            Some("Bearer wrong-token"),
            &coordinate_body(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let body = body_json(resp).await;
        assert_error_shape(&body, "HTTP_403");
        assert_eq!(body["error"]["message"], "Invalid token");
    }

    #[tokio::test]
    async fn test_debug_context_driver_failure_is_500() {
        let resp = post_json(
            state_with(failing_context_backends("fixture table unreadable")),
            "/v1/debug/context",
            Some(&format!("Bearer {TOKEN}")),
            &coordinate_body(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(resp).await;
        assert_error_shape(&body, "CONTEXT_DRIVER_ERROR");
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.contains("fixture table unreadable"), "{message}");
    }

    #[tokio::test]
    async fn test_debug_context_invalid_body_is_422() {
        let resp = post_json(
            state_with(Backends::stub()),
            "/v1/debug/context",
            Some(&format!("Bearer {TOKEN}")),
            &json!({"owner": "only-owner"}),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_error_shape(&body_json(resp).await, "MISSING_FIELD");
    }

    #[tokio::test]
    async fn test_debug_context_missing_fixture_is_500_fixture_not_found() {
        let resp = post_json(
            state_with(missing_fixture_backends("mock_context.json")),
            "/v1/debug/context",
            Some(&format!("Bearer {TOKEN}")),
            &coordinate_body(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(resp).await;
        assert_error_shape(&body, "FIXTURE_NOT_FOUND");
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.contains("mock_context.json"), "{message}");
    }

    #[tokio::test]
    async fn test_plan_missing_fixture_keeps_context_driver_error() {
        let resp = post_json(
            state_with(missing_fixture_backends("mock_context.json")),
            "/v1/plan",
            None,
            &sample_body(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_error_shape(&body_json(resp).await, "CONTEXT_DRIVER_ERROR");
    }

    // -----------------------------------------------------------------------
    // Timeouts
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_plan_timeout_returns_error_body_with_request_id() {
        let id = Uuid::new_v4();
        let mut request = sample_body();
        request["request_id"] = json!(id.to_string());

        let state = AppState::new(
            Orchestrator::new(slow_engine_backends(Duration::from_secs(5))),
            TOKEN,
            Duration::from_millis(50),
        );
        let resp = post_json(state, "/v1/plan", None, &request).await;
        assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);

        let body = body_json(resp).await;
        assert_error_shape(&body, "REQUEST_TIMEOUT");
        assert_eq!(body["request_id"], id.to_string());
    }

    #[tokio::test]
    async fn test_plan_timeout_generates_request_id_when_absent() {
        let state = AppState::new(
            Orchestrator::new(slow_engine_backends(Duration::from_secs(5))),
            TOKEN,
            Duration::from_millis(50),
        );
        let resp = post_json(state, "/v1/plan", None, &sample_body()).await;
        assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);

        let body = body_json(resp).await;
        assert_error_shape(&body, "REQUEST_TIMEOUT");
        let request_id: Uuid = body["request_id"].as_str().unwrap().parse().unwrap();
        assert!(!request_id.is_nil());
    }

    #[tokio::test]
    async fn test_slow_engine_within_timeout_succeeds() {
        let state = AppState::new(
            Orchestrator::new(slow_engine_backends(Duration::from_millis(10))),
            TOKEN,
            Duration::from_secs(5),
        );
        let resp = post_json(state, "/v1/plan", None, &sample_body()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
