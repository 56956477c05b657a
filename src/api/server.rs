//! HTTP API server

use std::any::Any;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::{from_fn, from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::auth::{require_auth, spawn_session_sweeper, AuthenticationManager, Guard, Permission};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::meter::{self, AcquisitionLoop, MeterClient, MeterError, ReadMode};

use super::error::ApiError;
use super::routes;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthenticationManager>,
    pub acquisition: Arc<AcquisitionLoop>,
}

impl AppState {
    pub fn new(auth: Arc<AuthenticationManager>, acquisition: Arc<AcquisitionLoop>) -> Self {
        Self { auth, acquisition }
    }

    /// Wire an auth manager and acquisition loop from config around `meter`
    pub fn from_config(config: &Config, meter: Arc<dyn MeterClient>) -> Self {
        let auth = AuthenticationManager::from_config(&config.auth);
        let acquisition = AcquisitionLoop::new(
            meter,
            ReadMode::from_detailed(config.meter.detailed),
            config.meter.poll_interval(),
        );
        Self::new(Arc::new(auth), Arc::new(acquisition))
    }
}

/// Run the HTTP API server until Ctrl+C
pub async fn run_server(config: Config) -> Result<()> {
    let meter = meter::connect(&config.meter);

    if config.meter.verify_on_start {
        tracing::info!("Testing connection to power meter...");
        let device = meter.clone();
        let connected = tokio::task::spawn_blocking(move || device.test_connection())
            .await
            .unwrap_or(false);
        if !connected {
            return Err(Error::Meter(MeterError::Unavailable(
                "connection test failed".to_string(),
            )));
        }
    }

    let state = AppState::from_config(&config, meter);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    serve(listener, state, config, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// Starts the acquisition loop and the session sweeper, and stops both
/// before returning.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    config: Config,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cancel = CancellationToken::new();
    state.acquisition.start().await;
    let sweeper = spawn_session_sweeper(
        state.auth.clone(),
        config.auth.cleanup_interval(),
        cancel.clone(),
    );

    let app = create_router(state.clone(), Some(config.server.web_dir.as_path()));
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    cancel.cancel();
    if let Err(e) = sweeper.await {
        tracing::error!("Session sweeper ended abnormally: {}", e);
    }
    state.acquisition.stop().await;
    tracing::info!("Server shut down");

    result.map_err(Error::from)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}

/// Wrap `router` so every route in it passes through `guard` first
fn guarded(router: Router<AppState>, guard: Guard) -> Router<AppState> {
    router.route_layer(from_fn_with_state(guard, require_auth))
}

/// Create the router with all routes
pub fn create_router(state: AppState, web_dir: Option<&Path>) -> Router {
    let auth = state.auth.clone();

    let session_routes = guarded(
        Router::new()
            .route("/api/auth/logout", post(routes::logout))
            .route("/api/auth/change_password", post(routes::change_password)),
        Guard::authenticated(auth.clone()),
    );

    let admin_routes = guarded(
        Router::new().route("/api/auth/sessions", get(routes::list_sessions)),
        Guard::permission(auth.clone(), Permission::ADMIN),
    );

    let read_routes = guarded(
        Router::new()
            .route("/api/power", get(routes::power))
            .route("/api/register/{register}", get(routes::read_register))
            .route("/api/read_registers", get(routes::read_registers)),
        Guard::permission(auth.clone(), Permission::READ),
    );

    let write_routes = guarded(
        Router::new().route("/api/modbus_command", get(routes::modbus_command)),
        Guard::permission(auth, Permission::WRITE),
    );

    let router = Router::new()
        // Open routes
        .route("/api/health", get(routes::health))
        .route("/api/auth/login", post(routes::login))
        .route("/api/auth/validate", get(routes::validate_session))
        .merge(session_routes)
        .merge(admin_routes)
        .merge(read_routes)
        .merge(write_routes)
        .route("/api/{*rest}", any(routes::not_found))
        .method_not_allowed_fallback(routes::method_not_allowed);

    // UI routes
    let router = match web_dir {
        Some(dir) if dir.is_dir() => router.fallback_service(ServeDir::new(dir)),
        _ => router.fallback(routes::not_found),
    };

    with_middleware(router).with_state(state)
}

/// Outer layers shared by every route
fn with_middleware<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(from_fn(preflight))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Answer any bare OPTIONS request with an empty success
async fn preflight(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(req).await
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    ApiError::Internal(detail).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_panicking_handler_becomes_internal_error() {
        async fn boom() -> &'static str {
            panic!("meter driver state: secret-detail")
        }
        let router: Router = with_middleware(Router::new().route("/boom", get(boom)));

        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/boom")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({ "error": "Internal server error" }));
        assert!(!String::from_utf8_lossy(&bytes).contains("secret-detail"));
    }
}
