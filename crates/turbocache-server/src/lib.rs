// Library exports for turbocache-server
// Integration tests build the router from here

pub mod artifact;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod state;

pub use artifact::{ArtifactKey, ArtifactMetadata, ArtifactQuery};
pub use auth::TokenSet;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::header::AUTHORIZATION,
    middleware,
    routing::{get, post},
    Router,
};
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{sensitive_headers::SetSensitiveRequestHeadersLayer, trace::TraceLayer};

/// Upper bound for an events batch
const EVENTS_BODY_LIMIT: usize = 1024 * 1024;

/// How long in-flight requests may keep running once shutdown starts
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Create the axum router with all cache endpoints under `/{api_version}`
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut artifact = get(handlers::get_artifact).head(handlers::head_artifact);
    // read-only mode leaves PUT unrouted, so uploads get 405
    if !state.read_only {
        artifact = artifact.put(handlers::put_artifact);
    }

    let api = Router::new()
        .route("/artifacts/status", get(handlers::status))
        .route(
            "/artifacts/events",
            post(handlers::record_events).layer(DefaultBodyLimit::max(EVENTS_BODY_LIMIT)),
        )
        .route("/artifacts/:hash", artifact)
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::auth_middleware,
        ))
        .with_state(Arc::clone(&state));

    Router::new()
        .nest(&format!("/{}", state.api_version), api)
        .layer(TraceLayer::new_for_http())
        // outermost, so traces never see the token
        .layer(SetSensitiveRequestHeadersLayer::new([AUTHORIZATION]))
}

/// Serve `app` until `signal` resolves, then drain in-flight requests
///
/// Requests still running `grace` after the signal are dropped along with
/// their connections.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    signal: F,
    grace: Duration,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (stopping, mut stopped) = watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            stopping.send_replace(true);
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result,
        _ = stopped.changed() => {}
    }

    match tokio::time::timeout(grace, server).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("Requests still in flight after {:?}, closing them", grace);
            Ok(())
        }
    }
}
