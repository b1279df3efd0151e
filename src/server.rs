//! HTTP read API over the pool.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{PoolError, StoreError};
use crate::proxy::ProxyRecord;
use crate::store::PoolStore;

/// Error answered by the read API.
pub enum ApiError {
    Empty,
    Store(StoreError),
}

impl From<PoolError> for ApiError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Empty(_) => ApiError::Empty,
            PoolError::Store(err) => ApiError::Store(err),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Empty => (StatusCode::SERVICE_UNAVAILABLE, "no proxy available").into_response(),
            ApiError::Store(err) => {
                error!("read api failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "store unavailable").into_response()
            }
        }
    }
}

async fn ping() -> &'static str {
    "pong"
}

async fn random(State(store): State<Arc<PoolStore>>) -> Result<String, ApiError> {
    Ok(store.pick_random().await?.identity())
}

async fn all(State(store): State<Arc<PoolStore>>) -> Result<Json<Vec<ProxyRecord>>, ApiError> {
    Ok(Json(store.list_all().await?))
}

async fn count(State(store): State<Arc<PoolStore>>) -> Result<Json<usize>, ApiError> {
    Ok(Json(store.count().await?))
}

/// Routes of the read API.
pub fn router(store: Arc<PoolStore>) -> Router {
    Router::new()
        .route("/", get(ping))
        .route("/ping", get(ping))
        .route("/random", get(random))
        .route("/all", get(all))
        .route("/count", get(count))
        .with_state(store)
}

/// Serve the read API on `addr` until `shutdown` fires.
pub async fn serve(
    store: Arc<PoolStore>,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("read api listening on {}", listener.local_addr()?);
    axum::serve(listener, router(store))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
