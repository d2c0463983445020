//! Axum router and server for the control surface and read API.

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use typhoon_reconciler::ReconcilerHandle;
use typhoon_store::MirrorStore;

use crate::error::RpcError;
use crate::handlers;

/// Everything the handlers need, shared behind an `Arc`.
pub struct ApiState<S> {
    pub handle: Arc<ReconcilerHandle<S>>,
    /// Decimal count used to format amounts for display.
    pub token_decimals: u8,
}

impl<S: MirrorStore + Send + Sync + 'static> ApiState<S> {
    pub fn new(handle: Arc<ReconcilerHandle<S>>, token_decimals: u8) -> Self {
        Self {
            handle,
            token_decimals,
        }
    }

    pub fn store(&self) -> &S {
        self.handle.scheduler().store()
    }
}

pub fn router<S: MirrorStore + Send + Sync + 'static>(state: Arc<ApiState<S>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/reconciler/start", post(handlers::start::<S>))
        .route("/reconciler/stop", post(handlers::stop::<S>))
        .route("/status", get(handlers::status::<S>))
        .route("/health", get(handlers::health::<S>))
        .route("/metrics", get(handlers::metrics::<S>))
        .route("/accounts", post(handlers::register::<S>))
        .route(
            "/accounts/by-referral/:referral_id",
            get(handlers::account_by_referral::<S>),
        )
        .route("/accounts/:wallet", get(handlers::account_by_wallet::<S>))
        .route("/accounts/:wallet/referrals", get(handlers::referrals::<S>))
        .route("/accounts/:wallet/purchases", get(handlers::purchases::<S>))
        .route("/audit", get(handlers::audit::<S>))
        .layer(cors)
        .with_state(state)
}

pub struct ApiServer {
    pub port: u16,
}

impl ApiServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve<S, F>(&self, state: Arc<ApiState<S>>, shutdown: F) -> Result<(), RpcError>
    where
        S: MirrorStore + Send + Sync + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| RpcError::Server(format!("bind {addr}: {e}")))?;
        tracing::info!(%addr, "API listening");
        axum::serve(listener, router(state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| RpcError::Server(e.to_string()))
    }
}
