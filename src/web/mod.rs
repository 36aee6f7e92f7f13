pub mod handlers;
pub mod pages;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::services::StudioService;

#[derive(Clone)]
pub struct WebState {
    pub service: Arc<StudioService>,
    /// 根令牌，每个请求派生子令牌
    pub shutdown: CancellationToken,
}

pub fn router(state: WebState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route(
            "/generate",
            get(handlers::generate_get).post(handlers::generate_post),
        )
        .route("/download", get(handlers::download))
        .route("/static/style.css", get(handlers::stylesheet))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}
