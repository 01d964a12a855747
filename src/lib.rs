pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod providers;
pub mod staging;

use std::sync::Arc;

use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use utoipa::OpenApi;

use crate::config::Settings;
use crate::providers::ProviderRegistry;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::ping,
        handlers::health::status,
        handlers::upload::upload_file,
    ),
    components(
        schemas(
            handlers::health::PingResponse,
            handlers::health::StatusResponse,
            handlers::upload::UploadResponse,
        )
    ),
    tags(
        (name = "system", description = "Health endpoints"),
        (name = "upload", description = "Upload relay endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub providers: Arc<ProviderRegistry>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(handlers::health::ping))
        .route("/status", get(handlers::health::status))
        .route(
            "/upload",
            post(handlers::upload::upload_file).layer(from_fn_with_state(
                state.clone(),
                middleware::auth::require_auth_token,
            )),
        )
        .route("/api-docs/openapi.json", get(openapi_json))
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
