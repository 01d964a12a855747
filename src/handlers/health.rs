use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

pub const SERVICE_NAME: &str = "Paimon Cloud Storage API";

#[derive(Serialize, ToSchema)]
pub struct PingResponse {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    pub temp_dir: String,
    pub supported_services: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/ping",
    responses(
        (status = 200, description = "Liveness probe", body = PingResponse)
    ),
    tag = "system"
)]
pub async fn ping() -> impl IntoResponse {
    Json(PingResponse {
        message: "Server running".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Server status and registered providers", body = StatusResponse)
    ),
    tag = "system"
)]
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: SERVICE_NAME.to_string(),
        temp_dir: state.settings.temp_upload_dir.display().to_string(),
        supported_services: state
            .providers
            .supported()
            .iter()
            .map(|name| name.to_string())
            .collect(),
    })
}
