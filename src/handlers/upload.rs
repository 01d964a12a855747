use std::time::Duration;

use axum::{
    Json,
    extract::{Multipart, Query, State},
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tokio_util::io::StreamReader;
use tracing::info;
use utoipa::ToSchema;

use crate::AppState;
use crate::error::AppError;
use crate::providers::{ProviderError, ProviderKind};
use crate::staging::StagedFile;

#[derive(Deserialize)]
pub struct UploadQuery {
    /// Cloud storage service to use. Defaults to "mega".
    pub service: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub status: String,
    pub message: String,
    pub filename: String,
    pub service: String,
    pub link: String,
}

#[utoipa::path(
    post,
    path = "/upload",
    params(
        ("service" = Option<String>, Query, description = "Cloud storage service to use (default: mega)")
    ),
    responses(
        (status = 200, description = "File uploaded", body = UploadResponse),
        (status = 400, description = "Unsupported service, missing file or empty file"),
        (status = 401, description = "Missing authentication token"),
        (status = 403, description = "Invalid authentication token"),
        (status = 502, description = "Provider upload failed")
    ),
    tag = "upload"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let service = query.service.as_deref().unwrap_or("mega");

    let kind: ProviderKind = service.parse().map_err(|_| {
        AppError::BadRequest(format!(
            "Unsupported service: {}. Supported services: {}",
            service,
            state.providers.supported().join(", ")
        ))
    })?;

    let provider = state.providers.get(kind).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Service '{}' is not yet available. Supported services: {}",
            kind,
            state.providers.supported().join(", ")
        ))
    })?;

    // The staged file is dropped on every path out of this function,
    // which removes the on-disk copy.
    let staged = stage_file_field(&state, &mut multipart).await?;
    if staged.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
    }

    info!(
        filename = %staged.filename(),
        service = %kind,
        size = staged.size(),
        "Upload started"
    );

    let deadline = Duration::from_secs(state.settings.provider_timeout_secs);
    let link = match timeout(deadline, provider.upload(staged.path(), staged.filename())).await {
        Ok(result) => result?,
        Err(_) => return Err(AppError::Provider(ProviderError::Timeout)),
    };

    info!(filename = %staged.filename(), link = %link, "Upload completed");

    Ok(Json(UploadResponse {
        status: "success".to_string(),
        message: "File uploaded successfully".to_string(),
        filename: staged.filename().to_string(),
        service: kind.to_string(),
        link,
    }))
}

/// Streams the `file` multipart field into the temp directory.
async fn stage_file_field(
    state: &AppState,
    multipart: &mut Multipart,
) -> Result<StagedFile, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(err.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .ok_or_else(|| AppError::BadRequest("No filename provided".to_string()))?
            .to_string();

        let reader = StreamReader::new(
            field.map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err)),
        );

        let staged = StagedFile::create(&state.settings.temp_upload_dir, &filename, reader)
            .await
            .map_err(|err| {
                AppError::Internal(anyhow::anyhow!("failed to stage upload: {err}"))
            })?;

        return Ok(staged);
    }

    Err(AppError::BadRequest(
        "Missing multipart field 'file'".to_string(),
    ))
}
