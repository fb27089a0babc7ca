//! Upload endpoint: decodes the multipart form and hands the pipeline a
//! fully buffered request. Delegates all validation to the service so a
//! rejected upload provably touches neither store.

use crate::{
    errors::AppError,
    models::reports::UploadResponse,
    services::guestbook::{UploadRequest, UploadedFile},
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
};

/// `POST /api/upload` — submit one guestbook entry with one media file.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut request = UploadRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        // Owned copy: reading the field body consumes it.
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "name" => request.name = field.text().await.map_err(multipart_error)?,
            "message" => request.message = field.text().await.map_err(multipart_error)?,
            "media" => {
                let original_name = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                request.file = Some(UploadedFile {
                    original_name,
                    mime_type,
                    data,
                });
            }
            other => {
                tracing::debug!(field = other, "ignoring unknown upload field");
                let _ = field.bytes().await;
            }
        }
    }

    let response = state.service.upload(request).await?;
    Ok(Json(response))
}

/// Multipart decode failures keep their transport status (413 for an
/// exceeded body limit, 400 otherwise).
fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}
