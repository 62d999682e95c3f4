//! HTTP handlers. Each one validates its inputs, hands off to the relay and
//! shapes the JSON (or file) response.

use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::common::AppError;
use crate::server::state::AppState;
use crate::transfer::{RelayError, SourceKind, StagedFile, TransferRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadBody {
    pub url_file: Option<String>,
    pub base64_file: Option<String>,
    pub path: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadParams {
    pub path: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub path: Option<String>,
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::Relay(RelayError::InvalidInput(message.into()))
}

/// Blank strings count as missing.
fn required(value: Option<String>, name: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| invalid(format!("{name} is required")))
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn source_from_body(url_file: Option<String>, base64_file: Option<String>) -> Result<SourceKind, AppError> {
    match (present(url_file), present(base64_file)) {
        (Some(url), None) => Ok(SourceKind::RemoteUrl(url)),
        (None, Some(payload)) => Ok(SourceKind::InlinePayload(payload)),
        (Some(_), Some(_)) => Err(invalid("provide either urlFile or base64File, not both")),
        (None, None) => Err(invalid("either urlFile or base64File is required")),
    }
}

/// POST /api/upload
pub async fn upload(
    State(state): State<AppState>,
    body: Result<Json<UploadBody>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = body.map_err(|e| invalid(format!("invalid JSON body: {}", e.body_text())))?;

    let source = source_from_body(body.url_file, body.base64_file)?;
    let directory = required(body.path, "path")?;
    let file_name = required(body.file_name, "fileName")?;

    let result = state
        .relay
        .upload(TransferRequest {
            source,
            directory,
            file_name,
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "File uploaded successfully",
        "details": {
            "remotePath": result.remote_path,
            "size": result.size,
            "contentType": result.content_type,
            "source": result.source,
        }
    })))
}

/// POST /api/upload/direct (multipart: `file`, `path`, optional `fileName`)
pub async fn upload_direct(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let mut staged: Option<StagedFile> = None;
    let mut original_name: Option<String> = None;
    let mut directory: Option<String> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| invalid(format!("invalid multipart body: {}", e.body_text())))?
    {
        match field.name() {
            Some("file") => {
                if staged.is_some() {
                    return Err(invalid("only one file per request is supported"));
                }

                let name = field.file_name().map(str::to_string);
                let declared = field
                    .content_type()
                    .filter(|ct| *ct != "application/octet-stream")
                    .map(str::to_string);

                let mut file = state
                    .staging
                    .allocate(name.as_deref().unwrap_or("upload"))
                    .await?;
                // Body streams straight to disk, never buffered whole
                file.fill_from(field, |e| {
                    RelayError::InvalidInput(format!("upload interrupted: {}", e.body_text()))
                })
                .await?;
                if let Some(declared) = declared {
                    file.set_content_type(declared);
                }

                original_name = name;
                staged = Some(file);
            }
            Some("path") => directory = Some(text_field(field).await?),
            Some("fileName") => file_name = Some(text_field(field).await?),
            _ => {}
        }
    }

    let staged = staged.ok_or_else(|| invalid("file is required"))?;
    let directory = required(directory, "path")?;
    let file_name = present(file_name)
        .or_else(|| present(original_name.clone()))
        .ok_or_else(|| invalid("fileName is required when the upload has no file name"))?;

    let result = state
        .relay
        .upload(TransferRequest {
            source: SourceKind::PreStagedUpload(staged),
            directory,
            file_name,
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "File uploaded successfully",
        "details": {
            "remotePath": result.remote_path,
            "size": result.size,
            "contentType": result.content_type,
            "originalName": original_name,
        }
    })))
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| invalid(format!("invalid multipart field: {}", e.body_text())))
}

/// GET /api/download?path=&fileName=
pub async fn download(
    State(state): State<AppState>,
    params: Result<Query<DownloadParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params.map_err(|e| invalid(e.body_text()))?;
    let directory = required(params.path, "path")?;
    let file_name = required(params.file_name, "fileName")?;

    let downloaded = state.relay.download(&directory, &file_name).await?;

    let size = downloaded.staged.size();
    let content_type = downloaded
        .staged
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let disposition = attachment_disposition(&downloaded.file_name);

    // The stream owns the staging file; it is deleted once the body is done
    let stream = downloaded.staged.into_stream().await?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, size.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

fn attachment_disposition(file_name: &str) -> String {
    let escaped: String = file_name
        .chars()
        .map(|c| if c == '"' || !c.is_ascii() { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{escaped}\"")
}

/// GET /api/list?path=
pub async fn list(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(params) = params.map_err(|e| invalid(e.body_text()))?;
    let directory = required(params.path, "path")?;

    let files = state.relay.list(&directory).await?;

    Ok(Json(json!({
        "success": true,
        "path": directory,
        "files": files,
    })))
}
