use axum::{
    extract::{multipart::Field, Extension, FromRequest, Multipart, Path, Query, Request},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use serde::Deserialize;
use std::io;
use tokio_util::io::StreamReader;

use super::UploadContext;
use crate::error::{UploadError, UploadResult};
use crate::filesystem::chunk_store::{ChunkOutcome, ChunkRequest, PayloadSource};
use crate::UploadHeaders;

/// The multipart field carrying the chunk bytes.
const FILE_FIELD: &str = "file";

/// Uploader parameters, from the query string or multipart text fields.
///
/// Numbers stay strings until [`UploadParams::chunk_index`] /
/// [`UploadParams::chunk_count`] so that junk falls back to the defaults
/// instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    pub name: Option<String>,
    pub chunk: Option<String>,
    pub chunks: Option<String>,
}

impl UploadParams {
    pub fn chunk_index(&self) -> u32 {
        parse_or(self.chunk.as_deref(), 0)
    }

    pub fn chunk_count(&self) -> u32 {
        parse_or(self.chunks.as_deref(), 1)
    }
}

fn parse_or(value: Option<&str>, default: u32) -> u32 {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub struct UploadRequest {
    params: UploadParams,
    payload: PayloadSource,
}

impl UploadRequest {
    pub fn into_chunk_request(self, category: String) -> ChunkRequest {
        ChunkRequest {
            chunk: self.params.chunk_index(),
            chunks: self.params.chunk_count(),
            name: self.params.name,
            category,
            payload: self.payload,
        }
    }
}

/// `POST /upload`: store under the default category.
pub async fn upload_handler(
    Extension(ctx): Extension<UploadContext>,
    req: UploadRequest,
) -> UploadResult<Response> {
    let category = ctx.default_category.clone();
    accept(ctx, req.into_chunk_request(category)).await
}

/// `POST /upload/{category}`.
pub async fn category_upload_handler(
    Path(category): Path<String>,
    Extension(ctx): Extension<UploadContext>,
    req: UploadRequest,
) -> UploadResult<Response> {
    accept(ctx, req.into_chunk_request(category)).await
}

async fn accept(ctx: UploadContext, request: ChunkRequest) -> UploadResult<Response> {
    let outcome = ctx.store.accept_chunk(request).await?;

    let state = match &outcome {
        ChunkOutcome::ChunkAccepted { .. } => "accepted",
        ChunkOutcome::UploadComplete { .. } => "complete",
    };

    // the path goes out as the on-disk bytes, which are not UTF-8 under GBK
    let body = outcome.public_path().as_os_str().as_encoded_bytes().to_vec();

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            format!("text/plain; charset={}", ctx.encoding.charset()),
        )],
        [(UploadHeaders::UploadState.name(), state)],
        body,
    )
        .into_response())
}

impl<S> FromRequest<S> for UploadRequest
where
    S: Send + Sync,
{
    type Rejection = UploadError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Query(mut params) = Query::<UploadParams>::try_from_uri(req.uri())
            .map_err(|e| UploadError::InvalidParameter(e.body_text()))?;

        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if !is_multipart {
            let body = req.into_body().into_data_stream().map_err(io::Error::other);
            return Ok(Self {
                params,
                payload: PayloadSource::raw(StreamReader::new(body)),
            });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| UploadError::UploadValidation(e.body_text()))?;

        let mut file = None;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| UploadError::UploadValidation(e.body_text()))?
        {
            let field_name = field.name().map(str::to_string);
            match field_name.as_deref() {
                Some(FILE_FIELD) => {
                    let file_name = field.file_name().map(str::to_string);
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| UploadError::UploadValidation(e.body_text()))?;
                    file = Some(PayloadSource::Multipart { file_name, data });
                }
                Some("name") => params.name = Some(field_text(field).await?),
                Some("chunk") => params.chunk = Some(field_text(field).await?),
                Some("chunks") => params.chunks = Some(field_text(field).await?),
                _ => {}
            }
        }

        let payload = file.ok_or_else(|| {
            UploadError::UploadValidation(format!("missing multipart field '{FILE_FIELD}'"))
        })?;

        Ok(Self { params, payload })
    }
}

async fn field_text(field: Field<'_>) -> UploadResult<String> {
    field
        .text()
        .await
        .map_err(|e| UploadError::UploadValidation(e.body_text()))
}
