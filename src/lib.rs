pub mod article;
pub mod config;
pub mod error;
mod filesystem;
mod request_handlers;

pub use error::{UploadError, UploadResult};
pub use filesystem::chunk_store::{
    ChunkOutcome, ChunkRequest, ChunkStore, LocalChunkStore, PayloadSource, BLOCK_SIZE,
};
pub use filesystem::file_name::{FileNameError, StagedName};
pub use filesystem::staging::StagingArea;
pub use request_handlers::upload_handler::UploadParams;
pub use request_handlers::UploadContext;

use axum::{extract::DefaultBodyLimit, routing::post, Extension, Router};
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::UploadConfig;
use request_handlers::upload_handler::{category_upload_handler, upload_handler};

// Response headers for the chunk upload protocol
#[derive(Debug)]
pub enum UploadHeaders {
    /// `accepted` while the set is incomplete, `complete` once reassembled.
    UploadState,
}

impl UploadHeaders {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UploadState => "X-Upload-State",
        }
    }
}

/// Mount the chunk upload routes on `app`.
///
/// `POST /upload` stores under the configured default category,
/// `POST /upload/{category}` under the named one. Request bodies are capped at
/// `max_chunk_bytes`.
pub fn setup_upload_routes(
    app: Router,
    store: Arc<dyn ChunkStore>,
    config: &UploadConfig,
) -> Router {
    let ctx = UploadContext {
        store,
        default_category: config.default_category.clone(),
        encoding: config.file_name_encoding,
    };

    let uploads = Router::new()
        .route("/upload", post(upload_handler))
        .route("/upload/{category}", post(category_upload_handler))
        .layer(Extension(ctx))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_chunk_bytes));

    app.merge(uploads).layer(TraceLayer::new_for_http())
}
