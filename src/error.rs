//! Upload error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::path::PathBuf;

/// Errors raised while accepting or reassembling a chunked upload.
///
/// Every variant is terminal for the request that produced it. The client is
/// expected to retry the chunk it was sending.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Failed to create directory {}: {source}", .path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open stream {}: {source}", .path.display())]
    StreamOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move uploaded file: {0}")]
    UploadValidation(String),

    #[error("Failed to lock {}", .0.display())]
    LockAcquisition(PathBuf),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UploadValidation(_) | Self::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            Self::LockAcquisition(_) => StatusCode::CONFLICT,
            Self::DirectoryCreation { .. } | Self::StreamOpen { .. } | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The single-line diagnostic written back to the uploader.
    pub fn wire_line(&self) -> String {
        // the uploader splits on '|', keep the message on one line
        format!("error|{}", self.to_string().replace(['\n', '\r'], " "))
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Upload request failed");
        } else {
            tracing::debug!(error = %self, "Upload request rejected");
        }
        (status, self.wire_line()).into_response()
    }
}

/// Result type for upload operations.
pub type UploadResult<T> = std::result::Result<T, UploadError>;
