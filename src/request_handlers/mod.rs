pub mod upload_handler;

use std::sync::Arc;

use crate::config::FileNameEncoding;
use crate::filesystem::chunk_store::ChunkStore;

/// Shared by every upload route through an `Extension` layer.
#[derive(Clone)]
pub struct UploadContext {
    pub store: Arc<dyn ChunkStore>,
    /// Category for uploads that do not name one in the path.
    pub default_category: String,
    /// Encoding of the names inside returned paths.
    pub encoding: FileNameEncoding,
}
