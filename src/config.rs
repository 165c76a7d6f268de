//! Service configuration.

use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration, loaded from TOML and `CMS_` environment variables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub article: ArticleConfig,
}

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// The byte encoding uploaded filenames are re-encoded into before they touch disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileNameEncoding {
    /// GBK, a superset of GB2312. Matches the names the legacy admin wrote.
    #[default]
    Gbk,
    Utf8,
}

impl FileNameEncoding {
    /// Charset label for text carrying names in this encoding.
    pub fn charset(&self) -> &'static str {
        match self {
            Self::Gbk => "gbk",
            Self::Utf8 => "utf-8",
        }
    }
}

/// Chunked upload configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Root directory for both staging and assembled files.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Staging subdirectory under `root` holding in-flight fragments.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
    /// Category used by the `/upload` route.
    #[serde(default = "default_category")]
    pub default_category: String,
    /// Fragments untouched for longer than this are removed by the sweep.
    /// Required and non-zero: there is no safe default.
    pub max_fragment_age_secs: NonZeroU64,
    /// Request body limit for a single chunk.
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
    #[serde(default)]
    pub file_name_encoding: FileNameEncoding,
}

/// Article post-save configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArticleConfig {
    /// Queue receiving ids of articles whose bodies reference external images.
    #[serde(default = "default_image_queue")]
    pub image_queue: String,
}

impl Default for ArticleConfig {
    fn default() -> Self {
        Self {
            image_queue: default_image_queue(),
        }
    }
}

impl UploadConfig {
    /// Build a config rooted at `root` with every optional field defaulted.
    ///
    /// A sub-second `max_fragment_age` is raised to one second.
    pub fn new(root: impl Into<PathBuf>, max_fragment_age: Duration) -> Self {
        Self {
            root: root.into(),
            staging_dir: default_staging_dir(),
            default_category: default_category(),
            max_fragment_age_secs: NonZeroU64::new(max_fragment_age.as_secs())
                .unwrap_or(NonZeroU64::MIN),
            max_chunk_bytes: default_max_chunk_bytes(),
            file_name_encoding: FileNameEncoding::default(),
        }
    }

    pub fn staging_path(&self) -> PathBuf {
        self.root.join(&self.staging_dir)
    }

    pub fn max_fragment_age(&self) -> Duration {
        Duration::from_secs(self.max_fragment_age_secs.get())
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_root() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_staging_dir() -> String {
    "upload_tmp".to_string()
}

fn default_category() -> String {
    "wangEditor".to_string()
}

fn default_max_chunk_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_image_queue() -> String {
    "handle_article_image".to_string()
}
