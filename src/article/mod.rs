//! Article save side effects.
//!
//! Persisting the article row itself belongs to the admin application. Once a
//! row has an id, [`ArticlePostSave`] stores the rendered body through the
//! content service and, for articles imported from an external share, queues
//! the id so a worker can replace externally hosted images.

pub mod content;
pub mod jobs;

use std::sync::Arc;

use crate::config::ArticleConfig;
use content::{ContentStore, ContentStoreError};
use jobs::{JobQueue, JobQueueError};

/// Summary length, in characters, when one is derived from the body.
pub const SUMMARY_CHARS: usize = 200;

/// Article fields as submitted by the edit form.
#[derive(Debug, Clone, Default)]
pub struct ArticleForm {
    pub content: String,
    pub summary: Option<String>,
    pub sort: Option<String>,
    pub hits: Option<String>,
    pub share_id: Option<String>,
}

/// A saved article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub id: u64,
    pub content: String,
    pub summary: String,
    pub sort: i64,
    pub hits: i64,
    pub share_id: Option<String>,
}

impl ArticleForm {
    /// Fill the defaults the form leaves open: non-numeric `sort` and `hits`
    /// become 0, a blank summary is derived from the body.
    pub fn into_article(self, id: u64) -> Article {
        let summary = match self.summary {
            Some(summary) if !summary.trim().is_empty() => summary,
            _ => truncate_chars(&strip_tags(&self.content), SUMMARY_CHARS),
        };

        Article {
            id,
            summary,
            sort: numeric_or_zero(self.sort.as_deref()),
            hits: numeric_or_zero(self.hits.as_deref()),
            share_id: self.share_id.filter(|id| !id.trim().is_empty()),
            content: self.content,
        }
    }
}

fn numeric_or_zero(value: Option<&str>) -> i64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// Drop everything between `<` and `>`.
pub fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text
}

/// Cut to `max` characters, appending `...` when anything was cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", text[..end].trim_end()),
        None => text.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PostSaveError {
    #[error(transparent)]
    Content(#[from] ContentStoreError),

    #[error(transparent)]
    Queue(#[from] JobQueueError),
}

/// Side effects run after an article row is written.
pub struct ArticlePostSave {
    content: Arc<dyn ContentStore>,
    queue: Arc<dyn JobQueue>,
    image_queue: String,
}

impl ArticlePostSave {
    pub fn new(
        content: Arc<dyn ContentStore>,
        queue: Arc<dyn JobQueue>,
        image_queue: impl Into<String>,
    ) -> Self {
        Self {
            content,
            queue,
            image_queue: image_queue.into(),
        }
    }

    pub fn from_config(
        config: &ArticleConfig,
        content: Arc<dyn ContentStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self::new(content, queue, config.image_queue.clone())
    }

    /// Save the body, then queue image migration for shared articles.
    ///
    /// Returns whether a job was queued.
    #[tracing::instrument(skip(self, article), fields(article_id = article.id))]
    pub async fn run(&self, article: &Article) -> Result<bool, PostSaveError> {
        self.content
            .save_article_content(article.id, &article.content)
            .await?;

        if article.share_id.is_none() {
            return Ok(false);
        }

        if let Err(e) = self
            .queue
            .enqueue(&self.image_queue, &article.id.to_string())
            .await
        {
            tracing::error!(error = %e, queue = %self.image_queue, "Failed to queue image migration");
            return Err(e.into());
        }
        tracing::info!(queue = %self.image_queue, "Queued image migration");
        Ok(true)
    }

    /// Drop the stored body once the article row is deleted.
    #[tracing::instrument(skip(self))]
    pub async fn after_delete(&self, article_id: u64) -> Result<(), PostSaveError> {
        self.content.delete_article_content(article_id).await?;
        tracing::info!("Deleted article content");
        Ok(())
    }
}
