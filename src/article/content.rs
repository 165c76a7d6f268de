use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Stores rendered article bodies apart from the relational record.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn save_article_content(&self, content_id: u64, content: &str)
        -> Result<(), ContentStoreError>;

    /// Remove a stored body. Removing a missing body is not an error.
    async fn delete_article_content(&self, content_id: u64) -> Result<(), ContentStoreError>;
}

#[derive(Debug, thiserror::Error)]
#[error("content store error: {0}")]
pub struct ContentStoreError(pub String);

#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    bodies: RwLock<HashMap<u64, String>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Default::default()
    }

    pub async fn get(&self, content_id: u64) -> Option<String> {
        self.bodies.read().await.get(&content_id).cloned()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn save_article_content(
        &self,
        content_id: u64,
        content: &str,
    ) -> Result<(), ContentStoreError> {
        // saving again replaces the body, as an update does
        self.bodies
            .write()
            .await
            .insert(content_id, content.to_string());
        Ok(())
    }

    async fn delete_article_content(&self, content_id: u64) -> Result<(), ContentStoreError> {
        self.bodies.write().await.remove(&content_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delete_removes_only_that_body() {
        let store = InMemoryContentStore::new();
        store.save_article_content(1, "first").await.unwrap();
        store.save_article_content(2, "second").await.unwrap();

        store.delete_article_content(1).await.unwrap();
        store.delete_article_content(1).await.unwrap();

        assert_eq!(store.get(1).await, None);
        assert_eq!(store.get(2).await.as_deref(), Some("second"));
    }
}
