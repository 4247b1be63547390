use crate::models::{TrackerResult, Version};
use async_trait::async_trait;

// Where document text comes from: the live content and any recorded version
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn current_content(&self, file_id: &str) -> TrackerResult<String>;

    async fn content_at_version(&self, file_id: &str, version: Version) -> TrackerResult<String>;
}
