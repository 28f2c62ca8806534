use std::sync::Arc;

use async_trait::async_trait;
use common::models::GradeResult;
use scoring::store::{ResultStore, StoreError};

use crate::content::{ContentClient, ContentError};

/// Grade records live in the content store's `answers` collection, which
/// only ever grows: records are created and read, never changed.
pub struct CmsResultStore {
    content: Arc<ContentClient>,
}

impl CmsResultStore {
    pub fn new(content: Arc<ContentClient>) -> Self {
        CmsResultStore { content }
    }
}

#[async_trait]
impl ResultStore for CmsResultStore {
    async fn save(&self, article_id: &str, result: &GradeResult) -> Result<String, StoreError> {
        self.content
            .create_grade_record(article_id, result)
            .await
            .map_err(store_error)
    }

    async fn load(&self, result_id: &str) -> Result<GradeResult, StoreError> {
        self.content
            .get_grade_record(result_id)
            .await
            .map_err(store_error)
    }
}

fn store_error(err: ContentError) -> StoreError {
    match err {
        ContentError::NotFound(what) => StoreError::NotFound(what),
        ContentError::Request(e) => StoreError::Backend(e.to_string()),
    }
}
