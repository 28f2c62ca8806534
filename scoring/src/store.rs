use async_trait::async_trait;
use common::models::GradeResult;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no grade record with id `{0}`")]
    NotFound(String),
    #[error("grade record backend failed: {0}")]
    Backend(String),
}

/// Append-only store for grade records. `save` generates the record id;
/// there is no update or delete, and `load` never mutates.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save(&self, article_id: &str, result: &GradeResult) -> Result<String, StoreError>;
    async fn load(&self, result_id: &str) -> Result<GradeResult, StoreError>;
}
