use async_trait::async_trait;
use thiserror::Error;

use crate::prompt::GradingPrompt;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("grading backend unreachable: {0}")]
    Unavailable(String),
    #[error("grading backend refused the request: {0}")]
    Refused(String),
    #[error("grading backend returned unusable output: {0}")]
    MalformedOutput(String),
}

/// One operation: produce a structured completion for a grading prompt,
/// returned as raw JSON text. Implementations carry no retry policy;
/// retrying is the caller's decision.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn generate(&self, prompt: &GradingPrompt) -> Result<String, GatewayError>;
}
