//! Media job handler trait.

use async_trait::async_trait;

use chatvault_core::MediaJob;

/// Result of media job execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    /// Job completed, with the stored object's locator if one was written.
    Success(Option<String>),
    /// Job failed with an error message. The job is dropped.
    Failed(String),
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success(_))
    }
}

/// Trait for media job handlers.
#[async_trait]
pub trait MediaJobHandler: Send + Sync {
    /// Execute the job.
    async fn execute(&self, job: MediaJob) -> JobResult;
}
