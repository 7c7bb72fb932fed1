use async_trait::async_trait;
use procman_types::JobDescriptor;

mod record;
mod sqlite;

pub use record::JobRecord;
pub use sqlite::SqliteJobStore;

/// Error type for the job catalogue.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job `{0}` not found")]
    NotFound(String),

    #[error("job `{0}` already exists")]
    Duplicate(String),

    #[error("corrupt job record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T, E = StoreError> = std::result::Result<T, E>;

/// CRUD over persisted job descriptors. The store enforces uniqueness of
/// `name`; it does not notify supervisors of external changes (they re-read
/// on each Start).
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn list(&self) -> StoreResult<Vec<JobRecord>>;

    async fn find_by_name(&self, name: &str) -> StoreResult<JobRecord>;

    async fn create(&self, descriptor: &JobDescriptor) -> StoreResult<JobRecord>;

    /// Replaces every field except `name` and bumps `updated_at`.
    async fn update(&self, name: &str, descriptor: &JobDescriptor) -> StoreResult<JobRecord>;

    /// Deleting an absent job is a no-op.
    async fn delete(&self, name: &str) -> StoreResult<()>;
}
