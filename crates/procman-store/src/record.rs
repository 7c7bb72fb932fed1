use chrono::{DateTime, Utc};
use procman_types::{JobDescriptor, JobType};

/// Persisted form of a [`JobDescriptor`]: the declared fields plus a durable
/// primary key and audit timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub id: i64,
    pub name: String,
    pub command: String,
    pub job_type: JobType,
    pub schedule: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    #[must_use]
    pub fn descriptor(&self) -> JobDescriptor {
        JobDescriptor {
            name: self.name.clone(),
            command: self.command.clone(),
            job_type: self.job_type,
            schedule: self.schedule.clone(),
        }
    }
}
