use std::sync::{Arc, RwLock};

use procman_types::JobState;

/// Shared view of one supervisor's state. Written by the supervisor and its
/// runner task, read by the REST layer. Never held across an await.
#[derive(Debug, Clone)]
pub struct StateCell(Arc<RwLock<JobState>>);

impl StateCell {
    #[must_use]
    pub fn new(initial: JobState) -> Self {
        Self(Arc::new(RwLock::new(initial)))
    }

    #[must_use]
    pub fn get(&self) -> JobState {
        *self.0.read().unwrap()
    }

    pub fn set(&self, next: JobState) {
        *self.0.write().unwrap() = next;
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(JobState::Stopped)
    }
}
