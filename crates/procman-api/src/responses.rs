use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use procman_types::JobState;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

pub fn message(status: StatusCode, text: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            message: text.into(),
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct JobStateBody {
    pub job_name: String,
    pub state: JobState,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct JobStateEntry {
    pub job_name: String,
    pub state: JobState,
}

#[derive(Debug, Serialize)]
pub struct JobStatesBody {
    pub jobs: Vec<JobStateEntry>,
    pub time: DateTime<Utc>,
}
