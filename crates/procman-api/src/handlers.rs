use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use procman_store::StoreError;
use procman_types::{JobDescriptor, Verb};
use tracing::{error, warn};

use crate::responses::{self, JobStateBody, JobStateEntry, JobStatesBody};
use crate::AppState;

fn not_found(name: &str) -> Response {
    responses::message(StatusCode::NOT_FOUND, format!("Job {name} not found"))
}

pub async fn index() -> &'static str {
    "index!"
}

pub async fn list_jobs(State(state): State<AppState>) -> Response {
    match state.store.list().await {
        Ok(records) => {
            let descriptors: Vec<JobDescriptor> =
                records.iter().map(|record| record.descriptor()).collect();
            Json(descriptors).into_response()
        }
        Err(err) => {
            error!(error = %err, "failed to list jobs");
            responses::message(StatusCode::INTERNAL_SERVER_ERROR, "Unable to list jobs!")
        }
    }
}

pub async fn list_job_states(State(state): State<AppState>) -> Json<JobStatesBody> {
    let jobs = state
        .registry
        .states()
        .await
        .into_iter()
        .map(|(job_name, state)| JobStateEntry { job_name, state })
        .collect();
    Json(JobStatesBody {
        jobs,
        time: Utc::now(),
    })
}

pub async fn get_job(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.store.find_by_name(&name).await {
        Ok(record) => Json(record.descriptor()).into_response(),
        Err(StoreError::NotFound(_)) => not_found(&name),
        Err(err) => {
            error!(job = %name, error = %err, "failed to load job");
            responses::message(StatusCode::INTERNAL_SERVER_ERROR, "Unable to load job!")
        }
    }
}

pub async fn create_job(
    State(state): State<AppState>,
    payload: Result<Json<JobDescriptor>, JsonRejection>,
) -> Response {
    let Ok(Json(descriptor)) = payload else {
        return responses::message(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Unable to parse request body!",
        );
    };

    match state.store.create(&descriptor).await {
        Ok(record) => {
            if let Err(err) = state.arrivals.send(record.descriptor()).await {
                error!(job = %descriptor.name, error = %err, "job ingress unavailable");
                return responses::message(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Job ingress unavailable!",
                );
            }
            StatusCode::CREATED.into_response()
        }
        Err(StoreError::Duplicate(name)) => responses::message(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Job with name {name} already exists!"),
        ),
        Err(err) => {
            error!(job = %descriptor.name, error = %err, "failed to create job");
            responses::message(StatusCode::INTERNAL_SERVER_ERROR, "Unable to create job!")
        }
    }
}

pub async fn replace_job(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<JobDescriptor>, JsonRejection>,
) -> Response {
    match state.store.find_by_name(&name).await {
        Ok(_) => {}
        Err(StoreError::NotFound(_)) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!(job = %name, error = %err, "failed to load job");
            return responses::message(StatusCode::INTERNAL_SERVER_ERROR, "Unable to load job!");
        }
    }

    let Ok(Json(replacement)) = payload else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    if replacement.name != name {
        return responses::message(
            StatusCode::BAD_REQUEST,
            "Job names in url and body don't match!",
        );
    }

    match state.store.update(&name, &replacement).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(err) => {
            error!(job = %name, error = %err, "failed to replace job");
            responses::message(StatusCode::INTERNAL_SERVER_ERROR, "Unable to replace job!")
        }
    }
}

/// Deleting is always reported as a success, even for absent jobs.
pub async fn delete_job(State(state): State<AppState>, Path(name): Path<String>) -> StatusCode {
    if let Err(err) = state.store.delete(&name).await {
        error!(job = %name, error = %err, "failed to delete job");
    }
    StatusCode::OK
}

pub async fn start_job(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    send_verb(&state, &name, Verb::Start).await
}

pub async fn stop_job(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    send_verb(&state, &name, Verb::Stop).await
}

pub async fn restart_job(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    send_verb(&state, &name, Verb::Restart).await
}

async fn send_verb(state: &AppState, name: &str, verb: Verb) -> Response {
    let Some(handle) = state.registry.lookup(name).await else {
        return not_found(name);
    };
    match handle.send(verb).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => {
            // The supervisor went away between lookup and send.
            warn!(job = %name, error = %err, "lifecycle command not delivered");
            not_found(name)
        }
    }
}

pub async fn job_state(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.registry.lookup(&name).await {
        Some(handle) => Json(JobStateBody {
            job_name: name,
            state: handle.state(),
            time: Utc::now(),
        })
        .into_response(),
        None => not_found(&name),
    }
}
