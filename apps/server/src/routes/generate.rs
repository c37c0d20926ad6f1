// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model generation endpoints: submit, poll, fetch.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use terrabim_core::IfcVersion;
use terrabim_tin::Area;
use uuid::Uuid;

use crate::error::ApiError;
use crate::types::{DetailResponse, GenerateModelRequest, TaskCreatedResponse, TaskStateResponse};
use crate::worker::{register, Job, TaskState, TaskStatus};
use crate::AppState;

/// POST /generate-model - validate the request and enqueue a job.
pub async fn generate_model(
    State(state): State<AppState>,
    Json(request): Json<GenerateModelRequest>,
) -> Result<Json<TaskCreatedResponse>, ApiError> {
    let ifc_version: IfcVersion = request
        .ifc_version
        .parse()
        .map_err(ApiError::BadInput)?;

    let project_origin = match &request.project_origin {
        Some(text) => Some(parse_origin(text)?),
        None => None,
    };

    // the polygon must parse, be simple and closed; orientation is
    // normalized later per element
    Area::new(&request.polygon, [0.0, 0.0])
        .map_err(|e| ApiError::BadInput(format!("polygon parameter invalid: {e}")))?;

    tracing::info!(
        ifc_version = %ifc_version,
        name = %request.name,
        origin_supplied = project_origin.is_some(),
        "received generate-model request"
    );

    let task_id = Uuid::new_v4();
    register(&state.registry, task_id).await;
    state
        .queue
        .send(Job {
            task_id,
            ifc_version,
            name: request.name,
            polygon: request.polygon,
            project_origin,
        })
        .await
        .map_err(|_| ApiError::Internal("job queue is closed".into()))?;

    Ok(Json(TaskCreatedResponse { task_id }))
}

fn parse_origin(text: &str) -> Result<[f64; 3], ApiError> {
    let values: Result<Vec<f64>, _> = text.split(',').map(|v| v.trim().parse()).collect();
    match values.as_deref() {
        Ok([x, y, z]) => Ok([*x, *y, *z]),
        _ => Err(ApiError::BadInput(
            "project_origin parameter must be in format float,float,float".into(),
        )),
    }
}

/// GET /generation-state/{task_id} - current task state.
///
/// Unknown ids read as PENDING, matching the queue backend's view of
/// tasks it has not seen yet.
pub async fn generation_state(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Json<TaskStateResponse> {
    let status = state.registry.read().await.get(&task_id).cloned();
    let response = match status {
        Some(TaskStatus { state, error, .. }) => TaskStateResponse { state, error },
        None => TaskStateResponse {
            state: TaskState::Pending,
            error: None,
        },
    };
    Json(response)
}

/// GET /generated-file/{task_id} - the produced IFC file.
pub async fn generated_file(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Response {
    let status = state.registry.read().await.get(&task_id).cloned();

    let status = match status {
        None => {
            return detail(
                StatusCode::ACCEPTED,
                "Model generation state is pending".to_string(),
            )
        }
        Some(status) => status,
    };

    match status.state {
        TaskState::Pending | TaskState::Started | TaskState::Retry => detail(
            StatusCode::ACCEPTED,
            format!(
                "Model generation state is {}",
                format!("{:?}", status.state).to_lowercase()
            ),
        ),
        TaskState::Failure => detail(
            StatusCode::BAD_REQUEST,
            format!(
                "Model generation failed: {}",
                status.error.unwrap_or_default()
            ),
        ),
        TaskState::Success => {
            let Some(path) = status.output else {
                return detail(StatusCode::GONE, "Generated file not found on disk".into());
            };
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let file_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| format!("{task_id}.ifc"));
                    (
                        StatusCode::OK,
                        [
                            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                            (
                                header::CONTENT_DISPOSITION,
                                format!("attachment; filename=\"{file_name}\""),
                            ),
                        ],
                        Body::from(bytes),
                    )
                        .into_response()
                }
                Err(_) => detail(StatusCode::GONE, "Generated file not found on disk".into()),
            }
        }
    }
}

fn detail(status: StatusCode, detail: String) -> Response {
    (status, Json(DetailResponse { detail })).into_response()
}
