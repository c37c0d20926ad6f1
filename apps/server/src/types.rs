// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request and response types for the API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::worker::TaskState;

/// Body of a model generation request.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateModelRequest {
    /// The IFC version, `IFC4` or `IFC4x3`.
    pub ifc_version: String,
    /// Name of the model.
    pub name: String,
    /// Closed WKT polygon describing the area of interest.
    pub polygon: String,
    /// Optional origin as comma-separated `x,y,z`.
    #[serde(default)]
    pub project_origin: Option<String>,
}

/// Response to a successfully enqueued generation request.
#[derive(Debug, Serialize)]
pub struct TaskCreatedResponse {
    pub task_id: Uuid,
}

/// Response of the state endpoint.
#[derive(Debug, Serialize)]
pub struct TaskStateResponse {
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Detail body used for non-200 artifact responses.
#[derive(Debug, Serialize)]
pub struct DetailResponse {
    pub detail: String,
}
