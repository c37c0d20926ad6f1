// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Background job execution.
//!
//! Jobs flow through a bounded queue into a fixed pool of workers; each
//! job runs single-threaded and publishes its state transitions into the
//! shared registry. Workers share only the asset cache and the database
//! pool.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use terrabim_core::IfcVersion;
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

use crate::error::GenerationError;
use crate::services::ModelGenerator;

/// Lifecycle states of a generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    Pending,
    Started,
    Success,
    Failure,
    Retry,
}

/// Current status of a task, as reported by the state endpoint.
#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub state: TaskState,
    pub error: Option<String>,
    pub output: Option<PathBuf>,
}

impl TaskStatus {
    fn pending() -> Self {
        Self {
            state: TaskState::Pending,
            error: None,
            output: None,
        }
    }
}

/// Shared task-state registry, keyed by task id.
pub type TaskRegistry = Arc<RwLock<HashMap<Uuid, TaskStatus>>>;

/// One enqueued generation job.
#[derive(Debug, Clone)]
pub struct Job {
    pub task_id: Uuid,
    pub ifc_version: IfcVersion,
    pub name: String,
    pub polygon: String,
    pub project_origin: Option<[f64; 3]>,
}

/// Register a job as pending; the caller enqueues it afterwards.
pub async fn register(registry: &TaskRegistry, task_id: Uuid) {
    registry.write().await.insert(task_id, TaskStatus::pending());
}

async fn set_state(registry: &TaskRegistry, task_id: Uuid, state: TaskState, error: Option<String>, output: Option<PathBuf>) {
    let mut registry = registry.write().await;
    registry.insert(
        task_id,
        TaskStatus {
            state,
            error,
            output,
        },
    );
}

/// Spawn `count` workers draining the job queue.
pub fn spawn_workers(
    count: usize,
    receiver: mpsc::Receiver<Job>,
    registry: TaskRegistry,
    generator: ModelGenerator,
    output_dir: PathBuf,
) {
    let receiver = Arc::new(Mutex::new(receiver));
    for worker in 0..count {
        let receiver = Arc::clone(&receiver);
        let registry = registry.clone();
        let generator = generator.clone();
        let output_dir = output_dir.clone();
        tokio::spawn(async move {
            loop {
                let job = receiver.lock().await.recv().await;
                let Some(job) = job else {
                    tracing::info!(worker, "job queue closed, worker exits");
                    break;
                };
                run_job(job, &registry, &generator, &output_dir).await;
            }
        });
    }
}

async fn run_job(
    job: Job,
    registry: &TaskRegistry,
    generator: &ModelGenerator,
    output_dir: &PathBuf,
) {
    let task_id = job.task_id;
    tracing::info!(%task_id, "starting model generation");
    set_state(registry, task_id, TaskState::Started, None, None).await;

    match execute(job, generator, output_dir).await {
        Ok(output) => {
            tracing::info!(%task_id, output = %output.display(), "model generation completed");
            set_state(registry, task_id, TaskState::Success, None, Some(output)).await;
        }
        Err(e) => {
            tracing::error!(%task_id, error = %e, "model generation failed");
            set_state(registry, task_id, TaskState::Failure, Some(e.to_string()), None).await;
        }
    }
}

async fn execute(
    job: Job,
    generator: &ModelGenerator,
    output_dir: &PathBuf,
) -> Result<PathBuf, GenerationError> {
    let model = generator
        .generate(job.ifc_version, &job.name, &job.polygon, job.project_origin)
        .await?;
    let file = generator.build_ifc(&model)?;

    let output = output_dir.join(format!("{}.ifc", job.task_id));
    let step_text = file.to_step_string();
    tokio::fs::write(&output, step_text.as_bytes()).await?;
    Ok(output)
}
