// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Entry points that drive a persisted task through one operation: load its
//! state file (or start a new task), run the operation, save, disconnect.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app::errors::{AppError, AppResult};
use crate::app::ports::SessionFactory;
use crate::app::services::credentials::Credentials;
use crate::app::services::host_config::{HostConfig, ResourceRequest};
use crate::app::services::persistence::{Format, StateFile};
use crate::app::services::queue::QueueBackend;
use crate::app::services::sync_plan::SyncPolicy;
use crate::app::task::{
    OutputRequest, PollOptions, ScriptRequest, SubmitOptions, Task, TaskLogs,
};
use crate::app::types::{CommandOutput, RemoteCommand, TaskStatus, TransferOp, TransferOutcome};

#[derive(Clone)]
pub struct UseCases {
    pub(crate) backend: Arc<dyn QueueBackend>,
    pub(crate) sessions: Arc<dyn SessionFactory>,
    pub(crate) credentials: Credentials,
    pub(crate) host_config: Option<HostConfig>,
    pub(crate) state_format: Format,
}

impl UseCases {
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        sessions: Arc<dyn SessionFactory>,
        credentials: Credentials,
        host_config: Option<HostConfig>,
        state_format: Format,
    ) -> Self {
        Self {
            backend,
            sessions,
            credentials,
            host_config,
            state_format,
        }
    }

    /// Restores the task stored at `path`, or starts a fresh one when the
    /// file does not exist yet.
    pub fn open_task(&self, path: &Path) -> AppResult<(Task, StateFile)> {
        let file = StateFile::new(path, self.state_format);
        let mut task = if file.exists() {
            let task = Task::restore(&file, self.backend.clone(), self.sessions.clone())?;
            tracing::info!("task data loaded from {}", path.display());
            task
        } else {
            tracing::info!("no task data at {}; starting a new task", path.display());
            Task::new(self.backend.clone(), self.sessions.clone())
        };
        task.set_credentials(self.credentials.clone());
        if let Some(host_config) = &self.host_config {
            task.set_host_config(host_config.clone());
        }
        Ok((task, file))
    }

    /// Saves whatever changed, even when the operation failed, then
    /// releases the connection.
    async fn finish<T>(&self, task: &mut Task, file: &StateFile, result: AppResult<T>) -> AppResult<T> {
        let saved = task.save(file);
        task.close_session().await;
        let value = result?;
        if saved? {
            tracing::info!("task data saved to {}", file.path.display());
        }
        Ok(value)
    }

    pub async fn submit_job(&self, input: SubmitJobInput) -> AppResult<String> {
        let (mut task, file) = self.open_task(&input.task_file)?;
        let result = async {
            task.ensure_unsubmitted()?;
            if !task.input_data_loaded() {
                task.set_local_data_bundle(&input.local_data)?;
                task.send_input_data(Some(&input.remote_base), input.policy)
                    .await?;
            }
            let mut script = input.script;
            if let Some(resources) = &input.resources {
                let host = self.host_config.as_ref().ok_or_else(|| {
                    AppError::configuration("resource requests need a host configuration")
                })?;
                // Explicit directive overrides win over derived ones.
                let mut derived = host.settings_for(resources)?;
                derived.merge(&script.overrides);
                script.overrides = derived;
            }
            task.prepare_queue_script(script)?;
            task.submit(SubmitOptions {
                save_to: Some(file.clone()),
                poll: input.poll,
            })
            .await
        }
        .await;
        self.finish(&mut task, &file, result).await
    }

    pub async fn job_status(&self, input: JobStatusInput) -> AppResult<TaskStatus> {
        let (mut task, file) = self.open_task(&input.task_file)?;
        let result = match &input.poll {
            Some(poll) => task.check_job(poll, Some(&file)).await,
            None => task.check_job_status().await,
        };
        self.finish(&mut task, &file, result).await
    }

    pub async fn cancel_job(&self, input: CancelJobInput) -> AppResult<bool> {
        let (mut task, file) = self.open_task(&input.task_file)?;
        let result = task.cancel(input.remove_data).await;
        self.finish(&mut task, &file, result).await
    }

    pub async fn job_logs(&self, task_file: &Path) -> AppResult<TaskLogs> {
        let (mut task, file) = self.open_task(task_file)?;
        let result = task.get_logs().await;
        self.finish(&mut task, &file, result).await
    }

    pub async fn retrieve_data(&self, input: RetrieveDataInput) -> AppResult<usize> {
        let (mut task, file) = self.open_task(&input.task_file)?;
        let result = task
            .get_output_data(OutputRequest {
                local_path: input.output,
                files: input.files,
                policy: input.policy,
            })
            .await;
        self.finish(&mut task, &file, result).await
    }

    pub async fn put_data(&self, input: PutDataInput) -> AppResult<usize> {
        let (mut task, file) = self.open_task(&input.task_file)?;
        let result = async {
            if let Some(dir) = &input.local_data {
                task.set_local_data_bundle(dir)?;
            }
            task.send_input_data(input.remote_base.as_deref(), input.policy)
                .await
        }
        .await;
        self.finish(&mut task, &file, result).await
    }

    pub async fn cleanup(&self, task_file: &Path) -> AppResult<()> {
        let (mut task, file) = self.open_task(task_file)?;
        let result = task.clean_remote().await;
        self.finish(&mut task, &file, result).await
    }

    /// Lists the user's jobs without touching any task state.
    pub async fn queue(&self) -> AppResult<String> {
        let mut task = Task::new(self.backend.clone(), self.sessions.clone());
        task.set_credentials(self.credentials.clone());
        if let Some(host_config) = &self.host_config {
            task.set_host_config(host_config.clone());
        }
        let result = task.check_queue().await;
        task.close_session().await;
        result
    }

    pub async fn exec(&self, command: RemoteCommand) -> AppResult<CommandOutput> {
        let mut session = self.sessions.build(self.credentials.clone());
        let result = session.run_command(command).await;
        session.close().await;
        result
    }

    pub async fn transfer(&self, op: TransferOp, source: &str, dest: &str) -> AppResult<TransferOutcome> {
        let mut session = self.sessions.build(self.credentials.clone());
        let result = session.transfer(op, source, dest, true).await;
        session.close().await;
        result
    }
}

#[derive(Debug, Clone)]
pub struct SubmitJobInput {
    pub task_file: PathBuf,
    pub local_data: PathBuf,
    pub remote_base: String,
    pub script: ScriptRequest,
    pub resources: Option<ResourceRequest>,
    pub policy: SyncPolicy,
    pub poll: Option<PollOptions>,
}

#[derive(Debug, Clone)]
pub struct JobStatusInput {
    pub task_file: PathBuf,
    pub poll: Option<PollOptions>,
}

#[derive(Debug, Clone)]
pub struct CancelJobInput {
    pub task_file: PathBuf,
    pub remove_data: bool,
}

#[derive(Debug, Clone)]
pub struct RetrieveDataInput {
    pub task_file: PathBuf,
    pub output: Option<PathBuf>,
    pub files: Option<Vec<String>>,
    pub policy: SyncPolicy,
}

#[derive(Debug, Clone)]
pub struct PutDataInput {
    pub task_file: PathBuf,
    pub local_data: Option<PathBuf>,
    pub remote_base: Option<String>,
    pub policy: SyncPolicy,
}
