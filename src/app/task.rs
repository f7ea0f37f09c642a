// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! The task aggregate: one remote batch job from data staging through
//! submission, polling and retrieval, with resumable persisted state.
//!
//! Status moves `UNKNOWN -> SUBMITTED -> RUNNING -> CLOSING -> FINISHED`;
//! `CANCELLED` is reachable from `SUBMITTED` and `RUNNING`. The remote
//! working directory is always `<remote_base_path>/task_<id>`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{RemoteSessionPort, SessionFactory};
use crate::app::services::credentials::Credentials;
use crate::app::services::data_bundle::DataBundle;
use crate::app::services::host_config::HostConfig;
use crate::app::services::persistence::{StateFile, TaskSnapshot};
use crate::app::services::queue::QueueBackend;
use crate::app::services::script::{ScriptSource, join_remote, render_script, sh_escape};
use crate::app::services::sync_plan::{SyncPolicy, plan_transfers};
use crate::app::types::{CommandOutput, QueueSettings, RemoteCommand, TaskStatus};


pub const SCRIPT_FILE_NAME: &str = "run_script.sh";
pub const DEFAULT_STDOUT: &str = "job.out";
pub const DEFAULT_STDERR: &str = "job.err";
const LOCAL_BUNDLE_ID: &str = "local";
const OUTPUT_BUNDLE_ID: &str = "output";

/// Inputs for rendering the queue script.
#[derive(Debug, Clone)]
pub struct ScriptRequest {
    /// Preset name in the host configuration; `None` picks the default.
    pub preset: Option<String>,
    /// Values laid over the preset.
    pub overrides: QueueSettings,
    pub job_name: Option<String>,
    pub debug: bool,
    pub module_sets: Vec<String>,
    /// Conda environment activated before the payload.
    pub environment: Option<String>,
    pub source: ScriptSource,
}

impl ScriptRequest {
    pub fn new(source: ScriptSource) -> Self {
        Self {
            preset: None,
            overrides: QueueSettings::new(),
            job_name: None,
            debug: false,
            module_sets: Vec::new(),
            environment: None,
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    /// Gives up after this long.
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl PollOptions {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Persist right after the job id is known, and on every poll.
    pub save_to: Option<StateFile>,
    pub poll: Option<PollOptions>,
}

#[derive(Debug, Clone, Default)]
pub struct OutputRequest {
    pub local_path: Option<PathBuf>,
    /// Restricts retrieval to these names.
    pub files: Option<Vec<String>>,
    pub policy: SyncPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLogs {
    pub stdout: String,
    pub stderr: String,
}

pub struct Task {
    id: Uuid,
    status: TaskStatus,
    remote_job_id: Option<String>,
    remote_base_path: Option<String>,
    local_data: Option<DataBundle>,
    output_data: Option<DataBundle>,
    queue_settings: QueueSettings,
    modules: Vec<String>,
    job_name: Option<String>,
    input_data_loaded: bool,
    local_data_path: Option<PathBuf>,
    output_data_path: Option<PathBuf>,
    script: Option<String>,
    dirty: bool,
    credentials: Option<Credentials>,
    host_config: Option<HostConfig>,
    backend: Arc<dyn QueueBackend>,
    sessions: Arc<dyn SessionFactory>,
    session: Option<Box<dyn RemoteSessionPort>>,
}

impl Task {
    pub fn new(backend: Arc<dyn QueueBackend>, sessions: Arc<dyn SessionFactory>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: TaskStatus::Unknown,
            remote_job_id: None,
            remote_base_path: None,
            local_data: None,
            output_data: None,
            queue_settings: QueueSettings::new(),
            modules: Vec::new(),
            job_name: None,
            input_data_loaded: false,
            local_data_path: None,
            output_data_path: None,
            script: None,
            dirty: false,
            credentials: None,
            host_config: None,
            backend,
            sessions,
            session: None,
        }
    }

    /// Rebuilds a task from persisted state; it keeps the saved identity.
    pub fn restore(
        file: &StateFile,
        backend: Arc<dyn QueueBackend>,
        sessions: Arc<dyn SessionFactory>,
    ) -> AppResult<Self> {
        let mut task = Self::new(backend, sessions);
        task.load_data_from_file(file)?;
        Ok(task)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn remote_job_id(&self) -> Option<&str> {
        self.remote_job_id.as_deref()
    }

    pub fn remote_base_path(&self) -> Option<&str> {
        self.remote_base_path.as_deref()
    }

    pub fn queue_settings(&self) -> &QueueSettings {
        &self.queue_settings
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    pub fn job_name(&self) -> Option<&str> {
        self.job_name.as_deref()
    }

    pub fn local_data(&self) -> Option<&DataBundle> {
        self.local_data.as_ref()
    }

    pub fn output_data(&self) -> Option<&DataBundle> {
        self.output_data.as_ref()
    }

    pub fn output_data_path(&self) -> Option<&PathBuf> {
        self.output_data_path.as_ref()
    }

    pub fn input_data_loaded(&self) -> bool {
        self.input_data_loaded
    }

    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Binds the identity used for every later remote operation. A session
    /// opened with earlier credentials is dropped.
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.session = None;
        self.credentials = Some(credentials);
    }

    pub fn set_host_config(&mut self, host_config: HostConfig) {
        self.host_config = Some(host_config);
    }

    pub fn set_remote_base_path(&mut self, path: impl Into<String>) {
        let path = path.into();
        if self.remote_base_path.as_deref() != Some(path.as_str()) {
            self.remote_base_path = Some(path);
            self.dirty = true;
        }
    }

    pub fn set_queue_settings(&mut self, settings: QueueSettings) {
        self.queue_settings = settings;
        self.dirty = true;
    }

    /// `<remote_base_path>/task_<id>`.
    pub fn remote_working_dir(&self) -> AppResult<String> {
        let base = self.remote_base_path.as_deref().ok_or_else(|| {
            AppError::state(format!("task {} has no remote base path", self.id))
        })?;
        Ok(join_remote(base, &format!("task_{}", self.id)))
    }

    /// Stages the regular files of a local directory as input data.
    pub fn set_local_data_bundle(&mut self, dir: impl Into<PathBuf>) -> AppResult<()> {
        let dir = dir.into();
        let mut bundle = DataBundle::new(LOCAL_BUNDLE_ID);
        bundle.add_directory(&dir)?;
        tracing::info!(
            "staged {} local file(s) from {}",
            bundle.len(),
            dir.display()
        );
        self.local_data = Some(bundle);
        self.local_data_path = Some(dir);
        self.dirty = true;
        Ok(())
    }

    /// Resolves named module sets from the host configuration, in order.
    pub fn set_modules<S: AsRef<str>>(&mut self, set_names: &[S]) -> AppResult<()> {
        let host = self.host_config()?;
        let mut modules = Vec::new();
        for name in set_names {
            modules.extend(host.module_set(name.as_ref())?.iter().cloned());
        }
        self.modules = modules;
        self.dirty = true;
        Ok(())
    }

    fn host_config(&self) -> AppResult<&HostConfig> {
        self.host_config
            .as_ref()
            .ok_or_else(|| AppError::configuration("no host configuration loaded"))
    }

    /// The task's session, opened on first use.
    pub fn ensure_session(&mut self) -> AppResult<&mut dyn RemoteSessionPort> {
        if self.session.is_none() {
            let credentials = self.credentials.clone().ok_or_else(|| {
                AppError::state(format!("task {} has no credentials bound", self.id))
            })?;
            self.session = Some(self.sessions.build(credentials));
        }
        match self.session.as_deref_mut() {
            Some(session) => Ok(session),
            None => Err(AppError::state("session unavailable")),
        }
    }

    pub async fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
    }

    async fn ensure_remote_dir(&mut self, dir: &str) -> AppResult<()> {
        let session = self.ensure_session()?;
        let out = session
            .run_command(RemoteCommand::from(format!("mkdir -p {}", sh_escape(dir))))
            .await?;
        require_clean_stderr(&out, "failed to create remote directory")
            .map_err(|err| err.with_context(dir.to_string()))
    }

    /// Uploads staged input files that the remote working directory lacks
    /// or holds in an older version, per `policy`. Returns how many files
    /// were sent.
    pub async fn send_input_data(
        &mut self,
        remote_base_path: Option<&str>,
        policy: SyncPolicy,
    ) -> AppResult<usize> {
        if let Some(base) = remote_base_path {
            self.set_remote_base_path(base);
        }
        let bundle = self.local_data.as_mut().ok_or_else(|| {
            AppError::state("no local data staged; set a local data bundle first")
        })?;
        bundle.refresh_local_stats();
        let local: Vec<(String, PathBuf, Option<u64>)> = bundle
            .iter()
            .map(|(name, entry)| (name.to_string(), entry.path.clone(), entry.mtime))
            .collect();
        let workdir = self.remote_working_dir()?;

        self.ensure_remote_dir(&workdir).await?;
        let session = self.ensure_session()?;
        let remote: BTreeMap<String, Option<u64>> = session
            .stat_dir(&workdir)
            .await?
            .into_iter()
            .map(|(name, stat)| (name, stat.mtime))
            .collect();
        let selected = plan_transfers(
            local.iter().map(|(name, _, mtime)| (name.as_str(), *mtime)),
            &remote,
            policy,
        );
        tracing::info!(
            "uploading {} of {} file(s) to {workdir}",
            selected.len(),
            local.len()
        );
        for (name, path, _) in local.iter().filter(|(name, _, _)| selected.contains(name)) {
            let target = join_remote(&workdir, name);
            tracing::debug!("put {} -> {target}", path.display());
            session
                .put(path, &target)
                .await
                .map_err(|err| err.with_context(format!("uploading {}", path.display())))?;
        }

        self.input_data_loaded = true;
        self.dirty = true;
        Ok(selected.len())
    }

    /// Renders the queue script and keeps it for `submit`. The effective
    /// queue settings (with job name, log files and working directory
    /// injected) replace the task's settings.
    pub fn prepare_queue_script(&mut self, request: ScriptRequest) -> AppResult<String> {
        self.ensure_unsubmitted()?;
        let workdir = self.remote_working_dir()?;
        let host = self.host_config()?;
        let mut settings = host.preset(request.preset.as_deref())?.clone();
        settings.merge(&request.overrides);
        if request.debug {
            let overlay = host.debug_overlay().ok_or_else(|| {
                AppError::configuration("host configuration has no debug queue preset")
            })?;
            settings.merge(overlay);
        }

        let job_name = request
            .job_name
            .or_else(|| self.job_name.clone())
            .unwrap_or_else(|| format!("task_{}", self.id));
        settings.set("job", job_name.clone());
        if !settings.contains("stdout") {
            let stdout = self.queue_settings.get("stdout").unwrap_or(DEFAULT_STDOUT);
            settings.set("stdout", stdout.to_string());
        }
        if !settings.contains("stderr") {
            let stderr = self.queue_settings.get("stderr").unwrap_or(DEFAULT_STDERR);
            settings.set("stderr", stderr.to_string());
        }
        settings.set("working_dir", workdir);

        if !request.module_sets.is_empty() {
            self.set_modules(&request.module_sets)?;
        }
        let payload = request.source.load()?;
        let directives = self.backend.render_directives(&settings);
        let script = render_script(
            &directives,
            &self.modules,
            request.environment.as_deref(),
            &payload,
        );
        tracing::debug!("rendered queue script for {job_name}:\n{script}");

        self.queue_settings = settings;
        self.job_name = Some(job_name);
        self.script = Some(script.clone());
        self.dirty = true;
        Ok(script)
    }

    /// Uploads the rendered script, submits it and records the job id.
    pub async fn submit(&mut self, options: SubmitOptions) -> AppResult<String> {
        self.ensure_unsubmitted()?;
        let script = self.script.clone().ok_or_else(|| {
            AppError::state("no queue script prepared; render one before submitting")
        })?;
        let host = self
            .credentials
            .as_ref()
            .map(|creds| creds.host().to_string())
            .ok_or_else(|| AppError::state(format!("task {} has no credentials bound", self.id)))?;
        self.host_config()?.ensure_login_host(&host)?;
        let workdir = self.remote_working_dir()?;
        let script_path = join_remote(&workdir, SCRIPT_FILE_NAME);
        let submit_command = self.backend.submit_command_for(&script_path);

        self.ensure_remote_dir(&workdir).await?;
        let session = self.ensure_session()?;
        session
            .create(&script_path, &script)
            .await
            .map_err(|err| err.with_context(format!("uploading {script_path}")))?;
        let out = session.run_command(RemoteCommand::from(submit_command)).await?;
        if !out.stderr.trim().is_empty() {
            return Err(AppError::remote(format!(
                "job submission failed: {}",
                out.stderr.trim_end()
            )));
        }
        let job_id = self.backend.parse_submitted_job_id(&out.stdout)?;
        tracing::info!(
            "submitted task {} to {} as job {job_id}",
            self.id,
            self.backend.name()
        );
        self.remote_job_id = Some(job_id.clone());
        self.status = TaskStatus::Submitted;
        self.dirty = true;

        if let Some(file) = &options.save_to {
            self.save(file)?;
        }
        if let Some(poll) = &options.poll {
            self.check_job(poll, options.save_to.as_ref()).await?;
        }
        Ok(job_id)
    }

    /// Queries the scheduler once and updates the status. Cancelled tasks
    /// are left alone.
    pub async fn check_job_status(&mut self) -> AppResult<TaskStatus> {
        if self.status == TaskStatus::Cancelled {
            return Ok(self.status);
        }
        let job_id = self.job_id()?.to_string();
        let query = self.backend.status_query_command(&job_id);
        let out = self
            .ensure_session()?
            .run_command(RemoteCommand::from(query))
            .await?;
        if !out.stderr.trim().is_empty() {
            tracing::debug!("status query for job {job_id} wrote: {}", out.stderr.trim_end());
        }
        let state = self.backend.parse_status_line(&out.stdout);
        match state.task_status() {
            Some(status) if status != self.status => {
                tracing::info!("job {job_id}: {} -> {status}", self.status);
                self.status = status;
                self.dirty = true;
            }
            Some(_) => {}
            None => tracing::warn!(
                "job {job_id} reported unrecognized state {state:?}; keeping {}",
                self.status
            ),
        }
        Ok(self.status)
    }

    /// Polls until the task reaches a terminal status, the token is
    /// cancelled or the timeout expires.
    pub async fn check_job(
        &mut self,
        poll: &PollOptions,
        save_to: Option<&StateFile>,
    ) -> AppResult<TaskStatus> {
        let deadline = poll.timeout.map(|timeout| Instant::now() + timeout);
        loop {
            let status = self.check_job_status().await?;
            tracing::info!("task {} status: {status}", self.id);
            if let Some(file) = save_to {
                self.save(file)?;
            }
            if status.is_terminal() {
                return Ok(status);
            }
            tokio::select! {
                _ = poll.cancel.cancelled() => {
                    return Err(polling_stopped(format!("polling cancelled at status {status}")));
                }
                _ = sleep_until_deadline(deadline) => {
                    return Err(polling_stopped(format!("polling timed out at status {status}")));
                }
                _ = tokio::time::sleep(poll.interval) => {}
            }
        }
    }

    /// Cancels a submitted or running job. Returns `false` without touching
    /// the remote host when the status does not allow cancelling.
    pub async fn cancel(&mut self, remove_data: bool) -> AppResult<bool> {
        if !self.status.is_cancellable() {
            tracing::info!(
                "task {} is {}; nothing to cancel",
                self.id,
                self.status
            );
            return Ok(false);
        }
        let job_id = self.job_id()?.to_string();
        let command = self.backend.cancel_command_for(&job_id);
        let out = self
            .ensure_session()?
            .run_command(RemoteCommand::from(command))
            .await?;
        require_clean_stderr(&out, "job cancellation failed")?;
        tracing::info!("cancelled job {job_id}");
        self.status = TaskStatus::Cancelled;
        self.dirty = true;
        if remove_data {
            self.clean_remote().await?;
        }
        Ok(true)
    }

    /// Refreshes the status, then reads the job's stdout and stderr files.
    pub async fn get_logs(&mut self) -> AppResult<TaskLogs> {
        self.check_job_status().await?;
        let workdir = self.remote_working_dir()?;
        let resolve = |name: &str| {
            if name.starts_with('/') {
                name.to_string()
            } else {
                join_remote(&workdir, name)
            }
        };
        let stdout_path = resolve(self.queue_settings.get("stdout").unwrap_or(DEFAULT_STDOUT));
        let stderr_path = resolve(self.queue_settings.get("stderr").unwrap_or(DEFAULT_STDERR));
        let session = self.ensure_session()?;
        let stdout = session
            .read_file(&stdout_path)
            .await
            .map_err(|err| err.with_context(format!("reading {stdout_path}")))?;
        let stderr = session
            .read_file(&stderr_path)
            .await
            .map_err(|err| err.with_context(format!("reading {stderr_path}")))?;
        Ok(TaskLogs { stdout, stderr })
    }

    /// Downloads files from the remote working directory that are missing
    /// locally or newer there, per `request.policy`. Returns how many files
    /// were fetched.
    pub async fn get_output_data(&mut self, request: OutputRequest) -> AppResult<usize> {
        let target = match request.local_path.or_else(|| self.output_data_path.clone()) {
            Some(path) => path,
            None => {
                let fallback = self.local_data_path.clone().ok_or_else(|| {
                    AppError::invalid_argument("no local output directory given or recorded")
                })?;
                tracing::warn!(
                    "no output directory given, using input directory {}",
                    fallback.display()
                );
                fallback
            }
        };
        std::fs::create_dir_all(&target).map_err(|err| {
            AppError::local_io(format!("failed to create {}: {err}", target.display()))
        })?;
        let workdir = self.remote_working_dir()?;
        let policy = request.policy;

        let session = self.ensure_session()?;
        let mut remote = session.stat_dir(&workdir).await?;
        if let Some(wanted) = &request.files {
            for name in wanted.iter().filter(|name| !remote.contains_key(*name)) {
                tracing::warn!("requested file {name} not found in {workdir}");
            }
            remote.retain(|name, _| wanted.contains(name));
        }
        let mut local = DataBundle::new(OUTPUT_BUNDLE_ID);
        local.add_directory(&target)?;
        let selected = plan_transfers(
            remote
                .iter()
                .map(|(name, stat)| (name.as_str(), if policy.new_only { stat.mtime } else { None })),
            &local.mtimes(),
            policy,
        );
        tracing::info!(
            "downloading {} of {} file(s) from {workdir} to {}",
            selected.len(),
            remote.len(),
            target.display()
        );
        for name in &selected {
            let source = join_remote(&workdir, name);
            let dest = target.join(name);
            tracing::debug!("get {source} -> {}", dest.display());
            session
                .get(&source, &dest)
                .await
                .map_err(|err| err.with_context(format!("downloading {source}")))?;
        }

        let mut bundle = DataBundle::remote(OUTPUT_BUNDLE_ID);
        for (name, stat) in remote {
            let path = join_remote(&workdir, &name);
            bundle.add_remote_entry(name, path, stat);
        }
        self.output_data = Some(bundle);
        self.output_data_path = Some(target);
        self.dirty = true;
        Ok(selected.len())
    }

    /// Removes the remote working directory and forgets output recorded from it.
    pub async fn clean_remote(&mut self) -> AppResult<()> {
        let workdir = self.remote_working_dir()?;
        let out = self
            .ensure_session()?
            .run_command(RemoteCommand::from(format!("rm -rf {}", sh_escape(&workdir))))
            .await?;
        require_clean_stderr(&out, "failed to remove remote directory")
            .map_err(|err| err.with_context(workdir.clone()))?;
        tracing::info!("removed {workdir}");
        self.output_data = None;
        self.output_data_path = None;
        self.input_data_loaded = false;
        self.dirty = true;
        Ok(())
    }

    /// Lists the bound user's jobs on the scheduler. A `queues_command` in
    /// the host configuration replaces the scheduler's own listing.
    pub async fn check_queue(&mut self) -> AppResult<String> {
        let user = self
            .credentials
            .as_ref()
            .map(|creds| creds.user().to_string())
            .ok_or_else(|| AppError::state(format!("task {} has no credentials bound", self.id)))?;
        let command = match self.host_config.as_ref().and_then(HostConfig::queues_command) {
            Some(command) => command.to_string(),
            None => self.backend.queue_listing_command(&user),
        };
        let out = self
            .ensure_session()?
            .run_command(RemoteCommand::from(command))
            .await?;
        require_clean_stderr(&out, "queue listing failed")?;
        Ok(out.stdout)
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            status: self.status,
            remote_job_id: self.remote_job_id.clone(),
            remote_base_path: self.remote_base_path.clone(),
            queue_settings: self.queue_settings.clone(),
            modules: self.modules.clone(),
            local_data_bundle: self.local_data.as_ref().map(DataBundle::to_transport),
            output_data_bundle: self.output_data.as_ref().map(DataBundle::to_transport),
            job_name: self.job_name.clone(),
            input_data_loaded: self.input_data_loaded,
            local_data_path: self.local_data_path.clone(),
            output_data_path: self.output_data_path.clone(),
        }
    }

    /// Writes the state when it changed since the last save. Returns whether
    /// anything was written.
    pub fn save(&mut self, file: &StateFile) -> AppResult<bool> {
        if !self.dirty {
            return Ok(false);
        }
        file.write(&self.snapshot())?;
        self.dirty = false;
        tracing::debug!("saved task {} to {}", self.id, file.path.display());
        Ok(true)
    }

    /// Replaces this task's state with the persisted one, identity included.
    pub fn load_data_from_file(&mut self, file: &StateFile) -> AppResult<()> {
        let snapshot = file.read()?;
        match (snapshot.status.has_job_id(), &snapshot.remote_job_id) {
            (true, None) => {
                return Err(AppError::persistence(format!(
                    "task {} is {} but has no job id",
                    snapshot.id, snapshot.status
                ))
                .with_context(file.path.display().to_string()));
            }
            (false, Some(job_id)) => {
                return Err(AppError::persistence(format!(
                    "task {} is {} but records job {job_id}",
                    snapshot.id, snapshot.status
                ))
                .with_context(file.path.display().to_string()));
            }
            _ => {}
        }
        self.id = snapshot.id;
        self.status = snapshot.status;
        self.remote_job_id = snapshot.remote_job_id;
        self.remote_base_path = snapshot.remote_base_path;
        self.queue_settings = snapshot.queue_settings;
        self.modules = snapshot.modules;
        self.local_data = snapshot.local_data_bundle.map(DataBundle::from_transport);
        self.output_data = snapshot.output_data_bundle.map(DataBundle::from_transport);
        self.job_name = snapshot.job_name;
        self.input_data_loaded = snapshot.input_data_loaded;
        self.local_data_path = snapshot.local_data_path;
        self.output_data_path = snapshot.output_data_path;
        self.script = None;
        self.dirty = false;
        tracing::debug!("loaded task {} from {}", self.id, file.path.display());
        Ok(())
    }

    /// Rendering and submitting are only allowed before the first submission.
    pub fn ensure_unsubmitted(&self) -> AppResult<()> {
        if self.status == TaskStatus::Unknown {
            return Ok(());
        }
        Err(AppError::state(format!(
            "task {} was already submitted (status {})",
            self.id, self.status
        )))
    }

    fn job_id(&self) -> AppResult<&str> {
        self.remote_job_id.as_deref().ok_or_else(|| {
            AppError::state(format!("task {} has not been submitted", self.id))
        })
    }
}

fn require_clean_stderr(out: &CommandOutput, what: &str) -> AppResult<()> {
    if out.stderr.trim().is_empty() {
        return Ok(());
    }
    Err(AppError::remote(format!("{what}: {}", out.stderr.trim_end())))
}

fn polling_stopped(message: String) -> AppError {
    AppError::with_message(AppErrorKind::Cancelled, codes::CANCELED, message)
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
