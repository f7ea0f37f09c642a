// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task.
///
/// `Cancelled` and `Finished` end polling; a cancelled task may still have
/// its data retrieved or cleaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Unknown,
    Submitted,
    Running,
    Closing,
    Finished,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Unknown => "UNKNOWN",
            TaskStatus::Submitted => "SUBMITTED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Closing => "CLOSING",
            TaskStatus::Finished => "FINISHED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }

    /// Polling stops once a task reaches one of these.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Cancelled)
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, TaskStatus::Submitted | TaskStatus::Running)
    }

    /// Statuses for which the scheduler has handed out a job id.
    pub fn has_job_id(self) -> bool {
        !matches!(self, TaskStatus::Unknown)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduler-side view of a job, as parsed from a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Completing,
    /// The job is no longer listed by the scheduler.
    Gone,
    Unrecognized(String),
}

impl JobState {
    /// Maps the scheduler state onto a task status; `None` keeps the current one.
    pub fn task_status(&self) -> Option<TaskStatus> {
        match self {
            JobState::Pending => Some(TaskStatus::Submitted),
            JobState::Running => Some(TaskStatus::Running),
            JobState::Completing => Some(TaskStatus::Closing),
            JobState::Gone => Some(TaskStatus::Finished),
            JobState::Unrecognized(_) => None,
        }
    }
}

/// Ordered directive-name to value mapping. Order is preserved because some
/// schedulers care about directive order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueSettings(IndexMap<String, String>);

impl QueueSettings {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Inserts or replaces a value. A replaced key keeps its original position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Overlays `other` on top of `self`.
    pub fn merge(&mut self, other: &QueueSettings) {
        for (key, value) in other.iter() {
            self.set(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueueSettings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut settings = QueueSettings::new();
        for (k, v) in iter {
            settings.set(k, v);
        }
        settings
    }
}

/// A remote command, either raw or as argument words joined by single spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    Line(String),
    Words(Vec<String>),
}

impl RemoteCommand {
    pub fn render(&self) -> String {
        match self {
            RemoteCommand::Line(line) => line.clone(),
            RemoteCommand::Words(words) => words.join(" "),
        }
    }
}

impl From<&str> for RemoteCommand {
    fn from(value: &str) -> Self {
        RemoteCommand::Line(value.to_string())
    }
}

impl From<String> for RemoteCommand {
    fn from(value: String) -> Self {
        RemoteCommand::Line(value)
    }
}

impl From<Vec<String>> for RemoteCommand {
    fn from(value: Vec<String>) -> Self {
        RemoteCommand::Words(value)
    }
}

impl From<&[&str]> for RemoteCommand {
    fn from(value: &[&str]) -> Self {
        RemoteCommand::Words(value.iter().map(|w| w.to_string()).collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Size and modification time of a single remote entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteStat {
    pub size: Option<u64>,
    /// Seconds since the Unix epoch.
    pub mtime: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOp {
    /// Remote source to local destination.
    Get,
    /// Local source to remote destination.
    Put,
    /// Writes the source string into the remote destination file.
    Create,
    /// Returns the contents of the remote source file.
    ReadFile,
    ListDirectory,
    Stat,
    /// Size and mtime of every regular file in a remote directory.
    StatDirectory,
    Unsupported(String),
}

impl FromStr for TransferOp {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "get" => TransferOp::Get,
            "put" => TransferOp::Put,
            "create" => TransferOp::Create,
            "file" | "read" => TransferOp::ReadFile,
            "listdir" | "list" => TransferOp::ListDirectory,
            "lstat" | "stat" => TransferOp::Stat,
            "statdir" => TransferOp::StatDirectory,
            _ => TransferOp::Unsupported(s.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Done,
    Contents(String),
    Names(Vec<String>),
    Stat(RemoteStat),
    Stats(BTreeMap<String, RemoteStat>),
    Unsupported(String),
}
