// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Durable task state.
//!
//! A [`TaskSnapshot`] is written either as a JSON document or as a compact
//! bincode blob. Both encodings carry the same fields. Writes go to a
//! sibling temp file first and are renamed into place.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::errors::{AppError, AppResult};
use crate::app::services::data_bundle::BundleRecord;
use crate::app::types::{QueueSettings, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub status: TaskStatus,
    pub remote_job_id: Option<String>,
    pub remote_base_path: Option<String>,
    pub queue_settings: QueueSettings,
    pub modules: Vec<String>,
    pub local_data_bundle: Option<BundleRecord>,
    pub output_data_bundle: Option<BundleRecord>,
    pub job_name: Option<String>,
    pub input_data_loaded: bool,
    pub local_data_path: Option<PathBuf>,
    pub output_data_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Format {
    #[default]
    #[serde(rename = "json")]
    Structured,
    #[serde(rename = "binary")]
    Binary,
}

impl Format {
    pub fn codec(self) -> &'static dyn SnapshotCodec {
        match self {
            Format::Structured => &JsonCodec,
            Format::Binary => &BincodeCodec,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Structured => "json",
            Format::Binary => "binary",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "structured" => Ok(Format::Structured),
            "binary" | "bincode" | "bin" => Ok(Format::Binary),
            other => Err(AppError::invalid_argument(format!(
                "unknown state format '{other}' (expected json or binary)"
            ))),
        }
    }
}

pub trait SnapshotCodec: Send + Sync {
    fn encode(&self, snapshot: &TaskSnapshot) -> AppResult<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> AppResult<TaskSnapshot>;
}

pub struct JsonCodec;

impl SnapshotCodec for JsonCodec {
    fn encode(&self, snapshot: &TaskSnapshot) -> AppResult<Vec<u8>> {
        serde_json::to_vec_pretty(snapshot)
            .map_err(|err| AppError::persistence(format!("failed to encode task state: {err}")))
    }

    fn decode(&self, bytes: &[u8]) -> AppResult<TaskSnapshot> {
        serde_json::from_slice(bytes)
            .map_err(|err| AppError::persistence(format!("malformed task state: {err}")))
    }
}

pub struct BincodeCodec;

impl SnapshotCodec for BincodeCodec {
    fn encode(&self, snapshot: &TaskSnapshot) -> AppResult<Vec<u8>> {
        bincode::serde::encode_to_vec(snapshot, bincode::config::standard())
            .map_err(|err| AppError::persistence(format!("failed to encode task state: {err}")))
    }

    fn decode(&self, bytes: &[u8]) -> AppResult<TaskSnapshot> {
        let (snapshot, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|err| AppError::persistence(format!("malformed task state: {err}")))?;
        Ok(snapshot)
    }
}

/// Location and encoding of a persisted task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateFile {
    pub path: PathBuf,
    pub format: Format,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>, format: Format) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn write(&self, snapshot: &TaskSnapshot) -> AppResult<()> {
        let bytes = self.format.codec().encode(snapshot)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::persistence(format!("failed to create {}: {err}", parent.display()))
            })?;
        }
        let tmp = temp_path(&self.path);
        fs::write(&tmp, &bytes).map_err(|err| {
            AppError::persistence(format!("failed to write {}: {err}", tmp.display()))
        })?;
        fs::rename(&tmp, &self.path).map_err(|err| {
            let _ = fs::remove_file(&tmp);
            AppError::persistence(format!(
                "failed to move task state into {}: {err}",
                self.path.display()
            ))
        })
    }

    pub fn read(&self) -> AppResult<TaskSnapshot> {
        let bytes = fs::read(&self.path).map_err(|err| {
            AppError::persistence(format!(
                "failed to read task state {}: {err}",
                self.path.display()
            ))
        })?;
        self.format
            .codec()
            .decode(&bytes)
            .map_err(|err| err.with_context(self.path.display().to_string()))
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
