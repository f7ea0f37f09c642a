// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::services::credentials::Credentials;
use crate::app::types::{CommandOutput, RemoteStat};

#[async_trait]
/// Opens authenticated connections to the host named by the credentials.
/// The SSH adapter is the production implementation; tests swap in an
/// in-memory one.
pub trait Connector: Send + Sync {
    async fn connect(&self, credentials: &Credentials) -> AppResult<Box<dyn Connection>>;
}

#[async_trait]
/// One live connection to a remote host.
pub trait Connection: Send + Sync {
    /// True while the underlying transport reports itself alive.
    fn is_alive(&self) -> bool;

    /// Runs a command to completion and captures its output.
    async fn exec(&self, command: &str) -> AppResult<CommandOutput>;

    /// Opens a new file-transfer sub-channel on this connection.
    async fn open_file_channel(&self) -> AppResult<Box<dyn FileChannel>>;

    async fn disconnect(&self);
}

#[async_trait]
/// File-transfer sub-channel (SFTP in production).
pub trait FileChannel: Send + Sync {
    async fn get(&self, remote_path: &str, local_path: &Path) -> AppResult<()>;
    async fn put(&self, local_path: &Path, remote_path: &str) -> AppResult<()>;
    async fn write(&self, remote_path: &str, contents: &[u8]) -> AppResult<()>;
    async fn read_to_string(&self, remote_path: &str) -> AppResult<String>;
    async fn list_dir(&self, remote_dir: &str) -> AppResult<Vec<String>>;
    async fn stat(&self, remote_path: &str) -> AppResult<RemoteStat>;
    /// Stats every regular file directly inside `remote_dir` in one pass.
    async fn stat_dir(&self, remote_dir: &str) -> AppResult<BTreeMap<String, RemoteStat>>;
}
