// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::services::credentials::Credentials;
use crate::app::types::{CommandOutput, RemoteCommand, RemoteStat, TransferOp, TransferOutcome};

#[async_trait]
/// Reusable session against one remote host: command execution and file
/// transfer over a lazily opened connection.
pub trait RemoteSessionPort: Send {
    /// Runs a command and waits for it to finish.
    async fn run_command(&mut self, command: RemoteCommand) -> AppResult<CommandOutput>;

    async fn get(&mut self, remote_path: &str, local_path: &Path) -> AppResult<()>;
    async fn put(&mut self, local_path: &Path, remote_path: &str) -> AppResult<()>;
    async fn create(&mut self, remote_path: &str, contents: &str) -> AppResult<()>;
    async fn read_file(&mut self, remote_path: &str) -> AppResult<String>;
    async fn list_dir(&mut self, remote_dir: &str) -> AppResult<Vec<String>>;
    async fn stat(&mut self, remote_path: &str) -> AppResult<RemoteStat>;
    async fn stat_dir(&mut self, remote_dir: &str) -> AppResult<BTreeMap<String, RemoteStat>>;

    /// Drops the cached file-transfer channel so the next transfer opens a fresh one.
    fn reset_file_channel(&mut self);

    fn is_active(&self) -> bool;

    /// Closes the connection. Safe to call repeatedly or before any use.
    async fn close(&mut self);

    /// Generic transfer dispatcher. Unknown operations are reported as
    /// `TransferOutcome::Unsupported` rather than failing.
    async fn transfer(
        &mut self,
        op: TransferOp,
        source: &str,
        dest: &str,
        reuse: bool,
    ) -> AppResult<TransferOutcome> {
        if let TransferOp::Unsupported(name) = op {
            tracing::warn!("unsupported transfer operation '{name}'");
            return Ok(TransferOutcome::Unsupported(name));
        }
        if !reuse {
            self.reset_file_channel();
        }
        let outcome = match op {
            TransferOp::Get => {
                self.get(source, Path::new(dest)).await?;
                TransferOutcome::Done
            }
            TransferOp::Put => {
                self.put(Path::new(source), dest).await?;
                TransferOutcome::Done
            }
            TransferOp::Create => {
                self.create(dest, source).await?;
                TransferOutcome::Done
            }
            TransferOp::ReadFile => TransferOutcome::Contents(self.read_file(source).await?),
            TransferOp::ListDirectory => TransferOutcome::Names(self.list_dir(source).await?),
            TransferOp::Stat => TransferOutcome::Stat(self.stat(source).await?),
            TransferOp::StatDirectory => TransferOutcome::Stats(self.stat_dir(source).await?),
            TransferOp::Unsupported(name) => TransferOutcome::Unsupported(name),
        };
        Ok(outcome)
    }
}

/// Builds sessions bound to a set of credentials.
pub trait SessionFactory: Send + Sync {
    fn build(&self, credentials: Credentials) -> Box<dyn RemoteSessionPort>;
}
