// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Lazily connected, reusable session against one remote host.
//!
//! The connection is opened on first use and kept for later calls. Before
//! every operation the cached connection is checked; a dead one is dropped
//! together with its file channel and a new connection is opened.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{Connection, Connector, FileChannel, RemoteSessionPort, SessionFactory};
use crate::app::services::credentials::Credentials;
use crate::app::types::{CommandOutput, RemoteCommand, RemoteStat};

pub struct RemoteSession {
    credentials: Credentials,
    connector: Arc<dyn Connector>,
    connection: Option<Box<dyn Connection>>,
    file_channel: Option<Box<dyn FileChannel>>,
}

impl RemoteSession {
    pub fn new(credentials: Credentials, connector: Arc<dyn Connector>) -> Self {
        Self {
            credentials,
            connector,
            connection: None,
            file_channel: None,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Opens the connection now instead of on first use.
    pub async fn open(&mut self) -> AppResult<()> {
        self.connection().await.map(|_| ())
    }

    async fn connection(&mut self) -> AppResult<&dyn Connection> {
        if self.connection.as_ref().is_some_and(|conn| !conn.is_alive()) {
            tracing::info!(
                "connection to {}@{} went stale, reconnecting",
                self.credentials.user(),
                self.credentials.host()
            );
            self.file_channel = None;
            self.connection = None;
        }
        if self.connection.is_none() {
            tracing::debug!(
                "opening connection to {}@{}:{}",
                self.credentials.user(),
                self.credentials.host(),
                self.credentials.port()
            );
            let conn = self.connector.connect(&self.credentials).await?;
            self.connection = Some(conn);
        }
        self.connection.as_deref().ok_or_else(connection_lost)
    }

    async fn file_channel(&mut self) -> AppResult<&dyn FileChannel> {
        self.connection().await?;
        if self.file_channel.is_none() {
            let conn = self.connection.as_deref().ok_or_else(connection_lost)?;
            let channel = conn.open_file_channel().await?;
            self.file_channel = Some(channel);
        }
        self.file_channel.as_deref().ok_or_else(connection_lost)
    }
}

fn connection_lost() -> AppError {
    AppError::with_message(
        AppErrorKind::Session,
        codes::CONNECTION_FAILURE,
        "connection handle lost",
    )
}

#[async_trait]
impl RemoteSessionPort for RemoteSession {
    async fn run_command(&mut self, command: RemoteCommand) -> AppResult<CommandOutput> {
        let line = command.render();
        tracing::debug!("running remote command '{line}'");
        let conn = self.connection().await?;
        conn.exec(&line).await
    }

    async fn get(&mut self, remote_path: &str, local_path: &Path) -> AppResult<()> {
        self.file_channel().await?.get(remote_path, local_path).await
    }

    async fn put(&mut self, local_path: &Path, remote_path: &str) -> AppResult<()> {
        self.file_channel().await?.put(local_path, remote_path).await
    }

    async fn create(&mut self, remote_path: &str, contents: &str) -> AppResult<()> {
        self.file_channel()
            .await?
            .write(remote_path, contents.as_bytes())
            .await
    }

    async fn read_file(&mut self, remote_path: &str) -> AppResult<String> {
        self.file_channel().await?.read_to_string(remote_path).await
    }

    async fn list_dir(&mut self, remote_dir: &str) -> AppResult<Vec<String>> {
        self.file_channel().await?.list_dir(remote_dir).await
    }

    async fn stat(&mut self, remote_path: &str) -> AppResult<RemoteStat> {
        self.file_channel().await?.stat(remote_path).await
    }

    async fn stat_dir(&mut self, remote_dir: &str) -> AppResult<BTreeMap<String, RemoteStat>> {
        self.file_channel().await?.stat_dir(remote_dir).await
    }

    fn reset_file_channel(&mut self) {
        self.file_channel = None;
    }

    fn is_active(&self) -> bool {
        self.connection.as_ref().is_some_and(|conn| conn.is_alive())
    }

    async fn close(&mut self) {
        self.file_channel = None;
        if let Some(conn) = self.connection.take() {
            conn.disconnect().await;
            tracing::debug!(
                "closed connection to {}@{}",
                self.credentials.user(),
                self.credentials.host()
            );
        }
    }
}

/// Builds [`RemoteSession`]s sharing one connector.
#[derive(Clone)]
pub struct RemoteSessionFactory {
    connector: Arc<dyn Connector>,
}

impl RemoteSessionFactory {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }
}

impl SessionFactory for RemoteSessionFactory {
    fn build(&self, credentials: Credentials) -> Box<dyn RemoteSessionPort> {
        Box::new(RemoteSession::new(credentials, self.connector.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::FakeRemote;
    use crate::app::types::{TransferOp, TransferOutcome};
    use tempfile::TempDir;

    fn session(remote: &FakeRemote) -> RemoteSession {
        RemoteSession::new(Credentials::new("login1", "alice"), remote.connector())
    }

    #[tokio::test]
    async fn consecutive_operations_reuse_the_connection() {
        let remote = FakeRemote::new();
        let mut session = session(&remote);
        assert!(!session.is_active());

        session.run_command("hostname".into()).await.unwrap();
        session
            .run_command(vec!["ls".to_string(), "-l".to_string()].into())
            .await
            .unwrap();

        assert_eq!(remote.connects(), 1);
        assert!(session.is_active());
        assert_eq!(remote.commands(), vec!["hostname", "ls -l"]);
    }

    #[tokio::test]
    async fn dropped_connection_is_reopened_on_next_use() {
        let remote = FakeRemote::new();
        let mut session = session(&remote);
        session.run_command("true".into()).await.unwrap();

        remote.drop_connection();
        assert!(!session.is_active());

        session.run_command("true".into()).await.unwrap();
        assert!(session.is_active());
        assert_eq!(remote.connects(), 2);
    }

    #[tokio::test]
    async fn rejected_credentials_surface_as_authentication_error() {
        let remote = FakeRemote::new();
        remote.reject_auth();
        let mut session = session(&remote);
        let err = session.run_command("true".into()).await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::Authentication);
    }

    #[tokio::test]
    async fn file_channel_is_reused_unless_asked_otherwise() {
        let remote = FakeRemote::new();
        remote.insert_file("/data/a.txt", "alpha", 10);
        let mut session = session(&remote);

        session.transfer(TransferOp::ReadFile, "/data/a.txt", "", true).await.unwrap();
        session.transfer(TransferOp::ReadFile, "/data/a.txt", "", true).await.unwrap();
        assert_eq!(remote.file_channel_opens(), 1);

        session.transfer(TransferOp::ReadFile, "/data/a.txt", "", false).await.unwrap();
        assert_eq!(remote.file_channel_opens(), 2);
    }

    #[tokio::test]
    async fn transfer_dispatches_each_operation() {
        let remote = FakeRemote::new();
        remote.insert_dir("/data");
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("in.txt");
        std::fs::write(&local, "payload").unwrap();
        let mut session = session(&remote);

        let put = session
            .transfer(TransferOp::Put, local.to_str().unwrap(), "/data/in.txt", true)
            .await
            .unwrap();
        assert_eq!(put, TransferOutcome::Done);

        session
            .transfer(TransferOp::Create, "hello", "/data/greeting.txt", true)
            .await
            .unwrap();
        let contents = session
            .transfer(TransferOp::ReadFile, "/data/greeting.txt", "", true)
            .await
            .unwrap();
        assert_eq!(contents, TransferOutcome::Contents("hello".to_string()));

        let names = session
            .transfer(TransferOp::ListDirectory, "/data", "", true)
            .await
            .unwrap();
        assert_eq!(
            names,
            TransferOutcome::Names(vec!["greeting.txt".to_string(), "in.txt".to_string()])
        );

        let TransferOutcome::Stat(stat) = session
            .transfer(TransferOp::Stat, "/data/in.txt", "", true)
            .await
            .unwrap()
        else {
            panic!("expected a stat outcome");
        };
        assert_eq!(stat.size, Some(7));

        let back = dir.path().join("back.txt");
        session
            .transfer(TransferOp::Get, "/data/in.txt", back.to_str().unwrap(), true)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(back).unwrap(), "payload");
    }

    #[tokio::test]
    async fn unknown_operation_is_reported_not_raised() {
        let remote = FakeRemote::new();
        let mut session = session(&remote);
        let op: TransferOp = "chmod".parse().unwrap();
        let outcome = session.transfer(op, "a", "b", true).await.unwrap();
        assert_eq!(outcome, TransferOutcome::Unsupported("chmod".to_string()));
        assert_eq!(remote.connects(), 0);
    }

    #[tokio::test]
    async fn missing_remote_file_is_a_transfer_error() {
        let remote = FakeRemote::new();
        let mut session = session(&remote);
        let err = session.read_file("/nope").await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::Transfer);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let remote = FakeRemote::new();
        let mut session = session(&remote);
        session.close().await;
        session.run_command("true".into()).await.unwrap();
        session.close().await;
        session.close().await;
        assert!(!session.is_active());
        assert_eq!(remote.connects(), 1);
    }
}
