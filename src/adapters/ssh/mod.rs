// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! SSH transport built on russh, with SFTP file channels from russh-sftp.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{Connection, Connector};
use crate::app::services::credentials::Credentials;

mod auth;
mod connection;
mod error;
mod sftp;

pub use connection::SshConnection;
pub use error::{AuthenticationFailure, NoIdentity};
pub use sftp::SftpFileChannel;

/// Connection tuning shared by every connection the connector opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshOptions {
    /// Alternative known_hosts file; `None` uses the user's default.
    pub known_hosts: Option<PathBuf>,
    pub keepalive_secs: u64,
    pub inactivity_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            known_hosts: None,
            keepalive_secs: 15,
            inactivity_timeout_secs: 30,
            connect_timeout_secs: 20,
        }
    }
}

#[derive(Clone)]
pub struct RusshConnector {
    options: SshOptions,
    config: Arc<russh::client::Config>,
}

impl RusshConnector {
    pub fn new(options: SshOptions) -> Self {
        let config = russh::client::Config {
            inactivity_timeout: Some(Duration::from_secs(options.inactivity_timeout_secs)),
            keepalive_interval: Some(Duration::from_secs(options.keepalive_secs)),
            channel_buffer_size: 64,
            window_size: 1024 * 1024,
            ..Default::default()
        };
        Self {
            options,
            config: Arc::new(config),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SshOptions::default())
    }
}

fn ssh_error_code(err: &anyhow::Error) -> &'static str {
    if err.chain().any(|cause| cause.is::<AuthenticationFailure>()) {
        codes::AUTHENTICATION_FAILURE
    } else {
        codes::CONNECTION_FAILURE
    }
}

fn map_connect_error(err: anyhow::Error) -> AppError {
    let code = ssh_error_code(&err);
    let kind = if code == codes::AUTHENTICATION_FAILURE {
        AppErrorKind::Authentication
    } else {
        AppErrorKind::Session
    };
    AppError::with_message(kind, code, format!("ssh connect failed: {err:#}"))
}

pub(crate) fn map_exec_error(err: anyhow::Error) -> AppError {
    AppError::with_message(
        AppErrorKind::Session,
        codes::REMOTE_ERROR,
        format!("ssh exec failed: {err:#}"),
    )
}

#[async_trait]
impl Connector for RusshConnector {
    #[tracing::instrument(
        name = "ssh",
        level = "debug",
        skip(self, credentials),
        fields(op = "connect", host = %credentials.host(), user = %credentials.user(), port = credentials.port())
    )]
    async fn connect(&self, credentials: &Credentials) -> AppResult<Box<dyn Connection>> {
        let timeout = Duration::from_secs(self.options.connect_timeout_secs);
        let attempt = SshConnection::establish(
            self.config.clone(),
            credentials,
            self.options.known_hosts.clone(),
        );
        let conn = match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result.map_err(map_connect_error)?,
            Err(_) => {
                return Err(AppError::with_message(
                    AppErrorKind::Session,
                    codes::CONNECTION_FAILURE,
                    format!(
                        "timed out after {}s connecting to {}:{}",
                        timeout.as_secs(),
                        credentials.host(),
                        credentials.port()
                    ),
                ));
            }
        };
        log::info!(
            "connected to {}@{}:{}",
            credentials.user(),
            credentials.host(),
            credentials.port()
        );
        Ok(Box::new(conn))
    }
}
