// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use russh::ChannelMsg;
use russh::client::{Config, Handle};
use russh::keys::known_hosts::{learn_known_hosts, learn_known_hosts_path};
use russh_sftp::client::SftpSession;
use tokio::sync::Mutex;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{Connection, FileChannel};
use crate::app::services::credentials::Credentials;
use crate::app::types::CommandOutput;

use super::sftp::SftpFileChannel;
use super::{auth, map_exec_error};

#[derive(Clone, Debug)]
pub(super) struct ClientHandler {
    host: String,
    addr: SocketAddr,
    known_hosts: Option<PathBuf>,
}

impl russh::client::Handler for ClientHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        verify_server_key(
            &self.host,
            self.addr,
            server_public_key,
            self.known_hosts.as_deref(),
        )
    }
}

fn check_known_hosts_for(
    host: &str,
    port: u16,
    key: &russh::keys::ssh_key::PublicKey,
    known_hosts_path: Option<&Path>,
) -> std::result::Result<bool, russh::keys::Error> {
    match known_hosts_path {
        Some(path) => russh::keys::check_known_hosts_path(host, port, key, path),
        None => russh::keys::check_known_hosts(host, port, key),
    }
}

fn learn_known_hosts_for(
    host: &str,
    port: u16,
    key: &russh::keys::ssh_key::PublicKey,
    known_hosts_path: Option<&Path>,
) -> std::result::Result<(), russh::keys::Error> {
    match known_hosts_path {
        Some(path) => learn_known_hosts_path(host, port, key, path),
        None => learn_known_hosts(host, port, key),
    }
}

/// Accepts keys already in known_hosts (by name or by IP) and learns
/// unknown ones. A mismatching key is an error.
fn verify_server_key(
    host: &str,
    addr: SocketAddr,
    key: &russh::keys::ssh_key::PublicKey,
    known_hosts_path: Option<&Path>,
) -> Result<bool> {
    let port = addr.port();
    let ip_host = addr.ip().to_string();
    let mut candidates = vec![host.to_string()];
    if ip_host != host {
        candidates.push(ip_host);
    }
    for candidate in &candidates {
        match check_known_hosts_for(candidate, port, key, known_hosts_path) {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(err) => {
                log::warn!("server key validation failed for {host}:{port}: {err}");
                return Err(anyhow!(
                    "server key validation failed for {host}:{port}: {err}"
                ));
            }
        }
    }

    log::info!(
        "server key for {host}:{port} is not in known_hosts (tried {}); learning",
        candidates.join(", ")
    );
    learn_known_hosts_for(host, port, key, known_hosts_path).map_err(|err| {
        log::warn!("failed to learn server key for {host}:{port}: {err}");
        anyhow!("failed to learn server key for {host}:{port}: {err}")
    })?;
    Ok(true)
}

/// One authenticated russh connection.
pub struct SshConnection {
    handle: Mutex<Handle<ClientHandler>>,
}

impl SshConnection {
    pub(super) async fn establish(
        config: Arc<Config>,
        credentials: &Credentials,
        known_hosts: Option<PathBuf>,
    ) -> Result<Self> {
        let addr = tokio::net::lookup_host((credentials.host(), credentials.port()))
            .await
            .with_context(|| format!("resolving {}", credentials.host()))?
            .next()
            .ok_or_else(|| anyhow!("{} did not resolve to any address", credentials.host()))?;
        let handler = ClientHandler {
            host: credentials.host().to_string(),
            addr,
            known_hosts,
        };
        let mut handle = russh::client::connect(config, addr, handler)
            .await
            .context("SSH connect failed")?;
        log::debug!(
            "established connection with {}@{addr}, proceeding with auth",
            credentials.user()
        );
        auth::authenticate(&mut handle, credentials).await?;
        Ok(Self {
            handle: Mutex::new(handle),
        })
    }
}

fn handle_capture_message(
    msg: &ChannelMsg,
    out: &mut Vec<u8>,
    err: &mut Vec<u8>,
    code: &mut i32,
) -> bool {
    match msg {
        ChannelMsg::Data { data } => {
            out.extend_from_slice(data);
            false
        }
        ChannelMsg::ExtendedData { data, ext: 1 } => {
            err.extend_from_slice(data);
            false
        }
        ChannelMsg::ExitStatus { exit_status } => {
            *code = *exit_status as i32;
            false
        }
        ChannelMsg::Close => true,
        _ => false,
    }
}

impl SshConnection {
    async fn exec_capture(&self, command: &str) -> Result<CommandOutput> {
        let handle = self.handle.lock().await;
        let mut chan = handle
            .channel_open_session()
            .await
            .context("open session")?;
        log::debug!("executing '{command}'");
        chan.exec(true, command).await.context("exec request")?;
        let mut out = Vec::new();
        let mut err = Vec::new();
        let mut code: i32 = 0;
        while let Some(msg) = chan.wait().await {
            if handle_capture_message(&msg, &mut out, &mut err, &mut code) {
                break;
            }
        }
        let _ = chan.close().await;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&out).into_owned(),
            stderr: String::from_utf8_lossy(&err).into_owned(),
            exit_code: code,
        })
    }

    async fn sftp(&self) -> Result<SftpSession> {
        let handle = self.handle.lock().await;
        let channel = handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        Ok(sftp)
    }
}

#[async_trait]
impl Connection for SshConnection {
    fn is_alive(&self) -> bool {
        // A held lock means a command is in flight on a live handle.
        self.handle
            .try_lock()
            .map_or(true, |handle| !handle.is_closed())
    }

    async fn exec(&self, command: &str) -> AppResult<CommandOutput> {
        self.exec_capture(command).await.map_err(map_exec_error)
    }

    async fn open_file_channel(&self) -> AppResult<Box<dyn FileChannel>> {
        let sftp = self.sftp().await.map_err(|err| {
            AppError::with_message(
                AppErrorKind::Session,
                codes::CONNECTION_FAILURE,
                format!("failed to open sftp channel: {err:#}"),
            )
        })?;
        Ok(Box::new(SftpFileChannel::new(sftp)))
    }

    async fn disconnect(&self) {
        let handle = self.handle.lock().await;
        if let Err(err) = handle
            .disconnect(russh::Disconnect::ByApplication, "", "English")
            .await
        {
            log::debug!("error while disconnecting: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh::CryptoVec;

    #[test]
    fn capture_splits_stdout_stderr_and_exit_code() {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let mut code = 0;
        let msgs = [
            ChannelMsg::Data {
                data: CryptoVec::from_slice(b"Submitted batch job 7\n"),
            },
            ChannelMsg::ExtendedData {
                data: CryptoVec::from_slice(b"warning\n"),
                ext: 1,
            },
            ChannelMsg::ExitStatus { exit_status: 3 },
        ];
        for msg in &msgs {
            assert!(!handle_capture_message(msg, &mut out, &mut err, &mut code));
        }
        assert!(handle_capture_message(
            &ChannelMsg::Close,
            &mut out,
            &mut err,
            &mut code
        ));
        assert_eq!(out, b"Submitted batch job 7\n");
        assert_eq!(err, b"warning\n");
        assert_eq!(code, 3);
    }
}
