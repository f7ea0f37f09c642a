// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use russh_sftp::client::SftpSession;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::{FileAttributes, OpenFlags, StatusCode};
use tokio::fs as tokiofs;
use tokio::io::AsyncWriteExt;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::FileChannel;
use crate::app::types::RemoteStat;

/// File-transfer channel over one SFTP subsystem session. Transfers carry
/// the source's modification time over to the copy.
pub struct SftpFileChannel {
    sftp: SftpSession,
}

impl SftpFileChannel {
    pub fn new(sftp: SftpSession) -> Self {
        Self { sftp }
    }
}

fn is_missing(err: &SftpError) -> bool {
    matches!(err, SftpError::Status(status) if status.status_code == StatusCode::NoSuchFile)
}

fn sftp_error(op: &str, path: &str, err: SftpError) -> AppError {
    if is_missing(&err) {
        AppError::with_message(
            AppErrorKind::Transfer,
            codes::NOT_FOUND,
            format!("remote path missing: {path}"),
        )
    } else {
        AppError::transfer(format!("sftp {op} failed: {err}")).with_context(path.to_string())
    }
}

fn local_error(op: &str, path: &Path, err: std::io::Error) -> AppError {
    AppError::transfer(format!("{op} failed: {err}")).with_context(path.display().to_string())
}

fn remote_write_error(path: &str, err: std::io::Error) -> AppError {
    AppError::transfer(format!("write failed: {err}")).with_context(path.to_string())
}

fn to_stat(attrs: &FileAttributes) -> RemoteStat {
    RemoteStat {
        size: attrs.size,
        mtime: attrs.mtime.map(u64::from),
    }
}

fn local_mtime(path: &Path) -> std::io::Result<Option<u64>> {
    let meta = std::fs::metadata(path)?;
    Ok(meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs()))
}

fn set_local_mtime(path: &Path, mtime: u64) -> std::io::Result<()> {
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_modified(UNIX_EPOCH + Duration::from_secs(mtime))
}

#[async_trait]
impl FileChannel for SftpFileChannel {
    async fn get(&self, remote_path: &str, local_path: &Path) -> AppResult<()> {
        let attrs = self
            .sftp
            .metadata(remote_path)
            .await
            .map_err(|err| sftp_error("stat", remote_path, err))?;
        if let Some(parent) = local_path.parent() {
            tokiofs::create_dir_all(parent)
                .await
                .map_err(|err| local_error("creating directory", parent, err))?;
        }
        let mut rfile = self
            .sftp
            .open(remote_path)
            .await
            .map_err(|err| sftp_error("open", remote_path, err))?;
        let mut lfile = tokiofs::File::create(local_path)
            .await
            .map_err(|err| local_error("creating file", local_path, err))?;
        tokio::io::copy(&mut rfile, &mut lfile)
            .await
            .map_err(|err| local_error("download", local_path, err))?;
        lfile
            .flush()
            .await
            .map_err(|err| local_error("download", local_path, err))?;
        drop(lfile);
        if let Some(mtime) = attrs.mtime {
            set_local_mtime(local_path, u64::from(mtime))
                .map_err(|err| local_error("setting mtime", local_path, err))?;
        }
        Ok(())
    }

    async fn put(&self, local_path: &Path, remote_path: &str) -> AppResult<()> {
        let mut lfile = tokiofs::File::open(local_path)
            .await
            .map_err(|err| local_error("opening file", local_path, err))?;
        let flags = OpenFlags::WRITE
            .union(OpenFlags::CREATE)
            .union(OpenFlags::TRUNCATE);
        let mut rfile = self
            .sftp
            .open_with_flags(remote_path, flags)
            .await
            .map_err(|err| sftp_error("open", remote_path, err))?;
        tokio::io::copy(&mut lfile, &mut rfile)
            .await
            .map_err(|err| local_error("upload", local_path, err))?;
        rfile
            .shutdown()
            .await
            .map_err(|err| local_error("upload", local_path, err))?;

        let mtime = local_mtime(local_path)
            .map_err(|err| local_error("reading mtime", local_path, err))?;
        if let Some(mtime) = mtime.and_then(|m| u32::try_from(m).ok()) {
            let attrs = FileAttributes {
                atime: Some(mtime),
                mtime: Some(mtime),
                ..Default::default()
            };
            if let Err(err) = self.sftp.set_metadata(remote_path, attrs).await {
                log::warn!("could not set mtime on {remote_path}: {err}");
            }
        }
        Ok(())
    }

    async fn write(&self, remote_path: &str, contents: &[u8]) -> AppResult<()> {
        let mut rfile = self
            .sftp
            .create(remote_path)
            .await
            .map_err(|err| sftp_error("create", remote_path, err))?;
        rfile
            .write_all(contents)
            .await
            .map_err(|err| remote_write_error(remote_path, err))?;
        rfile
            .shutdown()
            .await
            .map_err(|err| remote_write_error(remote_path, err))
    }

    async fn read_to_string(&self, remote_path: &str) -> AppResult<String> {
        let bytes = self
            .sftp
            .read(remote_path)
            .await
            .map_err(|err| sftp_error("read", remote_path, err))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn list_dir(&self, remote_dir: &str) -> AppResult<Vec<String>> {
        let entries = self
            .sftp
            .read_dir(remote_dir)
            .await
            .map_err(|err| sftp_error("readdir", remote_dir, err))?;
        let mut names: Vec<String> = entries
            .map(|entry| entry.file_name())
            .filter(|name| name != "." && name != "..")
            .collect();
        names.sort();
        Ok(names)
    }

    async fn stat(&self, remote_path: &str) -> AppResult<RemoteStat> {
        let attrs = self
            .sftp
            .metadata(remote_path)
            .await
            .map_err(|err| sftp_error("stat", remote_path, err))?;
        Ok(to_stat(&attrs))
    }

    async fn stat_dir(&self, remote_dir: &str) -> AppResult<BTreeMap<String, RemoteStat>> {
        let entries = self
            .sftp
            .read_dir(remote_dir)
            .await
            .map_err(|err| sftp_error("readdir", remote_dir, err))?;
        Ok(entries
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| (entry.file_name(), to_stat(&entry.metadata())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh_sftp::protocol::Status;
    use tempfile::TempDir;

    #[test]
    fn missing_remote_paths_map_to_not_found() {
        let err = SftpError::Status(Status {
            id: 1,
            status_code: StatusCode::NoSuchFile,
            error_message: "no such file".into(),
            language_tag: "en".into(),
        });
        let mapped = sftp_error("stat", "/scratch/x", err);
        assert_eq!(mapped.kind(), AppErrorKind::Transfer);
        assert_eq!(mapped.code(), codes::NOT_FOUND);
    }

    #[test]
    fn local_mtime_round_trips_through_set() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.dat");
        std::fs::write(&path, "x").unwrap();
        set_local_mtime(&path, 1_700_000_000).unwrap();
        assert_eq!(local_mtime(&path).unwrap(), Some(1_700_000_000));
    }
}
