// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! In-memory stand-in for a remote host, used by session and task tests.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{Connection, Connector, FileChannel};
use crate::app::services::credentials::Credentials;
use crate::app::types::{CommandOutput, RemoteStat};

/// mtime given to files created through `write`.
pub const REMOTE_WRITE_MTIME: u64 = 1_000;

#[derive(Debug, Clone)]
struct FakeFile {
    contents: Vec<u8>,
    mtime: u64,
}

#[derive(Default)]
struct RemoteState {
    files: BTreeMap<String, FakeFile>,
    dirs: BTreeSet<String>,
    commands: Vec<String>,
    responses: Vec<(String, Vec<CommandOutput>)>,
    connects: usize,
    live_connection: Option<usize>,
    file_channel_opens: usize,
    puts: usize,
    gets: usize,
    reject_auth: bool,
}

#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn file_channel_opens(&self) -> usize {
        self.lock().file_channel_opens
    }

    pub fn puts(&self) -> usize {
        self.lock().puts
    }

    pub fn gets(&self) -> usize {
        self.lock().gets
    }

    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    pub fn reject_auth(&self) {
        self.lock().reject_auth = true;
    }

    /// Simulates the transport dying under an open connection.
    pub fn drop_connection(&self) {
        self.lock().live_connection = None;
    }

    /// Scripts the output of commands starting with `prefix`. Queued outputs
    /// are consumed in order; the last one keeps answering.
    pub fn respond(&self, prefix: &str, stdout: &str, stderr: &str) {
        let output = CommandOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code: if stderr.is_empty() { 0 } else { 1 },
        };
        let mut state = self.lock();
        match state.responses.iter_mut().find(|(p, _)| p == prefix) {
            Some((_, queue)) => queue.push(output),
            None => state.responses.push((prefix.to_string(), vec![output])),
        }
    }

    pub fn insert_dir(&self, path: &str) {
        let mut state = self.lock();
        add_dir_with_parents(&mut state.dirs, path);
    }

    pub fn insert_file(&self, path: &str, contents: &str, mtime: u64) {
        let mut state = self.lock();
        if let Some((parent, _)) = path.rsplit_once('/') {
            add_dir_with_parents(&mut state.dirs, parent);
        }
        state.files.insert(
            path.to_string(),
            FakeFile {
                contents: contents.as_bytes().to_vec(),
                mtime,
            },
        );
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.lock()
            .files
            .get(path)
            .map(|f| String::from_utf8_lossy(&f.contents).into_owned())
    }

    pub fn file_mtime(&self, path: &str) -> Option<u64> {
        self.lock().files.get(path).map(|f| f.mtime)
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.lock().dirs.contains(path)
    }
}

fn add_dir_with_parents(dirs: &mut BTreeSet<String>, path: &str) {
    let mut cur = String::new();
    for seg in path.split('/').filter(|s| !s.is_empty()) {
        cur.push('/');
        cur.push_str(seg);
        dirs.insert(cur.clone());
    }
}

fn unquote(arg: &str) -> String {
    arg.trim().trim_matches('\'').to_string()
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn missing(path: &str) -> AppError {
    AppError::transfer(format!("no such file: {path}"))
}

fn mtime_of(path: &Path) -> AppResult<u64> {
    let meta = fs::metadata(path).map_err(|err| AppError::transfer(err.to_string()))?;
    Ok(meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or_default())
}

#[async_trait]
impl Connector for FakeRemote {
    async fn connect(&self, _credentials: &Credentials) -> AppResult<Box<dyn Connection>> {
        let mut state = self.lock();
        if state.reject_auth {
            return Err(AppError::with_message(
                AppErrorKind::Authentication,
                codes::AUTHENTICATION_FAILURE,
                "ssh connect failed: authentication_failure",
            ));
        }
        state.connects += 1;
        let id = state.connects;
        state.live_connection = Some(id);
        Ok(Box::new(FakeConnection {
            remote: self.clone(),
            id,
        }))
    }
}

struct FakeConnection {
    remote: FakeRemote,
    id: usize,
}

#[async_trait]
impl Connection for FakeConnection {
    fn is_alive(&self) -> bool {
        self.remote.lock().live_connection == Some(self.id)
    }

    async fn exec(&self, command: &str) -> AppResult<CommandOutput> {
        let mut state = self.remote.lock();
        state.commands.push(command.to_string());
        if let Some((_, queue)) = state
            .responses
            .iter_mut()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
        {
            let output = if queue.len() > 1 {
                queue.remove(0)
            } else {
                queue[0].clone()
            };
            return Ok(output);
        }
        if let Some(path) = command.strip_prefix("mkdir -p ") {
            add_dir_with_parents(&mut state.dirs, &unquote(path));
        } else if let Some(path) = command.strip_prefix("rm -rf ") {
            let path = unquote(path);
            let nested = format!("{path}/");
            state.dirs.retain(|d| *d != path && !d.starts_with(&nested));
            state.files.retain(|f, _| !f.starts_with(&nested));
        }
        Ok(CommandOutput::default())
    }

    async fn open_file_channel(&self) -> AppResult<Box<dyn FileChannel>> {
        self.remote.lock().file_channel_opens += 1;
        Ok(Box::new(FakeFileChannel {
            remote: self.remote.clone(),
        }))
    }

    async fn disconnect(&self) {
        let mut state = self.remote.lock();
        if state.live_connection == Some(self.id) {
            state.live_connection = None;
        }
    }
}

struct FakeFileChannel {
    remote: FakeRemote,
}

#[async_trait]
impl FileChannel for FakeFileChannel {
    async fn get(&self, remote_path: &str, local_path: &Path) -> AppResult<()> {
        let file = {
            let mut state = self.remote.lock();
            state.gets += 1;
            state.files.get(remote_path).cloned().ok_or_else(|| missing(remote_path))?
        };
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::transfer(err.to_string()))?;
        }
        fs::write(local_path, &file.contents).map_err(|err| AppError::transfer(err.to_string()))?;
        let handle = fs::File::options()
            .write(true)
            .open(local_path)
            .map_err(|err| AppError::transfer(err.to_string()))?;
        handle
            .set_modified(UNIX_EPOCH + Duration::from_secs(file.mtime))
            .map_err(|err| AppError::transfer(err.to_string()))
    }

    async fn put(&self, local_path: &Path, remote_path: &str) -> AppResult<()> {
        let contents = fs::read(local_path).map_err(|err| AppError::transfer(err.to_string()))?;
        let mtime = mtime_of(local_path)?;
        let mut state = self.remote.lock();
        if !state.dirs.contains(parent_of(remote_path)) {
            return Err(missing(parent_of(remote_path)));
        }
        state.puts += 1;
        state
            .files
            .insert(remote_path.to_string(), FakeFile { contents, mtime });
        Ok(())
    }

    async fn write(&self, remote_path: &str, contents: &[u8]) -> AppResult<()> {
        let mut state = self.remote.lock();
        if !state.dirs.contains(parent_of(remote_path)) {
            return Err(missing(parent_of(remote_path)));
        }
        state.files.insert(
            remote_path.to_string(),
            FakeFile {
                contents: contents.to_vec(),
                mtime: REMOTE_WRITE_MTIME,
            },
        );
        Ok(())
    }

    async fn read_to_string(&self, remote_path: &str) -> AppResult<String> {
        self.remote
            .file(remote_path)
            .ok_or_else(|| missing(remote_path))
    }

    async fn list_dir(&self, remote_dir: &str) -> AppResult<Vec<String>> {
        Ok(self.stat_dir(remote_dir).await?.into_keys().collect())
    }

    async fn stat(&self, remote_path: &str) -> AppResult<RemoteStat> {
        let state = self.remote.lock();
        if let Some(file) = state.files.get(remote_path) {
            return Ok(RemoteStat {
                size: Some(file.contents.len() as u64),
                mtime: Some(file.mtime),
            });
        }
        if state.dirs.contains(remote_path) {
            return Ok(RemoteStat::default());
        }
        Err(missing(remote_path))
    }

    async fn stat_dir(&self, remote_dir: &str) -> AppResult<BTreeMap<String, RemoteStat>> {
        let state = self.remote.lock();
        let dir = remote_dir.trim_end_matches('/');
        if !state.dirs.contains(dir) {
            return Err(missing(remote_dir));
        }
        Ok(state
            .files
            .iter()
            .filter(|(path, _)| parent_of(path) == dir)
            .map(|(path, file)| {
                let name = path.rsplit('/').next().unwrap_or_default().to_string();
                let stat = RemoteStat {
                    size: Some(file.contents.len() as u64),
                    mtime: Some(file.mtime),
                };
                (name, stat)
            })
            .collect())
    }
}
