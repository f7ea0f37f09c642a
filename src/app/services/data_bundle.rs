// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Named file manifests with modification-time metadata.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::app::errors::{AppError, AppResult};
use crate::app::types::RemoteStat;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleEntry {
    pub path: PathBuf,
    /// Seconds since the Unix epoch.
    pub mtime: Option<u64>,
    pub size: Option<u64>,
}

/// A set of files keyed by base name. Names are unique: adding a file whose
/// name is already present replaces the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBundle {
    id: String,
    remote: bool,
    files: BTreeMap<String, BundleEntry>,
}

/// Serializable form of a bundle, embedded in persisted task state.
/// Only names and paths survive; stats are re-read on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRecord {
    pub id: String,
    pub remote: bool,
    pub files: BTreeMap<String, String>,
}

impl DataBundle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            remote: false,
            files: BTreeMap::new(),
        }
    }

    /// Bundle describing files on the remote host. Entries come from remote
    /// listings only and never carry local metadata.
    pub fn remote(id: impl Into<String>) -> Self {
        Self {
            remote: true,
            ..Self::new(id)
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// Adds or refreshes one file. For local bundles the current size and
    /// mtime are captured.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> AppResult<()> {
        let path = path.as_ref();
        let name = file_name_of(path)?;
        let entry = if self.remote {
            BundleEntry {
                path: path.to_path_buf(),
                ..Default::default()
            }
        } else {
            local_entry(path)?
        };
        self.files.insert(name, entry);
        Ok(())
    }

    /// Replaces the whole file set with the regular files directly inside `dir`.
    pub fn add_directory(&mut self, dir: impl AsRef<Path>) -> AppResult<()> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|err| {
            AppError::local_io(format!("failed to list {}: {err}", dir.display()))
        })?;
        let mut files = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                AppError::local_io(format!("failed to list {}: {err}", dir.display()))
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = file_name_of(&path)?;
            files.insert(name, local_entry(&path)?);
        }
        self.files = files;
        Ok(())
    }

    pub fn add_remote_entry(&mut self, name: impl Into<String>, path: impl Into<PathBuf>, stat: RemoteStat) {
        self.files.insert(
            name.into(),
            BundleEntry {
                path: path.into(),
                mtime: stat.mtime,
                size: stat.size,
            },
        );
    }

    /// Re-reads size and mtime for local entries. Entries whose file has
    /// disappeared keep empty stats.
    pub fn refresh_local_stats(&mut self) {
        if self.remote {
            return;
        }
        for entry in self.files.values_mut() {
            match local_entry(&entry.path) {
                Ok(fresh) => *entry = fresh,
                Err(err) => {
                    tracing::warn!("{err}");
                    entry.mtime = None;
                    entry.size = None;
                }
            }
        }
    }

    pub fn file_names(&self) -> BTreeSet<String> {
        self.files.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&BundleEntry> {
        self.files.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BundleEntry)> {
        self.files.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Name to mtime view, as consumed by transfer planning.
    pub fn mtimes(&self) -> BTreeMap<String, Option<u64>> {
        self.files
            .iter()
            .map(|(name, entry)| (name.clone(), entry.mtime))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn to_transport(&self) -> BundleRecord {
        BundleRecord {
            id: self.id.clone(),
            remote: self.remote,
            files: self
                .files
                .iter()
                .map(|(name, entry)| (name.clone(), entry.path.to_string_lossy().into_owned()))
                .collect(),
        }
    }

    pub fn from_transport(record: BundleRecord) -> Self {
        let files = record
            .files
            .into_iter()
            .map(|(name, path)| {
                (
                    name,
                    BundleEntry {
                        path: PathBuf::from(path),
                        ..Default::default()
                    },
                )
            })
            .collect();
        Self {
            id: record.id,
            remote: record.remote,
            files,
        }
    }
}

fn file_name_of(path: &Path) -> AppResult<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| AppError::invalid_argument(format!("{} has no file name", path.display())))
}

fn local_entry(path: &Path) -> AppResult<BundleEntry> {
    let meta = fs::metadata(path)
        .map_err(|err| AppError::local_io(format!("failed to stat {}: {err}", path.display())))?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|age| age.as_secs());
    Ok(BundleEntry {
        path: path.to_path_buf(),
        mtime,
        size: Some(meta.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn touch(path: &Path, contents: &str, mtime: u64) {
        fs::write(path, contents).unwrap();
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(mtime))
            .unwrap();
    }

    #[test]
    fn re_adding_a_name_keeps_one_entry_with_latest_metadata() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("one");
        let second = dir.path().join("two");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        touch(&first.join("input.pdb"), "a", 100);
        touch(&second.join("input.pdb"), "bbbb", 200);

        let mut bundle = DataBundle::new("local");
        bundle.add_file(first.join("input.pdb")).unwrap();
        bundle.add_file(second.join("input.pdb")).unwrap();

        assert_eq!(bundle.len(), 1);
        let entry = bundle.get("input.pdb").unwrap();
        assert_eq!(entry.path, second.join("input.pdb"));
        assert_eq!(entry.mtime, Some(200));
        assert_eq!(entry.size, Some(4));
    }

    #[test]
    fn add_directory_replaces_contents_with_regular_children() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.txt"), "a", 10);
        touch(&dir.path().join("b.txt"), "b", 5);
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested").join("c.txt"), "c", 1);

        let mut bundle = DataBundle::new("local");
        bundle.add_remote_entry("stale", "/nowhere/stale", RemoteStat::default());
        bundle.add_directory(dir.path()).unwrap();

        let names: Vec<String> = bundle.file_names().into_iter().collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert_eq!(bundle.get("a.txt").unwrap().mtime, Some(10));
    }

    #[test]
    fn unreadable_directory_is_a_local_error() {
        let dir = TempDir::new().unwrap();
        let mut bundle = DataBundle::new("local");
        let err = bundle.add_directory(dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), crate::app::errors::AppErrorKind::LocalIo);
    }

    #[test]
    fn transport_form_drops_stats_and_refresh_restores_them() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.txt"), "abc", 42);
        let mut bundle = DataBundle::new("local");
        bundle.add_directory(dir.path()).unwrap();

        let mut restored = DataBundle::from_transport(bundle.to_transport());
        assert_eq!(restored.file_names(), bundle.file_names());
        assert_eq!(restored.get("a.txt").unwrap().mtime, None);

        restored.refresh_local_stats();
        assert_eq!(restored.get("a.txt").unwrap().mtime, Some(42));
    }

    #[test]
    fn remote_bundles_do_not_stat_locally() {
        let mut bundle = DataBundle::remote("remote");
        bundle.add_file("/scratch/task_1/out.log").unwrap();
        let entry = bundle.get("out.log").unwrap();
        assert_eq!(entry.mtime, None);
        assert!(bundle.is_remote());
    }
}
