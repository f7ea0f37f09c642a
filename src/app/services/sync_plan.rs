// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Transfer planning for data synchronization.
//!
//! Decides which files need to move between a source file set and a
//! destination snapshot. It does not perform any network or filesystem
//! operations, so uploads and downloads share the same rules with the roles
//! of source and destination swapped.

use std::collections::BTreeMap;

/// How existing destination files are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncPolicy {
    /// Replace files that already exist at the destination.
    pub overwrite: bool,
    /// With `overwrite`, only replace when the source is strictly newer.
    pub new_only: bool,
}

impl SyncPolicy {
    pub fn new(overwrite: bool, new_only: bool) -> Self {
        Self {
            overwrite,
            new_only,
        }
    }
}

/// Whether one file must be transferred.
///
/// `destination` is `None` when the file is absent at the destination, and
/// `Some(mtime)` otherwise. Unknown modification times never count as
/// "not newer", so a file with missing metadata is transferred when
/// `new_only` applies.
pub fn needs_transfer(
    source_mtime: Option<u64>,
    destination: Option<Option<u64>>,
    policy: SyncPolicy,
) -> bool {
    let Some(dest_mtime) = destination else {
        return true;
    };
    if !policy.overwrite {
        return false;
    }
    if !policy.new_only {
        return true;
    }
    match (source_mtime, dest_mtime) {
        (Some(src), Some(dst)) => src > dst,
        _ => true,
    }
}

/// Names of the source files that must be transferred, in source order.
pub fn plan_transfers<'a, I>(
    sources: I,
    destination: &BTreeMap<String, Option<u64>>,
    policy: SyncPolicy,
) -> Vec<String>
where
    I: IntoIterator<Item = (&'a str, Option<u64>)>,
{
    sources
        .into_iter()
        .filter(|(name, mtime)| needs_transfer(*mtime, destination.get(*name).copied(), policy))
        .map(|(name, _)| name.to_string())
        .collect()
}
