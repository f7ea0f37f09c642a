// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod credentials;
pub mod data_bundle;
pub mod host_config;
pub mod persistence;
pub mod queue;
pub mod script;
pub mod session;
pub mod sync_plan;
