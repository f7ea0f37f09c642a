// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Client for driving one batch job on a remote HPC login node over SSH:
//! stage input data, render and submit a queue script, follow the job,
//! retrieve its output and persist the task between runs.

pub mod adapters;
pub mod app;
pub mod config;
pub mod logging;
