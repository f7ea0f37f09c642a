// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Batch-scheduler backends.
//!
//! A backend turns queue settings into script directives, builds the
//! submit/status/cancel command lines and parses what the scheduler prints
//! back. Tasks only talk to the trait, so adding a scheduler means adding an
//! implementation here.

use crate::app::errors::AppResult;
use crate::app::types::{JobState, QueueSettings};

pub mod slurm;

pub use slurm::Slurm;

pub trait QueueBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// One directive line per setting, in the settings' insertion order.
    fn render_directives(&self, settings: &QueueSettings) -> Vec<String>;

    fn submit_command_for(&self, script_path: &str) -> String;
    fn cancel_command_for(&self, job_id: &str) -> String;
    fn status_query_command(&self, job_id: &str) -> String;

    /// Lists every job of `user`.
    fn queue_listing_command(&self, user: &str) -> String;

    fn parse_submitted_job_id(&self, submit_stdout: &str) -> AppResult<String>;
    fn parse_status_line(&self, query_stdout: &str) -> JobState;
}
