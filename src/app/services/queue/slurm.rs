// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::services::script::sh_escape;
use crate::app::types::{JobState, QueueSettings};

use super::QueueBackend;

const DIRECTIVE_PREFIX: &str = "#SBATCH ";

/// Setting name to sbatch option prefix. Unlisted settings render as
/// `--<name>=<value>`.
const SLURM_OPTIONS: &[(&str, &str)] = &[
    ("job", "-J "),
    ("stdout", "-o "),
    ("stderr", "-e "),
    ("working_dir", "-D "),
    ("ntasks", "--ntasks="),
    ("cpus-per-task", "--cpus-per-task="),
    ("ntasks-per-node", "--ntasks-per-node="),
    ("nodes", "--nodes="),
    ("time", "-t "),
    ("partition", "-p "),
    ("qos", "--qos="),
    ("account", "-A "),
    ("gres", "--gres="),
    ("gpus", "--gpus="),
    ("mem", "--mem="),
    ("constraint", "-C "),
];

/// Settings rendered as bare switches; a false value drops the line.
const SLURM_FLAGS: &[(&str, &str)] = &[("exclusive", "--exclusive")];

/// `squeue -h` prints JOBID PARTITION NAME USER ST TIME NODES NODELIST.
const STATE_COLUMN: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct Slurm;

impl Slurm {
    fn directive(key: &str, value: &str) -> Option<String> {
        if let Some((_, flag)) = SLURM_FLAGS.iter().find(|(name, _)| *name == key) {
            let enabled = !matches!(value.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no");
            return enabled.then(|| format!("{DIRECTIVE_PREFIX}{flag}"));
        }
        let line = match SLURM_OPTIONS.iter().find(|(name, _)| *name == key) {
            Some((_, option)) => format!("{DIRECTIVE_PREFIX}{option}{value}"),
            None => format!("{DIRECTIVE_PREFIX}--{key}={value}"),
        };
        Some(line)
    }
}

impl QueueBackend for Slurm {
    fn name(&self) -> &'static str {
        "slurm"
    }

    fn render_directives(&self, settings: &QueueSettings) -> Vec<String> {
        settings
            .iter()
            .filter_map(|(key, value)| Self::directive(key, value))
            .collect()
    }

    fn submit_command_for(&self, script_path: &str) -> String {
        format!("sbatch {}", sh_escape(script_path))
    }

    fn cancel_command_for(&self, job_id: &str) -> String {
        format!("scancel {job_id}")
    }

    fn status_query_command(&self, job_id: &str) -> String {
        format!("squeue -h -j {job_id}")
    }

    fn queue_listing_command(&self, user: &str) -> String {
        format!("squeue -u {}", sh_escape(user))
    }

    fn parse_submitted_job_id(&self, submit_stdout: &str) -> AppResult<String> {
        let line = submit_stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["Submitted", "batch", "job", id] if id.chars().all(|c| c.is_ascii_digit()) => {
                Ok(id.to_string())
            }
            _ => Err(AppError::with_message(
                AppErrorKind::SubmissionParse,
                codes::SUBMISSION_PARSE_ERROR,
                format!("unexpected sbatch output: '{}'", submit_stdout.trim()),
            )),
        }
    }

    fn parse_status_line(&self, query_stdout: &str) -> JobState {
        let Some(line) = query_stdout.lines().map(str::trim).find(|l| !l.is_empty()) else {
            return JobState::Gone;
        };
        let code = line.split_whitespace().nth(STATE_COLUMN).unwrap_or_default();
        match code {
            "R" => JobState::Running,
            "CG" => JobState::Completing,
            "PD" => JobState::Pending,
            other => JobState::Unrecognized(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squeue_line(state: &str) -> String {
        format!("  12345      main  biobb_md    alice  {state}       0:42      1 node017\n")
    }

    #[test]
    fn directives_follow_settings_order_and_table() {
        let settings: QueueSettings = [
            ("job", "md_run"),
            ("cpus-per-task", "40"),
            ("nodes", "1"),
            ("time", "01:00:00"),
            ("exclusive", "true"),
            ("mail-type", "END"),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            Slurm.render_directives(&settings),
            vec![
                "#SBATCH -J md_run",
                "#SBATCH --cpus-per-task=40",
                "#SBATCH --nodes=1",
                "#SBATCH -t 01:00:00",
                "#SBATCH --exclusive",
                "#SBATCH --mail-type=END",
            ]
        );
    }

    #[test]
    fn disabled_flag_is_omitted() {
        let settings: QueueSettings = [("exclusive", "false")].into_iter().collect();
        assert!(Slurm.render_directives(&settings).is_empty());
    }

    #[test]
    fn parses_submitted_job_id() {
        let id = Slurm
            .parse_submitted_job_id("Submitted batch job 12345\n")
            .unwrap();
        assert_eq!(id, "12345");
    }

    #[test]
    fn malformed_submission_output_is_an_error() {
        for output in ["", "sbatch: error: invalid partition", "Submitted batch job", "Submitted batch job x1"] {
            let err = Slurm.parse_submitted_job_id(output).unwrap_err();
            assert_eq!(err.kind(), AppErrorKind::SubmissionParse, "{output}");
        }
    }

    #[test]
    fn status_codes_map_to_job_states() {
        assert_eq!(Slurm.parse_status_line(&squeue_line("R")), JobState::Running);
        assert_eq!(Slurm.parse_status_line(&squeue_line("PD")), JobState::Pending);
        assert_eq!(Slurm.parse_status_line(&squeue_line("CG")), JobState::Completing);
        assert_eq!(Slurm.parse_status_line(""), JobState::Gone);
        assert_eq!(Slurm.parse_status_line("\n  \n"), JobState::Gone);
        assert_eq!(
            Slurm.parse_status_line(&squeue_line("S")),
            JobState::Unrecognized("S".to_string())
        );
    }

    #[test]
    fn commands_target_job_and_script() {
        assert_eq!(Slurm.submit_command_for("/scratch/task_1/run_script.sh"), "sbatch '/scratch/task_1/run_script.sh'");
        assert_eq!(Slurm.status_query_command("77"), "squeue -h -j 77");
        assert_eq!(Slurm.cancel_command_for("77"), "scancel 77");
        assert_eq!(Slurm.queue_listing_command("alice"), "squeue -u 'alice'");
    }
}
