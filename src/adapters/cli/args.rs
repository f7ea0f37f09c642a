// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::app::services::persistence::Format;
use crate::config::Overrides;

#[derive(Parser, Debug)]
#[command(name = "remote-task", version, about, long_about = None)]
pub struct Cli {
    #[arg(
        short,
        long,
        global = true,
        value_name = "PATH",
        help = "Path to a TOML config file. When omitted, REMOTE_TASK_CONFIG_PATH is used if set, otherwise the default config file location if available."
    )]
    pub config: Option<PathBuf>,
    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Credentials file to use instead of the configured one.
    #[arg(long, global = true, value_name = "PATH")]
    pub credentials: Option<PathBuf>,
    /// Host configuration (JSON or TOML) to use instead of the configured one.
    #[arg(long, global = true, value_name = "PATH")]
    pub host_config: Option<PathBuf>,
    /// Passphrase protecting the stored private key.
    #[arg(long, global = true)]
    pub passphrase: Option<String>,
    /// Task state encoding.
    #[arg(long, global = true, value_name = "json|binary")]
    pub format: Option<Format>,
    #[command(subcommand)]
    pub cmd: Cmd,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            credentials_path: self.credentials.clone(),
            host_config_path: self.host_config.clone(),
            poll_interval_secs: None,
            state_format: self.format,
            verbose: self.verbose.then_some(true),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Create or inspect stored credentials.
    Credentials(CredentialsArgs),
    /// Stage input data, render the queue script and submit it.
    Submit(SubmitArgs),
    /// Query (or poll) the scheduler for the task's job.
    Status(StatusArgs),
    /// Cancel the task's job.
    Cancel(CancelArgs),
    /// Print the job's stdout and stderr logs.
    FetchLogs(TaskFileArgs),
    /// Download output files from the remote working directory.
    FetchData(FetchDataArgs),
    /// Upload input data without submitting.
    PutData(PutDataArgs),
    /// Remove the task's remote working directory.
    Clean(TaskFileArgs),
    /// List the user's jobs in the scheduler queue.
    Queue,
    /// Run a command on the remote host.
    Exec(ExecArgs),
    /// Run a single file operation on the remote host.
    Transfer(TransferArgs),
    /// Summarize the loaded host configuration.
    HostInfo,
}

#[derive(Args, Debug)]
pub struct CredentialsArgs {
    #[command(subcommand)]
    pub cmd: CredentialsCmd,
}

#[derive(Subcommand, Debug)]
pub enum CredentialsCmd {
    /// Generate a key pair and store credentials for a host.
    Create(CreateCredentialsArgs),
    /// Print the public key in authorized_keys format.
    Pubkey,
    /// Print the private key in OpenSSH format.
    Private,
}

#[derive(Args, Debug)]
pub struct CreateCredentialsArgs {
    #[arg(long)]
    pub host: String,
    #[arg(long)]
    pub user: String,
    #[arg(long, default_value_t = 22)]
    pub port: u16,
    /// RSA key length.
    #[arg(long, default_value_t = 4096)]
    pub bits: usize,
    /// Generate an Ed25519 key instead of RSA.
    #[arg(long)]
    pub ed25519: bool,
    /// Never fall back to the keys in ~/.ssh.
    #[arg(long)]
    pub no_local_keys: bool,
    /// Also write the public key to this file.
    #[arg(long, value_name = "PATH")]
    pub pubkey_path: Option<PathBuf>,
    /// Also write the private key to this file.
    #[arg(long, value_name = "PATH")]
    pub privkey_path: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TaskFileArgs {
    /// File holding the task's persisted state.
    #[arg(long, value_name = "PATH")]
    pub task_file: PathBuf,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct SyncArgs {
    /// Replace files that already exist at the destination.
    #[arg(long)]
    pub overwrite: bool,
    /// With --overwrite, only replace files older than the source.
    #[arg(long)]
    pub new_only: bool,
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub task: TaskFileArgs,
    /// Local directory with the input files.
    #[arg(long, value_name = "DIR")]
    pub local_data: PathBuf,
    /// Remote directory under which the task's working directory is created.
    #[arg(long, value_name = "PATH")]
    pub remote_base: String,
    /// Script file, or inline script text containing the #script marker.
    #[arg(long)]
    pub script: String,
    #[arg(long, value_name = "NAME")]
    pub queue_preset: Option<String>,
    /// Module sets to load, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub modules: Vec<String>,
    #[arg(long)]
    pub job_name: Option<String>,
    /// Apply the host's debug queue overlay.
    #[arg(long)]
    pub debug: bool,
    /// Conda environment activated before the payload.
    #[arg(long, value_name = "NAME")]
    pub env: Option<String>,
    /// Queue directive override (repeatable).
    #[arg(long = "set", value_name = "KEY=VALUE", action = clap::ArgAction::Append)]
    pub directives: Vec<String>,
    #[arg(long)]
    pub cores: Option<u32>,
    #[arg(long)]
    pub nodes: Option<u32>,
    #[arg(long)]
    pub gpus: Option<u32>,
    #[arg(long, value_name = "HH:MM:SS")]
    pub walltime: Option<String>,
    #[arg(long)]
    pub queue: Option<String>,
    /// Wait for the job, checking every SECS (the configured interval when no value is given).
    #[arg(long, value_name = "SECS")]
    pub poll: Option<Option<u64>>,
    #[command(flatten)]
    pub sync: SyncArgs,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub task: TaskFileArgs,
    /// Keep checking every SECS until the job ends (the configured interval when no value is given).
    #[arg(long, value_name = "SECS")]
    pub poll: Option<Option<u64>>,
    /// Stop polling after SECS.
    #[arg(long, value_name = "SECS", requires = "poll")]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct CancelArgs {
    #[command(flatten)]
    pub task: TaskFileArgs,
    /// Also remove the remote working directory.
    #[arg(long)]
    pub remove_data: bool,
}

#[derive(Args, Debug)]
pub struct FetchDataArgs {
    #[command(flatten)]
    pub task: TaskFileArgs,
    /// Local output directory; defaults to the previously used one.
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,
    /// Only these file names, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub files: Option<Vec<String>>,
    #[command(flatten)]
    pub sync: SyncArgs,
}

#[derive(Args, Debug)]
pub struct PutDataArgs {
    #[command(flatten)]
    pub task: TaskFileArgs,
    #[arg(long, value_name = "DIR")]
    pub local_data: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    pub remote_base: Option<String>,
    #[command(flatten)]
    pub sync: SyncArgs,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Command words, joined with single spaces.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct TransferArgs {
    /// get, put, create, file, listdir, stat or statdir.
    pub op: String,
    #[arg(short = 'i', long = "input", default_value = "")]
    pub source: String,
    #[arg(short = 'o', long = "output", default_value = "")]
    pub dest: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_parses_lists_and_optional_poll() {
        let cli = Cli::try_parse_from([
            "remote-task",
            "submit",
            "--task-file",
            "task.json",
            "--local-data",
            "in",
            "--remote-base",
            "/scratch/alice",
            "--script",
            "run.sh",
            "--modules",
            "biobb,gromacs",
            "--set",
            "qos=debug",
            "--poll",
        ])
        .unwrap();
        let Cmd::Submit(args) = cli.cmd else {
            panic!("expected submit");
        };
        assert_eq!(args.modules, vec!["biobb", "gromacs"]);
        assert_eq!(args.directives, vec!["qos=debug"]);
        assert_eq!(args.poll, Some(None));
        assert!(!args.sync.overwrite);
    }

    #[test]
    fn global_options_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "remote-task",
            "status",
            "--task-file",
            "t.bin",
            "--format",
            "binary",
            "--poll",
            "10",
            "--timeout",
            "60",
        ])
        .unwrap();
        assert_eq!(cli.format, Some(Format::Binary));
        let Cmd::Status(args) = cli.cmd else {
            panic!("expected status");
        };
        assert_eq!(args.poll, Some(Some(10)));
        assert_eq!(args.timeout, Some(60));
    }

    #[test]
    fn exec_keeps_hyphenated_words() {
        let cli = Cli::try_parse_from(["remote-task", "exec", "squeue", "-u", "alice"]).unwrap();
        let Cmd::Exec(args) = cli.cmd else {
            panic!("expected exec");
        };
        assert_eq!(args.command, vec!["squeue", "-u", "alice"]);
    }
}
