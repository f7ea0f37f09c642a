// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio_util::sync::CancellationToken;

use crate::adapters::ssh::{RusshConnector, SshOptions};
use crate::app::errors::AppError;
use crate::app::services::credentials::{Credentials, DEFAULT_KEY_SUFFIX, KeyAlgorithm};
use crate::app::services::host_config::{HostConfig, ResourceRequest};
use crate::app::services::queue::Slurm;
use crate::app::services::script::ScriptSource;
use crate::app::services::session::RemoteSessionFactory;
use crate::app::services::sync_plan::SyncPolicy;
use crate::app::task::{PollOptions, ScriptRequest};
use crate::app::types::{QueueSettings, TransferOp, TransferOutcome};
use crate::app::usecases::{
    CancelJobInput, JobStatusInput, PutDataInput, RetrieveDataInput, SubmitJobInput, UseCases,
};
use crate::config::{self, Config};

use super::args::{Cli, Cmd, CreateCredentialsArgs, CredentialsCmd, SyncArgs};

fn app_error(err: AppError) -> anyhow::Error {
    let code = err.code();
    anyhow::Error::new(err).context(code)
}

impl From<SyncArgs> for SyncPolicy {
    fn from(args: SyncArgs) -> Self {
        SyncPolicy::new(args.overwrite, args.new_only)
    }
}

fn parse_directives(raw: &[String]) -> Result<QueueSettings> {
    raw.iter()
        .map(|item| {
            item.split_once('=')
                .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
                .filter(|(key, _)| !key.is_empty())
                .ok_or_else(|| anyhow!("invalid directive '{item}', expected KEY=VALUE"))
        })
        .collect()
}

fn poll_options(
    poll: Option<Option<u64>>,
    timeout: Option<u64>,
    config: &Config,
    cancel: &CancellationToken,
) -> Option<PollOptions> {
    poll.map(|secs| PollOptions {
        interval: Duration::from_secs(secs.unwrap_or(config.poll_interval_secs).max(1)),
        timeout: timeout.map(Duration::from_secs),
        cancel: cancel.clone(),
    })
}

fn build_usecases(passphrase: Option<&str>, config: &Config) -> Result<UseCases> {
    let credentials = Credentials::load(&config.credentials_path, passphrase)
        .map_err(app_error)
        .with_context(|| {
            format!(
                "loading credentials from {}; create them with `remote-task credentials create`",
                config.credentials_path.display()
            )
        })?;
    let host_config = config
        .host_config_path
        .as_deref()
        .map(HostConfig::load)
        .transpose()
        .map_err(app_error)?;
    let connector = RusshConnector::new(SshOptions {
        known_hosts: config.known_hosts_path.clone(),
        ..SshOptions::default()
    });
    Ok(UseCases::new(
        Arc::new(Slurm),
        Arc::new(RemoteSessionFactory::new(Arc::new(connector))),
        credentials,
        host_config,
        config.state_format,
    ))
}

fn create_credentials(
    args: CreateCredentialsArgs,
    passphrase: Option<&str>,
    config: &Config,
) -> Result<()> {
    let algorithm = if args.ed25519 {
        KeyAlgorithm::Ed25519
    } else {
        KeyAlgorithm::Rsa { bits: args.bits }
    };
    let credentials = Credentials::generate(args.host, args.user, algorithm)
        .map_err(app_error)?
        .with_port(args.port)
        .with_local_key_fallback(!args.no_local_keys);
    config::ensure_parent_dir(&config.credentials_path)?;
    credentials
        .persist(&config.credentials_path, true, passphrase)
        .map_err(app_error)?;
    tracing::info!(
        "credentials stored in {}",
        config.credentials_path.display()
    );
    if let Some(path) = &args.pubkey_path {
        credentials.write_public_key(path).map_err(app_error)?;
    }
    if let Some(path) = &args.privkey_path {
        credentials
            .write_private_key(path, passphrase)
            .map_err(app_error)?;
    }
    print!(
        "{}",
        credentials
            .public_key_line(DEFAULT_KEY_SUFFIX)
            .map_err(app_error)?
    );
    Ok(())
}

fn print_outcome(outcome: TransferOutcome) -> Result<()> {
    match outcome {
        TransferOutcome::Done => {}
        TransferOutcome::Contents(text) => print!("{text}"),
        TransferOutcome::Names(names) => {
            for name in names {
                println!("{name}");
            }
        }
        TransferOutcome::Stat(stat) => println!(
            "size={} mtime={}",
            stat.size.map_or_else(|| "-".to_string(), |s| s.to_string()),
            stat.mtime.map_or_else(|| "-".to_string(), |m| m.to_string())
        ),
        TransferOutcome::Stats(stats) => {
            for (name, stat) in stats {
                println!(
                    "{name}\t{}\t{}",
                    stat.size.unwrap_or_default(),
                    stat.mtime.unwrap_or_default()
                );
            }
        }
        TransferOutcome::Unsupported(op) => {
            anyhow::bail!("unsupported transfer operation '{op}'");
        }
    }
    Ok(())
}

fn credentials_command(cmd: CredentialsCmd, passphrase: Option<&str>, config: &Config) -> Result<()> {
    match cmd {
        CredentialsCmd::Create(args) => create_credentials(args, passphrase, config),
        CredentialsCmd::Pubkey => {
            let creds =
                Credentials::load(&config.credentials_path, passphrase).map_err(app_error)?;
            print!("{}", creds.public_key_line(DEFAULT_KEY_SUFFIX).map_err(app_error)?);
            Ok(())
        }
        CredentialsCmd::Private => {
            let creds =
                Credentials::load(&config.credentials_path, passphrase).map_err(app_error)?;
            print!("{}", creds.private_key_openssh().map_err(app_error)?);
            Ok(())
        }
    }
}

fn describe_host(host: &HostConfig) -> String {
    let mut out = String::new();
    if !host.description().is_empty() {
        out.push_str(&format!("description: {}\n", host.description()));
    }
    out.push_str(&format!("login hosts: {}\n", host.login_hosts().join(", ")));
    out.push_str(&format!("cores per node: {}\n", host.cores_per_node()));
    out.push_str(&format!("gpus per node: {}\n", host.gpus_per_node()));
    if let Some(command) = host.queues_command() {
        out.push_str(&format!("queues command: {command}\n"));
    }
    if let Some(path) = host.biobb_apps_path() {
        out.push_str(&format!("apps path: {path}\n"));
    }
    for (tool, flags) in host.cmd_settings() {
        let flags: Vec<String> = flags.iter().map(|(k, v)| format!("{k}={v}")).collect();
        out.push_str(&format!("command settings [{tool}]: {}\n", flags.join(" ")));
    }
    out
}

fn host_info(config: &Config) -> Result<()> {
    let path = config
        .host_config_path
        .as_deref()
        .ok_or_else(|| anyhow!("no host configuration; pass --host-config or set host_config_path"))?;
    let host = HostConfig::load(path).map_err(app_error)?;
    print!("{}", describe_host(&host));
    Ok(())
}

pub async fn run(cli: Cli, config: Config, cancel: CancellationToken) -> Result<()> {
    let Cli { cmd, passphrase, .. } = cli;
    let cmd = match cmd {
        Cmd::Credentials(args) => {
            return credentials_command(args.cmd, passphrase.as_deref(), &config);
        }
        Cmd::HostInfo => return host_info(&config),
        cmd => cmd,
    };

    let usecases = build_usecases(passphrase.as_deref(), &config)?;
    match cmd {
        Cmd::Credentials(_) | Cmd::HostInfo => Ok(()),
        Cmd::Submit(args) => {
            let mut script = ScriptRequest::new(ScriptSource::detect(&args.script));
            script.preset = args.queue_preset;
            script.overrides = parse_directives(&args.directives)?;
            script.job_name = args.job_name;
            script.debug = args.debug;
            script.module_sets = args.modules;
            script.environment = args.env;
            let wants_resources = args.cores.is_some()
                || args.nodes.is_some()
                || args.gpus.is_some()
                || args.walltime.is_some()
                || args.queue.is_some();
            let resources = wants_resources.then(|| ResourceRequest {
                cores: args.cores,
                nodes: args.nodes,
                gpus: args.gpus,
                walltime: args.walltime,
                queue: args.queue,
            });
            let job_id = usecases
                .submit_job(SubmitJobInput {
                    task_file: args.task.task_file,
                    local_data: args.local_data,
                    remote_base: args.remote_base,
                    script,
                    resources,
                    policy: args.sync.into(),
                    poll: poll_options(args.poll, None, &config, &cancel),
                })
                .await
                .map_err(app_error)?;
            println!("{job_id}");
            Ok(())
        }
        Cmd::Status(args) => {
            let status = usecases
                .job_status(JobStatusInput {
                    task_file: args.task.task_file,
                    poll: poll_options(args.poll, args.timeout, &config, &cancel),
                })
                .await
                .map_err(app_error)?;
            println!("{status}");
            Ok(())
        }
        Cmd::Cancel(args) => {
            let cancelled = usecases
                .cancel_job(CancelJobInput {
                    task_file: args.task.task_file,
                    remove_data: args.remove_data,
                })
                .await
                .map_err(app_error)?;
            if !cancelled {
                eprintln!("job was not running; nothing to cancel");
            }
            Ok(())
        }
        Cmd::FetchLogs(args) => {
            let logs = usecases
                .job_logs(&args.task_file)
                .await
                .map_err(app_error)?;
            println!("--- stdout ---");
            print!("{}", logs.stdout);
            println!("--- stderr ---");
            print!("{}", logs.stderr);
            Ok(())
        }
        Cmd::FetchData(args) => {
            let count = usecases
                .retrieve_data(RetrieveDataInput {
                    task_file: args.task.task_file,
                    output: args.output,
                    files: args.files,
                    policy: args.sync.into(),
                })
                .await
                .map_err(app_error)?;
            println!("{count} file(s) retrieved");
            Ok(())
        }
        Cmd::PutData(args) => {
            let count = usecases
                .put_data(PutDataInput {
                    task_file: args.task.task_file,
                    local_data: args.local_data,
                    remote_base: args.remote_base,
                    policy: args.sync.into(),
                })
                .await
                .map_err(app_error)?;
            println!("{count} file(s) uploaded");
            Ok(())
        }
        Cmd::Clean(args) => usecases
            .cleanup(&args.task_file)
            .await
            .map_err(app_error),
        Cmd::Queue => {
            let listing = usecases.queue().await.map_err(app_error)?;
            print!("{listing}");
            Ok(())
        }
        Cmd::Exec(args) => {
            let output = usecases
                .exec(args.command.into())
                .await
                .map_err(app_error)?;
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            if output.exit_code != 0 {
                anyhow::bail!("remote command exited with status {}", output.exit_code);
            }
            Ok(())
        }
        Cmd::Transfer(args) => {
            let Ok(op) = args.op.parse::<TransferOp>();
            let outcome = usecases
                .transfer(op, &args.source, &args.dest)
                .await
                .map_err(app_error)?;
            print_outcome(outcome)
        }
    }
}
