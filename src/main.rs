// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use clap::Parser;
use tokio_util::sync::CancellationToken;

use remote_task::adapters::cli::{self, Cli};
use remote_task::{config, logging};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config::LoadResult { config, report } =
        config::load_with_report(cli.config.clone(), cli.overrides())?;
    logging::init(config.verbose);
    report.log();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted; stopping after the current step");
                on_interrupt.cancel();
            }
        });
        cli::run(cli, config, cancel).await
    })
}
