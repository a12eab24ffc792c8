// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use multissh::{
    cli::Cli,
    config::Config,
    executor::{ConsoleSink, Dispatcher, OutputSink},
    host::parse_host_list,
    ssh::{known_hosts::get_check_method, AuthContext, Credential, RusshProvider},
    utils::init_logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug, cli.format);

    let exit_code = run(cli).await?;
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config = Config::load_with_priority(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;

    let hosts =
        parse_host_list(&cli.nodes, cli.default_port(&config)).context("Invalid node list")?;

    let username = cli.username(&config);
    let key_path = cli.private_key(&config)?;
    let auth = AuthContext::new(username.as_str())
        .with_password(cli.password.as_deref())
        .with_key_path(key_path)
        .determine_method()
        .context("Failed to determine authentication method")?;
    tracing::debug!("authenticating as {} with {:?}", username, auth);

    let strict_mode = cli.strict_mode(&config);
    let credential = Credential::new(username, auth).with_server_check(get_check_method(strict_mode));

    let sink: Arc<dyn OutputSink> = if cli.no_prefix {
        Arc::new(ConsoleSink::new().without_prefix())
    } else {
        Arc::new(ConsoleSink::new())
    };

    let cancel = CancellationToken::new();
    let dispatcher = Dispatcher::new(Arc::new(RusshProvider::new(credential)), sink)
        .with_connect_timeout(cli.connect_timeout(&config))
        .with_command_timeout(cli.command_timeout(&config))
        .with_max_parallel(cli.parallel(&config))
        .with_cancellation_token(cancel.clone());

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling outstanding hosts");
            interrupt.cancel();
        }
    });

    let summary = dispatcher.run(&hosts, &cli.command).await?;
    summary.print_summary();

    Ok(summary.exit_code())
}
