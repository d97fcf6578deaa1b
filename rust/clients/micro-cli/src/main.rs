/*
 Fleet tooling for NATS micro services.

// This binary is responsible for:
  - sending point-to-point requests to service endpoints
  - pinging services across the fleet
  - fetching service information and statistics
*/

mod commands;
pub mod micro_cli;

use clap::Parser;
use dotenv::dotenv;
use micro_utils::connect::{connect, ConnectArgs, Credentials};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MicroCliError {
    #[error("NATS error: {0}")]
    AsyncNats(#[from] async_nats::Error),
    #[error("Command failed: {0:#}")]
    Command(anyhow::Error),
}

impl From<anyhow::Error> for MicroCliError {
    fn from(err: anyhow::Error) -> Self {
        Self::Command(err)
    }
}

#[tokio::main]
async fn main() -> Result<(), MicroCliError> {
    dotenv().ok();
    env_logger::init();

    let cli = micro_cli::Root::parse();

    let mut args = ConnectArgs::new(&cli.connect.server)
        .name("micro-cli")
        .max_reconnects(Some(cli.connect.max_reconnect))
        .reconnect_delay(Duration::from_secs_f64(cli.connect.reconnect_delay));
    if let (Some(username), Some(password)) = (&cli.connect.username, &cli.connect.password) {
        args = args.credentials(Credentials::Password(username.clone(), password.clone()));
    }
    if let Some(token) = &cli.connect.token {
        args = args.credentials(Credentials::Token(token.clone()));
    }

    let connection = connect(args).await?;
    let result = commands::dispatch(connection.client.clone(), cli.command).await;
    if let Err(err) = connection.close().await {
        log::warn!("failed to drain NATS client: {err}");
    }
    result?;
    Ok(())
}
