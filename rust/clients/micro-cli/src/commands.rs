use crate::micro_cli::{CollectFlags, Command};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use micro_utils::client::{Client, DiscoverOpts};
use std::time::Duration;

pub async fn dispatch(client: async_nats::Client, command: Command) -> Result<()> {
    let client = Client::new(client);
    match command {
        Command::Request {
            subject,
            payload,
            timeout,
        } => request_command(&client, &subject, payload, timeout).await,
        Command::Ping { service, collect } => {
            discover_command(&client, Verb::Ping, service, collect).await
        }
        Command::Info { service, collect } => {
            discover_command(&client, Verb::Info, service, collect).await
        }
        Command::Stats { service, collect } => {
            discover_command(&client, Verb::Stats, service, collect).await
        }
    }
}

enum Verb {
    Ping,
    Info,
    Stats,
}

async fn request_command(
    client: &Client,
    subject: &str,
    payload: Option<String>,
    timeout: f64,
) -> Result<()> {
    let payload = Bytes::from(payload.unwrap_or_default().into_bytes());
    let response = client
        .request(subject, payload, None, Some(Duration::from_secs_f64(timeout)))
        .await
        .map_err(|err| anyhow!(err))?;
    println!("{}", String::from_utf8_lossy(&response.payload));
    Ok(())
}

async fn discover_command(
    client: &Client,
    verb: Verb,
    service: Option<String>,
    collect: CollectFlags,
) -> Result<()> {
    if let Some(instance_id) = &collect.instance {
        let service = service
            .as_deref()
            .ok_or_else(|| anyhow!("--instance requires a service name"))?;
        let instance = client.service(service).instance(instance_id);
        let timeout = collect.max_wait.map(Duration::from_secs_f64);
        let value = match verb {
            Verb::Ping => serde_json::to_value(instance.ping(timeout).await.map_err(|e| anyhow!(e))?)?,
            Verb::Info => serde_json::to_value(instance.info(timeout).await.map_err(|e| anyhow!(e))?)?,
            Verb::Stats => {
                serde_json::to_value(instance.stats(timeout).await.map_err(|e| anyhow!(e))?)?
            }
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let mut opts = DiscoverOpts::default();
    if let Some(max_wait) = collect.max_wait {
        opts = opts.max_wait(Duration::from_secs_f64(max_wait));
    }
    if let Some(max_count) = collect.max_count {
        opts = opts.max_count(max_count);
    }
    if let Some(max_interval) = collect.max_interval {
        opts = opts.max_interval(Duration::from_secs_f64(max_interval));
    }

    let service = service.as_deref();
    let value = match verb {
        Verb::Ping => serde_json::to_value(client.ping(service, opts).await.map_err(|e| anyhow!(e))?)?,
        Verb::Info => serde_json::to_value(client.info(service, opts).await.map_err(|e| anyhow!(e))?)?,
        Verb::Stats => {
            serde_json::to_value(client.stats(service, opts).await.map_err(|e| anyhow!(e))?)?
        }
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
