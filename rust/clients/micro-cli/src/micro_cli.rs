/// Module containing all of the Clap Derive structs/definitions that make up
/// the command line surface of the `micro` fleet tool.
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    version,
    about,
    long_about = "Command line interface for discovering and calling NATS micro services"
)]
pub struct Root {
    #[command(flatten)]
    pub connect: ConnectFlags,

    #[command(subcommand)]
    pub command: Command,
}

/// Connection flags shared by all subcommands; each falls back to its
/// NATS_* environment variable.
#[derive(Args, Clone)]
pub struct ConnectFlags {
    /// NATS server URL.
    #[arg(
        short = 's',
        long,
        env = "NATS_SERVER",
        default_value = "nats://localhost:4222",
        global = true
    )]
    pub server: String,

    /// Maximum number of reconnect attempts.
    #[arg(long, env = "NATS_MAX_RECONNECT", default_value_t = 60, global = true)]
    pub max_reconnect: usize,

    /// Delay between reconnect attempts, in seconds.
    #[arg(long, env = "NATS_RECONNECT_DELAY", default_value_t = 2.0, global = true)]
    pub reconnect_delay: f64,

    /// Username for authentication.
    #[arg(long, env = "NATS_USERNAME", global = true)]
    pub username: Option<String>,

    /// Password for authentication.
    #[arg(long, env = "NATS_PASSWORD", global = true)]
    pub password: Option<String>,

    /// Token for authentication.
    #[arg(long, env = "NATS_TOKEN", global = true)]
    pub token: Option<String>,
}

#[derive(Subcommand, Clone)]
pub enum Command {
    /// Send a request to a subject and print the reply.
    Request {
        /// The subject to send the request to.
        subject: String,
        /// The request payload.
        payload: Option<String>,
        /// How long to wait for the reply, in seconds.
        #[arg(long, default_value_t = 1.0)]
        timeout: f64,
    },
    /// Ping services across the fleet.
    Ping {
        /// Restrict to one service kind.
        service: Option<String>,
        #[command(flatten)]
        collect: CollectFlags,
    },
    /// Fetch service information.
    Info {
        /// Restrict to one service kind.
        service: Option<String>,
        #[command(flatten)]
        collect: CollectFlags,
    },
    /// Fetch service statistics.
    Stats {
        /// Restrict to one service kind.
        service: Option<String>,
        #[command(flatten)]
        collect: CollectFlags,
    },
}

/// Bounds on the discovery collection. When an instance id is given the
/// request degenerates to a single point-to-point call.
#[derive(Args, Clone)]
pub struct CollectFlags {
    /// Address one service instance (requires a service name).
    #[arg(long)]
    pub instance: Option<String>,

    /// Overall collection deadline, in seconds.
    #[arg(long)]
    pub max_wait: Option<f64>,

    /// Stop after this many replies.
    #[arg(long)]
    pub max_count: Option<u64>,

    /// Stop when this much time passes without a reply, in seconds.
    #[arg(long)]
    pub max_interval: Option<f64>,
}
