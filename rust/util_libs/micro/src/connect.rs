use std::time::Duration;
use tokio::sync::broadcast;

pub const ENV_NATS_SERVER: &str = "NATS_SERVER";
pub const ENV_NATS_MAX_RECONNECT: &str = "NATS_MAX_RECONNECT";
pub const ENV_NATS_RECONNECT_DELAY: &str = "NATS_RECONNECT_DELAY";
pub const ENV_NATS_USERNAME: &str = "NATS_USERNAME";
pub const ENV_NATS_PASSWORD: &str = "NATS_PASSWORD";
pub const ENV_NATS_TOKEN: &str = "NATS_TOKEN";

pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";
pub const DEFAULT_MAX_RECONNECT: usize = 60;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub enum Credentials {
    Path(std::path::PathBuf),
    Password(String, String),
    Token(String),
}

/// Transport events surfaced to observers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    LameDuckMode,
    Other(String),
}

/// Connection arguments, with `NATS_*` environment fallbacks.
#[derive(Clone, Debug)]
pub struct ConnectArgs {
    pub nats_url: String,
    pub name: Option<String>,
    pub max_reconnects: Option<usize>,
    pub reconnect_delay: Duration,
    pub credentials: Vec<Credentials>,
    pub inbox_prefix: Option<String>,
    pub request_timeout: Option<Duration>,
}

impl Default for ConnectArgs {
    fn default() -> Self {
        Self {
            nats_url: DEFAULT_NATS_URL.to_string(),
            name: None,
            max_reconnects: Some(DEFAULT_MAX_RECONNECT),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            credentials: Vec::new(),
            inbox_prefix: None,
            request_timeout: None,
        }
    }
}

impl ConnectArgs {
    pub fn new(nats_url: &str) -> Self {
        Self {
            nats_url: nats_url.to_string(),
            ..Default::default()
        }
    }

    /// Read the connection arguments from the environment.
    pub fn from_env() -> Self {
        let mut args = Self::default();
        if let Some(url) = env_var(ENV_NATS_SERVER) {
            args.nats_url = url;
        }
        if let Some(max) = env_var(ENV_NATS_MAX_RECONNECT).and_then(|v| v.parse::<usize>().ok()) {
            args.max_reconnects = Some(max);
        }
        if let Some(delay) = env_var(ENV_NATS_RECONNECT_DELAY).and_then(|v| v.parse::<f64>().ok()) {
            args.reconnect_delay = Duration::from_secs_f64(delay);
        }
        if let (Some(username), Some(password)) =
            (env_var(ENV_NATS_USERNAME), env_var(ENV_NATS_PASSWORD))
        {
            args.credentials.push(Credentials::Password(username, password));
        }
        if let Some(token) = env_var(ENV_NATS_TOKEN) {
            args.credentials.push(Credentials::Token(token));
        }
        args
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn max_reconnects(mut self, max_reconnects: Option<usize>) -> Self {
        self.max_reconnects = max_reconnects;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials.push(credentials);
        self
    }

    pub fn inbox_prefix(mut self, prefix: &str) -> Self {
        self.inbox_prefix = Some(prefix.to_string());
        self
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// A connected NATS client plus the observer list of transport events.
#[derive(Clone)]
pub struct NatsConnection {
    pub client: async_nats::Client,
    events: broadcast::Sender<ClientEvent>,
}

impl std::fmt::Debug for NatsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsConnection")
            .field("client", &self.client)
            .finish()
    }
}

impl NatsConnection {
    /// Subscribe to transport events (connected, disconnected, ...).
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Drain the client: subscriptions are unsubscribed and buffered
    /// messages are processed before the connection closes.
    pub async fn close(&self) -> Result<(), async_nats::Error> {
        self.client.drain().await?;
        Ok(())
    }
}

/// Connect to a NATS server.
///
/// Transport events are fanned out on the returned connection's
/// broadcast channel so that services can observe reconnects.
pub async fn connect(args: ConnectArgs) -> Result<NatsConnection, async_nats::Error> {
    let (events_tx, _) = broadcast::channel::<ClientEvent>(16);
    let events = events_tx.clone();
    let reconnect_delay = args.reconnect_delay;

    let mut options = async_nats::ConnectOptions::new()
        .max_reconnects(args.max_reconnects)
        .reconnect_delay_callback(move |_attempts| reconnect_delay)
        .event_callback(move |event| {
            let events = events_tx.clone();
            async move {
                let mapped = match event {
                    async_nats::Event::Connected => ClientEvent::Connected,
                    async_nats::Event::Disconnected => ClientEvent::Disconnected,
                    async_nats::Event::LameDuckMode => ClientEvent::LameDuckMode,
                    other => ClientEvent::Other(format!("{other:?}")),
                };
                log::debug!("NATS client event: {mapped:?}");
                let _ = events.send(mapped);
            }
        });

    if let Some(name) = &args.name {
        options = options.name(name);
    }
    if let Some(prefix) = &args.inbox_prefix {
        options = options.custom_inbox_prefix(prefix);
    }
    if let Some(timeout) = args.request_timeout {
        options = options.request_timeout(Some(timeout));
    }
    for credentials in args.credentials {
        match credentials {
            Credentials::Password(username, password) => {
                options = options.user_and_password(username, password);
            }
            Credentials::Path(path) => {
                options = options.credentials_file(&path).await?;
            }
            Credentials::Token(token) => {
                options = options.token(token);
            }
        }
    }

    let client = options.connect(&args.nats_url).await?;
    log::info!("Connected to NATS server at {}", args.nats_url);

    Ok(NatsConnection { client, events })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = ConnectArgs::default();
        assert_eq!(args.nats_url, DEFAULT_NATS_URL);
        assert_eq!(args.max_reconnects, Some(DEFAULT_MAX_RECONNECT));
        assert_eq!(args.reconnect_delay, DEFAULT_RECONNECT_DELAY);
        assert!(args.credentials.is_empty());
    }

    #[test]
    fn test_builder_methods() {
        let args = ConnectArgs::new("nats://example:4222")
            .name("client1")
            .max_reconnects(None)
            .reconnect_delay(Duration::from_millis(100))
            .credentials(Credentials::Token("secret".to_string()));
        assert_eq!(args.nats_url, "nats://example:4222");
        assert_eq!(args.name.as_deref(), Some("client1"));
        assert_eq!(args.max_reconnects, None);
        assert_eq!(args.credentials.len(), 1);
    }
}
