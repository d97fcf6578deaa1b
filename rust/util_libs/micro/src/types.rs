use crate::request::Request;
use crate::subject::DEFAULT_QUEUE_GROUP;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Default pending messages limit applied per endpoint subscription.
pub const DEFAULT_PENDING_MSGS_LIMIT: i64 = 512 * 1024;
/// Default pending bytes limit applied per endpoint subscription.
pub const DEFAULT_PENDING_BYTES_LIMIT: i64 = 128 * 1024 * 1024;

/// An endpoint handler: consumes one request, replies through it.
pub type AsyncEndpointHandler = Arc<
    dyn Fn(Arc<dyn Request>) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>
        + Send
        + Sync,
>;

pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid service name '{0}': only A-Z, a-z, 0-9, dash and underscore are allowed")]
    InvalidServiceName(String),

    #[error("invalid service version '{version}': {source}")]
    InvalidVersion {
        version: String,
        source: semver::Error,
    },

    #[error("invalid group name '{0}': group names cannot contain '>'")]
    InvalidGroupName(String),

    #[error("cannot add an endpoint to stopped service '{0}'")]
    ServiceStopped(String),

    #[error("an endpoint is already registered on subject '{0}'")]
    DuplicateSubject(String),

    #[error("the context is not connected to a NATS server")]
    NotConnected,
}

/// Configuration used to register a new service instance.
#[derive(Clone)]
pub struct ServiceBuilder {
    pub name: String,
    pub version: String,
    pub description: String,
    pub metadata: HashMap<String, String>,
    pub queue_group: Option<String>,
    pub api_prefix: Option<String>,
    pub pending_msgs_limit_by_endpoint: Option<i64>,
    pub pending_bytes_limit_by_endpoint: Option<i64>,
    pub id_generator: Option<IdGenerator>,
    pub clock: Option<Clock>,
}

impl ServiceBuilder {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            description: String::new(),
            metadata: HashMap::new(),
            queue_group: None,
            api_prefix: None,
            pending_msgs_limit_by_endpoint: None,
            pending_bytes_limit_by_endpoint: None,
            id_generator: None,
            clock: None,
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn queue_group(mut self, queue_group: &str) -> Self {
        self.queue_group = Some(queue_group.to_string());
        self
    }

    pub fn api_prefix(mut self, api_prefix: &str) -> Self {
        self.api_prefix = Some(api_prefix.to_string());
        self
    }

    pub fn id_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.id_generator = Some(Arc::new(generator));
        self
    }

    pub fn clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Some(Arc::new(clock));
        self
    }
}

impl std::fmt::Debug for ServiceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBuilder")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("description", &self.description)
            .field("queue_group", &self.queue_group)
            .field("api_prefix", &self.api_prefix)
            .finish()
    }
}

/// The resolved configuration of a service instance.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub name: String,
    pub version: String,
    pub description: String,
    pub metadata: HashMap<String, String>,
    pub queue_group: String,
    pub pending_msgs_limit_by_endpoint: i64,
    pub pending_bytes_limit_by_endpoint: i64,
}

impl ServiceConfig {
    /// Merge an endpoint registration with the service defaults.
    pub fn endpoint_config(&self, builder: EndpointBuilder) -> EndpointConfig {
        let subject = builder.subject.unwrap_or_else(|| builder.name.clone());
        EndpointConfig {
            name: builder.name,
            subject,
            handler: builder.handler,
            queue_group: builder
                .queue_group
                .unwrap_or_else(|| self.queue_group.clone()),
            metadata: builder.metadata,
            pending_msgs_limit: builder
                .pending_msgs_limit
                .unwrap_or(self.pending_msgs_limit_by_endpoint),
            pending_bytes_limit: builder
                .pending_bytes_limit
                .unwrap_or(self.pending_bytes_limit_by_endpoint),
        }
    }
}

/// Registration arguments for a single endpoint.
///
/// Unset fields fall back to the enclosing group defaults and then to
/// the service defaults.
#[derive(Clone)]
pub struct EndpointBuilder {
    pub name: String,
    pub subject: Option<String>,
    pub handler: AsyncEndpointHandler,
    pub queue_group: Option<String>,
    pub metadata: HashMap<String, String>,
    pub pending_msgs_limit: Option<i64>,
    pub pending_bytes_limit: Option<i64>,
}

impl EndpointBuilder {
    pub fn new(name: &str, handler: AsyncEndpointHandler) -> Self {
        Self {
            name: name.to_string(),
            subject: None,
            handler,
            queue_group: None,
            metadata: HashMap::new(),
            pending_msgs_limit: None,
            pending_bytes_limit: None,
        }
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    pub fn queue_group(mut self, queue_group: &str) -> Self {
        self.queue_group = Some(queue_group.to_string());
        self
    }

    pub fn metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn pending_msgs_limit(mut self, limit: i64) -> Self {
        self.pending_msgs_limit = Some(limit);
        self
    }

    pub fn pending_bytes_limit(mut self, limit: i64) -> Self {
        self.pending_bytes_limit = Some(limit);
        self
    }
}

impl std::fmt::Debug for EndpointBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointBuilder")
            .field("name", &self.name)
            .field("subject", &self.subject)
            .field("queue_group", &self.queue_group)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// The effective configuration of a registered endpoint.
#[derive(Clone)]
pub struct EndpointConfig {
    pub name: String,
    pub subject: String,
    pub handler: AsyncEndpointHandler,
    pub queue_group: String,
    pub metadata: HashMap<String, String>,
    pub pending_msgs_limit: i64,
    pub pending_bytes_limit: i64,
}

impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("name", &self.name)
            .field("subject", &self.subject)
            .field("queue_group", &self.queue_group)
            .field("metadata", &self.metadata)
            .field("pending_msgs_limit", &self.pending_msgs_limit)
            .field("pending_bytes_limit", &self.pending_bytes_limit)
            .finish()
    }
}

/// Registration arguments for a group.
#[derive(Clone, Debug, Default)]
pub struct GroupBuilder {
    pub name: String,
    pub queue_group: Option<String>,
    pub pending_msgs_limit_by_endpoint: Option<i64>,
    pub pending_bytes_limit_by_endpoint: Option<i64>,
}

impl GroupBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn queue_group(mut self, queue_group: &str) -> Self {
        self.queue_group = Some(queue_group.to_string());
        self
    }
}

/// The resolved configuration of a group node.
#[derive(Clone, Debug)]
pub struct GroupConfig {
    pub name: String,
    pub queue_group: String,
    pub pending_msgs_limit_by_endpoint: i64,
    pub pending_bytes_limit_by_endpoint: i64,
}

impl GroupConfig {
    /// Derive a child group configuration, concatenating the names with `.`.
    pub fn child(&self, builder: GroupBuilder) -> Result<GroupConfig, ConfigError> {
        validate_group_name(&builder.name)?;
        Ok(GroupConfig {
            name: format!("{}.{}", self.name, builder.name),
            queue_group: builder
                .queue_group
                .unwrap_or_else(|| self.queue_group.clone()),
            pending_msgs_limit_by_endpoint: builder
                .pending_msgs_limit_by_endpoint
                .unwrap_or(self.pending_msgs_limit_by_endpoint),
            pending_bytes_limit_by_endpoint: builder
                .pending_bytes_limit_by_endpoint
                .unwrap_or(self.pending_bytes_limit_by_endpoint),
        })
    }
}

pub fn validate_group_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.contains('>') {
        return Err(ConfigError::InvalidGroupName(name.to_string()));
    }
    Ok(())
}

pub(crate) fn default_queue_group() -> String {
    DEFAULT_QUEUE_GROUP.to_string()
}
