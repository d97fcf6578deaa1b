use crate::service::{Endpoint, Service};
use crate::types::{ConfigError, EndpointBuilder, GroupBuilder, GroupConfig};

/// A prefix-and-defaults node used to compose endpoint subjects.
///
/// Groups are pure configuration: at runtime only endpoints exist. An
/// endpoint added through a group gets the group name prepended to its
/// subject and inherits the queue group and pending limits the group
/// carries, unless explicitly overridden.
#[derive(Clone, Debug)]
pub struct Group {
    config: GroupConfig,
    service: Service,
}

impl Group {
    pub(crate) fn new(config: GroupConfig, service: Service) -> Self {
        Self { config, service }
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Derive a child group under this group's prefix.
    pub fn add_group(&self, builder: GroupBuilder) -> Result<Group, ConfigError> {
        let config = self.config.child(builder)?;
        Ok(Group::new(config, self.service.clone()))
    }

    /// Add an endpoint under this group's prefix, delegating to the service.
    pub async fn add_endpoint(&self, mut builder: EndpointBuilder) -> Result<Endpoint, async_nats::Error> {
        let subject = builder.subject.take().unwrap_or_else(|| builder.name.clone());
        builder.subject = Some(format!("{}.{}", self.config.name, subject));
        if builder.queue_group.is_none() {
            builder.queue_group = Some(self.config.queue_group.clone());
        }
        if builder.pending_msgs_limit.is_none() {
            builder.pending_msgs_limit = Some(self.config.pending_msgs_limit_by_endpoint);
        }
        if builder.pending_bytes_limit.is_none() {
            builder.pending_bytes_limit = Some(self.config.pending_bytes_limit_by_endpoint);
        }
        self.service.add_endpoint(builder).await
    }
}
