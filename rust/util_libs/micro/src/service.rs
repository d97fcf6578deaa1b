use crate::connect::ClientEvent;
use crate::models::{
    EndpointInfo, EndpointStats, PingInfo, ServiceInfo, ServiceStats, INFO_RESPONSE_TYPE,
    PING_RESPONSE_TYPE, STATS_RESPONSE_TYPE,
};
use crate::request::{NatsRequest, Request};
use crate::subject::{control_subjects, validate_service_name, validate_service_version, ServiceVerb, API_PREFIX};
use crate::types::{
    default_queue_group, Clock, ConfigError, EndpointBuilder, EndpointConfig, GroupBuilder,
    ServiceBuilder, ServiceConfig, DEFAULT_PENDING_BYTES_LIMIT, DEFAULT_PENDING_MSGS_LIMIT,
};
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use futures::future::join_all;
use futures::StreamExt;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Register a new service instance on a NATS client.
///
/// The service must be started before it answers monitoring requests or
/// accepts endpoint registrations over traffic.
pub fn add_service(client: async_nats::Client, builder: ServiceBuilder) -> Result<Service, ConfigError> {
    validate_service_name(&builder.name)?;
    validate_service_version(&builder.version)?;

    let config = ServiceConfig {
        name: builder.name,
        version: builder.version,
        description: builder.description,
        metadata: builder.metadata,
        queue_group: builder.queue_group.unwrap_or_else(default_queue_group),
        pending_msgs_limit_by_endpoint: builder
            .pending_msgs_limit_by_endpoint
            .unwrap_or(DEFAULT_PENDING_MSGS_LIMIT),
        pending_bytes_limit_by_endpoint: builder
            .pending_bytes_limit_by_endpoint
            .unwrap_or(DEFAULT_PENDING_BYTES_LIMIT),
    };

    let id = match builder.id_generator {
        Some(generator) => generator(),
        None => generate_instance_id(),
    };
    let clock: Clock = builder.clock.unwrap_or_else(|| Arc::new(Utc::now));
    let started = clock();
    let api_prefix = builder.api_prefix.unwrap_or_else(|| API_PREFIX.to_string());
    let log_prefix = format!("SRV-LOG::{}::", config.name);

    let ping = PingInfo {
        name: config.name.clone(),
        id: id.clone(),
        version: config.version.clone(),
        metadata: config.metadata.clone(),
        kind: PING_RESPONSE_TYPE.to_string(),
    };
    let ping_reply = encode_reply(&ping);

    Ok(Service {
        client,
        config: Arc::new(config),
        id,
        api_prefix,
        clock,
        log_prefix,
        ping_reply: Arc::new(RwLock::new(ping_reply)),
        state: Arc::new(RwLock::new(ServiceState {
            started: started.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            endpoints: Vec::new(),
            ping_subs: Vec::new(),
            info_subs: Vec::new(),
            stats_subs: Vec::new(),
            event_watchers: Vec::new(),
        })),
        stopped: Arc::new(AtomicBool::new(false)),
    })
}

fn generate_instance_id() -> String {
    let mut rng = rand::rng();
    (0..12).map(|_| format!("{:02x}", rng.random::<u8>())).collect()
}

fn encode_reply<T: serde::Serialize>(value: &T) -> Bytes {
    match serde_json::to_vec(value) {
        Ok(encoded) => encoded.into(),
        Err(err) => {
            log::error!("failed to encode monitoring reply: {err}");
            Bytes::new()
        }
    }
}

struct ServiceState {
    started: String,
    endpoints: Vec<Endpoint>,
    ping_subs: Vec<SubscriptionHandle>,
    info_subs: Vec<SubscriptionHandle>,
    stats_subs: Vec<SubscriptionHandle>,
    event_watchers: Vec<JoinHandle<()>>,
}

/// A running service instance.
///
/// The handle is cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Service {
    client: async_nats::Client,
    config: Arc<ServiceConfig>,
    id: String,
    api_prefix: String,
    clock: Clock,
    log_prefix: String,
    ping_reply: Arc<RwLock<Bytes>>,
    state: Arc<RwLock<ServiceState>>,
    stopped: Arc<AtomicBool>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.config.name)
            .field("id", &self.id)
            .field("version", &self.config.version)
            .field("api_prefix", &self.api_prefix)
            .finish()
    }
}

impl Service {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Whether `stop` was executed on this instance.
    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Start the monitoring subscriptions.
    ///
    /// All nine control subjects (three per verb) are subscribed before
    /// this method returns.
    pub async fn start(&self) -> Result<(), async_nats::Error> {
        let mut state = self.state.write().await;
        for verb in [ServiceVerb::Ping, ServiceVerb::Info, ServiceVerb::Stats] {
            for subject in control_subjects(verb, &self.config.name, &self.id, &self.api_prefix) {
                let handle = self.spawn_monitoring_task(verb, subject).await?;
                match verb {
                    ServiceVerb::Ping => state.ping_subs.push(handle),
                    ServiceVerb::Info => state.info_subs.push(handle),
                    ServiceVerb::Stats => state.stats_subs.push(handle),
                }
            }
        }
        log::info!(
            "{}Started service instance id={} version={}",
            self.log_prefix,
            self.id,
            self.config.version
        );
        Ok(())
    }

    async fn spawn_monitoring_task(
        &self,
        verb: ServiceVerb,
        subject: String,
    ) -> Result<SubscriptionHandle, async_nats::Error> {
        let mut sub = self.client.subscribe(subject.clone()).await?;
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let service = self.clone();
        let log_prefix = self.log_prefix.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        let _ = sub.unsubscribe().await;
                        break;
                    }
                    maybe_msg = sub.next() => {
                        let Some(msg) = maybe_msg else { break };
                        let Some(reply) = msg.reply else { continue };
                        let payload = match verb {
                            ServiceVerb::Ping => service.ping_reply.read().await.clone(),
                            ServiceVerb::Info => encode_reply(&service.info().await),
                            ServiceVerb::Stats => encode_reply(&service.stats().await),
                        };
                        if let Err(err) = service.client.publish(reply, payload).await {
                            log::error!("{log_prefix}failed to answer {verb} request on '{subject}': {err}");
                        }
                    }
                }
            }
        });
        Ok(SubscriptionHandle {
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    /// Add a request-reply endpoint.
    ///
    /// Unset builder fields are filled from the service defaults. The
    /// dispatch wrapper installed here does the timing, the counters and
    /// the conversion of handler failures into `500` error replies.
    pub async fn add_endpoint(&self, builder: EndpointBuilder) -> Result<Endpoint, async_nats::Error> {
        self.install_endpoint(builder, false).await
    }

    /// Like [Service::add_endpoint], but fails when another endpoint
    /// already owns the subject. The scan and the registration run under
    /// the same endpoint-list lock, so two concurrent registrations for
    /// one subject cannot both pass.
    pub(crate) async fn add_unique_endpoint(
        &self,
        builder: EndpointBuilder,
    ) -> Result<Endpoint, async_nats::Error> {
        self.install_endpoint(builder, true).await
    }

    async fn install_endpoint(
        &self,
        builder: EndpointBuilder,
        unique_subject: bool,
    ) -> Result<Endpoint, async_nats::Error> {
        if self.stopped() {
            return Err(Box::new(ConfigError::ServiceStopped(self.config.name.clone())));
        }
        let config = self.config.endpoint_config(builder);

        let mut state = self.state.write().await;
        if unique_subject
            && state
                .endpoints
                .iter()
                .any(|ep| ep.config.subject == config.subject)
        {
            return Err(Box::new(ConfigError::DuplicateSubject(config.subject)));
        }

        let sub = self
            .client
            .queue_subscribe(config.subject.clone(), config.queue_group.clone())
            .await?;

        let endpoint = Endpoint::new(config.clone());
        let handle = endpoint.spawn_dispatch(self.client.clone(), self.log_prefix.clone(), sub);
        endpoint.attach(handle).await;
        state.endpoints.push(endpoint.clone());
        drop(state);

        log::debug!(
            "{}Added endpoint '{}' on subject '{}' (queue '{}')",
            self.log_prefix,
            config.name,
            config.subject,
            config.queue_group
        );
        Ok(endpoint)
    }

    /// Add a group node rooted at the service defaults.
    pub fn add_group(&self, builder: GroupBuilder) -> Result<crate::group::Group, ConfigError> {
        crate::types::validate_group_name(&builder.name)?;
        let config = crate::types::GroupConfig {
            name: builder.name.clone(),
            queue_group: builder
                .queue_group
                .unwrap_or_else(|| self.config.queue_group.clone()),
            pending_msgs_limit_by_endpoint: builder
                .pending_msgs_limit_by_endpoint
                .unwrap_or(self.config.pending_msgs_limit_by_endpoint),
            pending_bytes_limit_by_endpoint: builder
                .pending_bytes_limit_by_endpoint
                .unwrap_or(self.config.pending_bytes_limit_by_endpoint),
        };
        Ok(crate::group::Group::new(config, self.clone()))
    }

    /// A deep copy of the service info, endpoints in insertion order.
    pub async fn info(&self) -> ServiceInfo {
        let state = self.state.read().await;
        ServiceInfo {
            name: self.config.name.clone(),
            id: self.id.clone(),
            version: self.config.version.clone(),
            description: self.config.description.clone(),
            metadata: self.config.metadata.clone(),
            endpoints: state.endpoints.iter().map(|ep| ep.info()).collect(),
            data: HashMap::new(),
            kind: INFO_RESPONSE_TYPE.to_string(),
        }
    }

    /// A deep copy of the service statistics, endpoints in insertion order.
    pub async fn stats(&self) -> ServiceStats {
        let state = self.state.read().await;
        let mut endpoints = Vec::with_capacity(state.endpoints.len());
        for ep in &state.endpoints {
            endpoints.push(ep.stats().await);
        }
        ServiceStats {
            name: self.config.name.clone(),
            id: self.id.clone(),
            version: self.config.version.clone(),
            started: state.started.clone(),
            endpoints,
            metadata: self.config.metadata.clone(),
            kind: STATS_RESPONSE_TYPE.to_string(),
        }
    }

    /// Reset all statistics and freshen the cached ping reply.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.started = (self.clock)().to_rfc3339_opts(SecondsFormat::AutoSi, true);
        for ep in &state.endpoints {
            ep.reset().await;
        }
        let ping = PingInfo {
            name: self.config.name.clone(),
            id: self.id.clone(),
            version: self.config.version.clone(),
            metadata: self.config.metadata.clone(),
            kind: PING_RESPONSE_TYPE.to_string(),
        };
        *self.ping_reply.write().await = encode_reply(&ping);
        log::debug!("{}Reset service statistics", self.log_prefix);
    }

    /// Watch transport events and reset the instance on reconnect.
    pub async fn watch_events(&self, mut events: broadcast::Receiver<ClientEvent>) {
        let service = self.clone();
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ClientEvent::Connected) => {
                        if service.stopped() {
                            break;
                        }
                        log::info!(
                            "{}Transport reconnected; resetting statistics",
                            service.log_prefix
                        );
                        service.reset().await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!(
                            "{}Event watcher lagged behind by {skipped} events",
                            service.log_prefix
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.state.write().await.event_watchers.push(task);
    }

    /// Stop the service.
    ///
    /// Endpoint subscriptions are drained first, then the monitoring
    /// subscriptions; each step runs concurrently within itself. After
    /// this returns no further replies are issued.
    pub async fn stop(&self) -> Result<(), async_nats::Error> {
        self.stopped.store(true, Ordering::SeqCst);
        let (endpoints, monitoring, watchers) = {
            let mut state = self.state.write().await;
            let endpoints: Vec<Endpoint> = state.endpoints.clone();
            let monitoring: Vec<SubscriptionHandle> = {
                let stats: Vec<SubscriptionHandle> = state.stats_subs.drain(..).collect();
                let info: Vec<SubscriptionHandle> = state.info_subs.drain(..).collect();
                let ping: Vec<SubscriptionHandle> = state.ping_subs.drain(..).collect();
                stats.into_iter().chain(info).chain(ping).collect()
            };
            let watchers: Vec<JoinHandle<()>> = state.event_watchers.drain(..).collect();
            (endpoints, monitoring, watchers)
        };

        join_all(endpoints.iter().map(|ep| ep.stop())).await;
        join_all(monitoring.into_iter().map(|handle| handle.stop())).await;
        for watcher in watchers {
            watcher.abort();
        }
        log::info!("{}Stopped service instance id={}", self.log_prefix, self.id);
        Ok(())
    }
}

/// Shutdown handle of one spawned subscription task.
struct SubscriptionHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.task).await;
    }
}

/// A registered endpoint.
///
/// The handle shares its statistics with the service snapshots, so the
/// counters observed through `Service::stats` and through this handle
/// are the same.
#[derive(Clone)]
pub struct Endpoint {
    config: EndpointConfig,
    info: EndpointInfo,
    stats: Arc<RwLock<EndpointStats>>,
    control: Arc<Mutex<Option<SubscriptionHandle>>>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.config.name)
            .field("subject", &self.config.subject)
            .field("queue_group", &self.config.queue_group)
            .finish()
    }
}

fn create_endpoint_stats(config: &EndpointConfig) -> EndpointStats {
    EndpointStats {
        name: config.name.clone(),
        subject: config.subject.clone(),
        num_requests: 0,
        num_errors: 0,
        last_error: String::new(),
        processing_time: 0,
        average_processing_time: 0,
        queue_group: config.queue_group.clone(),
        data: HashMap::new(),
    }
}

impl Endpoint {
    fn new(config: EndpointConfig) -> Self {
        let info = EndpointInfo {
            name: config.name.clone(),
            subject: config.subject.clone(),
            metadata: config.metadata.clone(),
            queue_group: config.queue_group.clone(),
        };
        let stats = Arc::new(RwLock::new(create_endpoint_stats(&config)));
        Self {
            config,
            info,
            stats,
            control: Arc::new(Mutex::new(None)),
        }
    }

    async fn attach(&self, handle: SubscriptionHandle) {
        *self.control.lock().await = Some(handle);
    }

    /// Spawn the dispatch loop wrapping the user handler.
    fn spawn_dispatch(
        &self,
        client: async_nats::Client,
        log_prefix: String,
        mut sub: async_nats::Subscriber,
    ) -> SubscriptionHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let stats = self.stats.clone();
        let handler = self.config.handler.clone();
        let name = self.config.name.clone();
        let subject = self.config.subject.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        let _ = sub.unsubscribe().await;
                        break;
                    }
                    maybe_msg = sub.next() => {
                        let Some(msg) = maybe_msg else { break };
                        let timer = Instant::now();
                        stats.write().await.num_requests += 1;
                        let request: Arc<dyn Request> = Arc::new(NatsRequest::new(client.clone(), msg));
                        if let Err(err) = handler(request.clone()).await {
                            {
                                let mut stats = stats.write().await;
                                stats.num_errors += 1;
                                stats.last_error = err.to_string();
                            }
                            log::debug!("{log_prefix}endpoint '{name}' handler failed: {err:#}");
                            if let Err(publish_err) = request
                                .respond_error(500, "Internal Server Error", Bytes::new(), None)
                                .await
                            {
                                log::error!(
                                    "{log_prefix}failed to send error reply on '{subject}': {publish_err}"
                                );
                            }
                        }
                        let elapsed = timer.elapsed().as_nanos() as u64;
                        let mut stats = stats.write().await;
                        stats.processing_time += elapsed;
                        stats.average_processing_time = stats.processing_time / stats.num_requests;
                    }
                }
            }
        });
        SubscriptionHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn info(&self) -> EndpointInfo {
        self.info.clone()
    }

    /// A deep copy of the endpoint statistics.
    pub async fn stats(&self) -> EndpointStats {
        self.stats.read().await.clone()
    }

    /// Reset the endpoint statistics.
    pub async fn reset(&self) {
        *self.stats.write().await = create_endpoint_stats(&self.config);
    }

    /// Stop the endpoint by draining its subscription. Idempotent.
    pub async fn stop(&self) {
        let handle = self.control.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }
}
