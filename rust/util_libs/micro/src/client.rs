use crate::models::{PingInfo, ServiceInfo, ServiceStats};
use crate::request::{NATS_SERVICE_ERROR, NATS_SERVICE_ERROR_CODE};
use crate::request_many::{RequestMany, DEFAULT_MAX_WAIT};
use crate::subject::{control_subject, ServiceVerb, API_PREFIX};
use async_nats::{HeaderMap, Message};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

/// A reply carried the service error headers.
#[derive(Debug, Error)]
#[error("service error {code} on '{subject}': {description}")]
pub struct ServiceError {
    pub code: u16,
    pub description: String,
    pub subject: String,
    pub data: Bytes,
    pub headers: HeaderMap,
}

/// Collection bounds for a discovery request.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscoverOpts {
    pub max_wait: Option<Duration>,
    pub max_count: Option<u64>,
    pub max_interval: Option<Duration>,
}

impl DiscoverOpts {
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    pub fn max_count(mut self, max_count: u64) -> Self {
        self.max_count = Some(max_count);
        self
    }

    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }
}

/// Client for talking to micro services: point-to-point requests with
/// service error extraction, and fleet discovery over request-many.
#[derive(Clone, Debug)]
pub struct Client {
    client: async_nats::Client,
    api_prefix: String,
    default_max_wait: Duration,
    default_timeout: Duration,
}

impl Client {
    pub fn new(client: async_nats::Client) -> Self {
        Self {
            client,
            api_prefix: API_PREFIX.to_string(),
            default_max_wait: DEFAULT_MAX_WAIT,
            default_timeout: Duration::from_secs(1),
        }
    }

    pub fn with_api_prefix(mut self, api_prefix: &str) -> Self {
        self.api_prefix = api_prefix.to_string();
        self
    }

    pub fn with_default_max_wait(mut self, max_wait: Duration) -> Self {
        self.default_max_wait = max_wait;
        self
    }

    pub fn nats_client(&self) -> &async_nats::Client {
        &self.client
    }

    /// Send a request and await a single reply.
    ///
    /// A reply carrying `Nats-Service-Error-Code` is surfaced as a
    /// [ServiceError] (downcast the boxed error to inspect it).
    pub async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        headers: Option<HeaderMap>,
        timeout: Option<Duration>,
    ) -> Result<Message, async_nats::Error> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let response = tokio::time::timeout(timeout, async {
            match headers {
                Some(headers) => {
                    self.client
                        .request_with_headers(subject.to_string(), headers, payload)
                        .await
                }
                None => self.client.request(subject.to_string(), payload).await,
            }
        })
        .await
        .map_err(|elapsed| Box::new(elapsed) as async_nats::Error)??;

        if let Some(service_error) = service_error_from_message(subject, &response) {
            return Err(Box::new(service_error));
        }
        Ok(response)
    }

    fn many(&self, opts: DiscoverOpts) -> RequestMany {
        let mut many = RequestMany::new(self.client.clone());
        match (opts.max_wait, opts.max_interval) {
            (None, None) => many = many.max_wait(self.default_max_wait),
            (max_wait, max_interval) => {
                if let Some(max_wait) = max_wait {
                    many = many.max_wait(max_wait);
                }
                if let Some(max_interval) = max_interval {
                    many = many.max_interval(max_interval);
                }
            }
        }
        if let Some(max_count) = opts.max_count {
            many = many.max_count(max_count);
        }
        many
    }

    async fn discover<T: DeserializeOwned>(
        &self,
        verb: ServiceVerb,
        service: Option<&str>,
        opts: DiscoverOpts,
    ) -> Result<Vec<T>, async_nats::Error> {
        let subject = control_subject(verb, service, None, &self.api_prefix);
        let responses = self
            .many(opts)
            .request(subject, Bytes::new(), None)
            .await?;
        let mut decoded = Vec::with_capacity(responses.len());
        for response in responses {
            decoded.push(serde_json::from_slice(&response.payload)?);
        }
        Ok(decoded)
    }

    async fn discover_stream<T: DeserializeOwned>(
        &self,
        verb: ServiceVerb,
        service: Option<&str>,
        opts: DiscoverOpts,
    ) -> Result<impl Stream<Item = Result<T, serde_json::Error>> + Send + Unpin, async_nats::Error>
    {
        let subject = control_subject(verb, service, None, &self.api_prefix);
        let stream = self.many(opts).stream(subject, Bytes::new(), None).await?;
        Ok(stream.map(|msg| serde_json::from_slice(&msg.payload)))
    }

    /// Ping services across the fleet, or the instances of one service.
    pub async fn ping(
        &self,
        service: Option<&str>,
        opts: DiscoverOpts,
    ) -> Result<Vec<PingInfo>, async_nats::Error> {
        self.discover(ServiceVerb::Ping, service, opts).await
    }

    /// Fetch service information across the fleet, or for one service.
    pub async fn info(
        &self,
        service: Option<&str>,
        opts: DiscoverOpts,
    ) -> Result<Vec<ServiceInfo>, async_nats::Error> {
        self.discover(ServiceVerb::Info, service, opts).await
    }

    /// Fetch service statistics across the fleet, or for one service.
    pub async fn stats(
        &self,
        service: Option<&str>,
        opts: DiscoverOpts,
    ) -> Result<Vec<ServiceStats>, async_nats::Error> {
        self.discover(ServiceVerb::Stats, service, opts).await
    }

    /// Stream ping replies as they arrive.
    pub async fn ping_stream(
        &self,
        service: Option<&str>,
        opts: DiscoverOpts,
    ) -> Result<impl Stream<Item = Result<PingInfo, serde_json::Error>> + Send + Unpin, async_nats::Error>
    {
        self.discover_stream(ServiceVerb::Ping, service, opts).await
    }

    /// Stream info replies as they arrive.
    pub async fn info_stream(
        &self,
        service: Option<&str>,
        opts: DiscoverOpts,
    ) -> Result<impl Stream<Item = Result<ServiceInfo, serde_json::Error>> + Send + Unpin, async_nats::Error>
    {
        self.discover_stream(ServiceVerb::Info, service, opts).await
    }

    /// Stream stats replies as they arrive.
    pub async fn stats_stream(
        &self,
        service: Option<&str>,
        opts: DiscoverOpts,
    ) -> Result<impl Stream<Item = Result<ServiceStats, serde_json::Error>> + Send + Unpin, async_nats::Error>
    {
        self.discover_stream(ServiceVerb::Stats, service, opts).await
    }

    /// A view bound to one service kind.
    pub fn service(&self, service: &str) -> ServiceClient {
        ServiceClient {
            client: self.clone(),
            service: service.to_string(),
        }
    }
}

/// Discovery bound to one service kind.
#[derive(Clone, Debug)]
pub struct ServiceClient {
    client: Client,
    service: String,
}

impl ServiceClient {
    pub async fn ping(&self, opts: DiscoverOpts) -> Result<Vec<PingInfo>, async_nats::Error> {
        self.client.ping(Some(&self.service), opts).await
    }

    pub async fn info(&self, opts: DiscoverOpts) -> Result<Vec<ServiceInfo>, async_nats::Error> {
        self.client.info(Some(&self.service), opts).await
    }

    pub async fn stats(&self, opts: DiscoverOpts) -> Result<Vec<ServiceStats>, async_nats::Error> {
        self.client.stats(Some(&self.service), opts).await
    }

    /// A view bound to one instance of the service.
    pub fn instance(&self, id: &str) -> InstanceClient {
        InstanceClient {
            client: self.client.clone(),
            service: self.service.clone(),
            id: id.to_string(),
        }
    }
}

/// Discovery bound to one service instance.
///
/// The subject is fully deterministic, so a plain request with a timeout
/// replaces request-many here.
#[derive(Clone, Debug)]
pub struct InstanceClient {
    client: Client,
    service: String,
    id: String,
}

impl InstanceClient {
    async fn fetch<T: DeserializeOwned>(
        &self,
        verb: ServiceVerb,
        timeout: Option<Duration>,
    ) -> Result<T, async_nats::Error> {
        let subject = control_subject(
            verb,
            Some(&self.service),
            Some(&self.id),
            &self.client.api_prefix,
        );
        let timeout = timeout.unwrap_or(DEFAULT_MAX_WAIT);
        let response = self
            .client
            .request(&subject, Bytes::new(), None, Some(timeout))
            .await?;
        Ok(serde_json::from_slice(&response.payload)?)
    }

    pub async fn ping(&self, timeout: Option<Duration>) -> Result<PingInfo, async_nats::Error> {
        self.fetch(ServiceVerb::Ping, timeout).await
    }

    pub async fn info(&self, timeout: Option<Duration>) -> Result<ServiceInfo, async_nats::Error> {
        self.fetch(ServiceVerb::Info, timeout).await
    }

    pub async fn stats(&self, timeout: Option<Duration>) -> Result<ServiceStats, async_nats::Error> {
        self.fetch(ServiceVerb::Stats, timeout).await
    }
}

/// Inspect a reply for the service error headers.
///
/// Returns the materialized [ServiceError] when the reply carries
/// `Nats-Service-Error-Code`; a code that fails to parse is reported
/// as a 500.
fn service_error_from_message(subject: &str, message: &Message) -> Option<ServiceError> {
    let headers = message.headers.as_ref()?;
    let code = headers.get(NATS_SERVICE_ERROR_CODE)?;
    let code = code.as_str().parse::<u16>().unwrap_or(500);
    let description = headers
        .get(NATS_SERVICE_ERROR)
        .map(|value| value.as_str().to_string())
        .unwrap_or_default();
    Some(ServiceError {
        code,
        description,
        subject: subject.to_string(),
        data: message.payload.clone(),
        headers: headers.clone(),
    })
}
