use async_nats::{HeaderMap, Message, PublishError};
use async_trait::async_trait;
use bytes::Bytes;

/// Header set on structured success replies.
pub const NATS_SERVICE_SUCCESS_CODE: &str = "Nats-Service-Success-Code";
/// Header carrying the error status on structured error replies.
pub const NATS_SERVICE_ERROR_CODE: &str = "Nats-Service-Error-Code";
/// Header carrying the human readable error description.
pub const NATS_SERVICE_ERROR: &str = "Nats-Service-Error";
/// Header set by the typed layer when the schema has a known content type.
pub const CONTENT_TYPE: &str = "Content-Type";

/// A uniform view over one received message.
///
/// Handlers receive requests behind this trait so that tests can drive
/// them with an in-memory stub instead of a live subscription.
#[async_trait]
pub trait Request: Send + Sync {
    /// The subject on which the request was received.
    fn subject(&self) -> &str;

    /// The headers of the request.
    fn headers(&self) -> HeaderMap;

    /// The payload of the request.
    fn payload(&self) -> Bytes;

    /// Send a reply to the request.
    ///
    /// When the request carries no reply subject the reply is silently
    /// dropped.
    async fn respond(&self, payload: Bytes, headers: Option<HeaderMap>) -> Result<(), PublishError>;

    /// Send a structured success reply carrying the status code header.
    async fn respond_success(
        &self,
        code: u16,
        payload: Bytes,
        headers: Option<HeaderMap>,
    ) -> Result<(), PublishError> {
        let mut headers = headers.unwrap_or_default();
        headers.insert(NATS_SERVICE_SUCCESS_CODE, code.to_string());
        self.respond(payload, Some(headers)).await
    }

    /// Send a structured error reply carrying the standard error headers.
    async fn respond_error(
        &self,
        code: u16,
        description: &str,
        payload: Bytes,
        headers: Option<HeaderMap>,
    ) -> Result<(), PublishError> {
        let mut headers = headers.unwrap_or_default();
        headers.insert(NATS_SERVICE_ERROR, description.to_string());
        headers.insert(NATS_SERVICE_ERROR_CODE, code.to_string());
        self.respond(payload, Some(headers)).await
    }
}

/// Implementation of [Request] backed by the NATS client.
pub struct NatsRequest {
    client: async_nats::Client,
    message: Message,
}

impl NatsRequest {
    pub fn new(client: async_nats::Client, message: Message) -> Self {
        Self { client, message }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }
}

#[async_trait]
impl Request for NatsRequest {
    fn subject(&self) -> &str {
        self.message.subject.as_str()
    }

    fn headers(&self) -> HeaderMap {
        self.message.headers.clone().unwrap_or_default()
    }

    fn payload(&self) -> Bytes {
        self.message.payload.clone()
    }

    async fn respond(&self, payload: Bytes, headers: Option<HeaderMap>) -> Result<(), PublishError> {
        let Some(reply) = self.message.reply.clone() else {
            return Ok(());
        };
        match headers {
            Some(headers) => {
                self.client
                    .publish_with_headers(reply, headers, payload)
                    .await
            }
            None => self.client.publish(reply, payload).await,
        }
    }
}
