use async_nats::{HeaderMap, Message};

/// Builds `async_nats::Message` values for transport-free unit tests.
pub struct NatsMessage {
    subject: String,
    payload: Vec<u8>,
    headers: Option<HeaderMap>,
}

impl NatsMessage {
    pub fn new(subject: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            headers: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn into_message(self) -> Message {
        Message {
            subject: self.subject.into(),
            reply: None,
            payload: self.payload.clone().into(),
            headers: self.headers,
            status: None,
            description: None,
            length: self.payload.len(),
        }
    }
}
