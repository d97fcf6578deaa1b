use async_nats::{HeaderMap, PublishError};
use async_trait::async_trait;
use bytes::Bytes;
use micro_utils::request::Request;
use std::sync::Mutex;

/// An in-memory [Request] implementation for driving handlers in tests.
///
/// Replies are captured instead of being published; tests read them back
/// through `response_payload` / `response_headers`.
pub struct RequestStub {
    subject: String,
    payload: Bytes,
    headers: HeaderMap,
    response: Mutex<Option<(Bytes, HeaderMap)>>,
}

impl RequestStub {
    pub fn new(subject: &str, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            subject: subject.to_string(),
            payload: Bytes::from(payload.into()),
            headers: HeaderMap::new(),
            response: Mutex::new(None),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// The captured response payload, if the handler replied.
    pub fn response_payload(&self) -> Option<Bytes> {
        self.response
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|(payload, _)| payload.clone())
    }

    /// The captured response headers, if the handler replied.
    pub fn response_headers(&self) -> Option<HeaderMap> {
        self.response
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|(_, headers)| headers.clone())
    }

    /// A named header of the captured response.
    pub fn response_header(&self, name: &str) -> Option<String> {
        self.response_headers()
            .and_then(|headers| headers.get(name).map(|value| value.as_str().to_string()))
    }
}

#[async_trait]
impl Request for RequestStub {
    fn subject(&self) -> &str {
        &self.subject
    }

    fn headers(&self) -> HeaderMap {
        self.headers.clone()
    }

    fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    async fn respond(&self, payload: Bytes, headers: Option<HeaderMap>) -> Result<(), PublishError> {
        let mut slot = self.response.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some((payload, headers.unwrap_or_default()));
        Ok(())
    }
}
