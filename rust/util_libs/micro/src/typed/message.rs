use crate::request::{Request, CONTENT_TYPE};
use crate::typed::address::Parameters;
use crate::typed::adapter::Schema;
use crate::typed::operation::OperationSpec;
use async_nats::HeaderMap;
use std::sync::Arc;

/// A decoded request flowing through a typed operation handler.
///
/// Wraps the underlying request and exposes the extracted address
/// parameters, the decoded payload, and typed reply operations that
/// encode through the operation's schemas.
pub struct TypedMessage<P, T, R, E> {
    request: Arc<dyn Request>,
    params: P,
    payload: T,
    response: Schema<R>,
    error: Schema<E>,
    status_code: u16,
}

impl<P: Parameters, T, R, E> TypedMessage<P, T, R, E> {
    pub(crate) fn from_request(
        request: Arc<dyn Request>,
        spec: &OperationSpec<P, T, R, E>,
    ) -> Result<Self, anyhow::Error> {
        let params = spec.address.parse_subject(request.subject())?;
        let payload = spec.request.decode(&request.payload())?;
        Ok(Self {
            request,
            params,
            payload,
            response: spec.response.clone(),
            error: spec.error.clone(),
            status_code: spec.status_code,
        })
    }

    /// The parameters decoded from the subject placeholders.
    pub fn params(&self) -> &P {
        &self.params
    }

    /// The decoded request body.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn headers(&self) -> HeaderMap {
        self.request.headers()
    }

    pub fn subject(&self) -> &str {
        self.request.subject()
    }

    /// Reply with the configured success code, encoding through the
    /// response schema and advertising its content type when known.
    pub async fn respond(&self, value: &R) -> Result<(), anyhow::Error> {
        let payload = self.response.encode(value)?;
        let mut headers = HeaderMap::new();
        if let Some(content_type) = self.response.content_type() {
            headers.insert(CONTENT_TYPE, content_type);
        }
        self.request
            .respond_success(self.status_code, payload, Some(headers))
            .await?;
        Ok(())
    }

    /// Reply with a typed error, encoding the optional body through the
    /// error schema.
    pub async fn respond_error(
        &self,
        code: u16,
        description: &str,
        body: Option<&E>,
    ) -> Result<(), anyhow::Error> {
        let mut headers = HeaderMap::new();
        let payload = match body {
            Some(body) => {
                if let Some(content_type) = self.error.content_type() {
                    headers.insert(CONTENT_TYPE, content_type);
                }
                self.error.encode(body)?
            }
            None => bytes::Bytes::new(),
        };
        self.request
            .respond_error(code, description, payload, Some(headers))
            .await?;
        Ok(())
    }
}
