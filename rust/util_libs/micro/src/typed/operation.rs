use crate::request::{Request, CONTENT_TYPE};
use crate::service::{Endpoint, Service};
use crate::typed::address::{Address, Parameters};
use crate::typed::adapter::Schema;
use crate::typed::message::TypedMessage;
use crate::types::{AsyncEndpointHandler, EndpointBuilder};
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

/// One entry of the catch table: matches a concrete error type and maps
/// it to a typed error reply.
struct CatchEntry<E> {
    code: u16,
    description: String,
    matcher: Box<dyn Fn(&anyhow::Error) -> bool + Send + Sync>,
    formatter: Option<Box<dyn Fn(&anyhow::Error) -> Option<E> + Send + Sync>>,
}

/// An ordered catch table consulted when a typed handler fails.
///
/// The first entry whose error type matches the raised error wins;
/// unmatched errors propagate to the generic 500 wrapper.
pub struct ErrorMapper<E> {
    entries: Vec<CatchEntry<E>>,
}

impl<E> Default for ErrorMapper<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for ErrorMapper<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorMapper")
            .field("entries", &self.entries.len())
            .finish()
    }
}

pub(crate) struct MappedError<E> {
    pub code: u16,
    pub description: String,
    pub body: Option<E>,
}

impl<E> ErrorMapper<E> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Map an error type to a status code and description.
    pub fn catches<Err>(mut self, code: u16, description: &str) -> Self
    where
        Err: std::error::Error + Send + Sync + 'static,
    {
        self.entries.push(CatchEntry {
            code,
            description: description.to_string(),
            matcher: Box::new(|err| err.is::<Err>()),
            formatter: None,
        });
        self
    }

    /// Map an error type and render a typed error body from it.
    pub fn catches_with<Err, F>(mut self, code: u16, description: &str, formatter: F) -> Self
    where
        Err: std::error::Error + Send + Sync + 'static,
        F: Fn(&Err) -> E + Send + Sync + 'static,
    {
        self.entries.push(CatchEntry {
            code,
            description: description.to_string(),
            matcher: Box::new(|err| err.is::<Err>()),
            formatter: Some(Box::new(move |err| err.downcast_ref::<Err>().map(&formatter))),
        });
        self
    }

    pub(crate) fn lookup(&self, err: &anyhow::Error) -> Option<MappedError<E>> {
        for entry in &self.entries {
            if (entry.matcher)(err) {
                return Some(MappedError {
                    code: entry.code,
                    description: entry.description.clone(),
                    body: entry.formatter.as_ref().and_then(|format| format(err)),
                });
            }
        }
        None
    }
}

/// The declaration of a typed operation: an address template, the
/// request/response/error schemas, the catch table and the success code.
pub struct OperationSpec<P, T, R, E> {
    pub name: String,
    pub address: Address<P>,
    pub request: Schema<T>,
    pub response: Schema<R>,
    pub error: Schema<E>,
    pub catch: ErrorMapper<E>,
    pub status_code: u16,
    pub metadata: HashMap<String, String>,
}

impl<P, T, R, E> std::fmt::Debug for OperationSpec<P, T, R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationSpec")
            .field("name", &self.name)
            .field("address", &self.address.template())
            .field("status_code", &self.status_code)
            .finish()
    }
}

impl<P: Parameters, T, R, E> OperationSpec<P, T, R, E> {
    pub fn new(
        name: &str,
        address: Address<P>,
        request: Schema<T>,
        response: Schema<R>,
        error: Schema<E>,
    ) -> Self {
        Self {
            name: name.to_string(),
            address,
            request,
            response,
            error,
            catch: ErrorMapper::new(),
            status_code: 200,
            metadata: HashMap::new(),
        }
    }

    pub fn catch(mut self, catch: ErrorMapper<E>) -> Self {
        self.catch = catch;
        self
    }

    pub fn status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A typed endpoint implementation bound to an [OperationSpec].
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    type Params: Parameters + Send + Sync + 'static;
    type Request: Send + Sync + 'static;
    type Response: Send + Sync + 'static;
    type Error: Send + Sync + 'static;

    async fn handle(
        &self,
        message: TypedMessage<Self::Params, Self::Request, Self::Response, Self::Error>,
    ) -> Result<(), anyhow::Error>;
}

/// Register a typed operation as a service endpoint.
///
/// Decoding failures and handler errors are matched against the catch
/// table; anything unmatched falls through to the generic 500 path of
/// the service dispatcher. A second operation on the same subject is
/// rejected at registration: the subject scan and the endpoint push run
/// under the service's endpoint-list lock.
pub async fn add_operation<O: Operation>(
    service: &Service,
    spec: OperationSpec<O::Params, O::Request, O::Response, O::Error>,
    operation: Arc<O>,
) -> Result<Endpoint, async_nats::Error> {
    let subject = spec.address.subject_filter().to_string();
    let name = spec.name.clone();
    let metadata = spec.metadata.clone();
    let spec = Arc::new(spec);
    let handler: AsyncEndpointHandler = Arc::new(move |request: Arc<dyn Request>| {
        let spec = spec.clone();
        let operation = operation.clone();
        Box::pin(async move {
            let outcome = async {
                let message = TypedMessage::from_request(request.clone(), &spec)?;
                operation.handle(message).await
            }
            .await;
            let Err(err) = outcome else { return Ok(()) };
            let Some(mapped) = spec.catch.lookup(&err) else {
                return Err(err);
            };
            let mut headers = HeaderMap::new();
            let payload = match &mapped.body {
                Some(body) => {
                    if let Some(content_type) = spec.error.content_type() {
                        headers.insert(CONTENT_TYPE, content_type);
                    }
                    spec.error.encode(body)?
                }
                None => Bytes::new(),
            };
            request
                .respond_error(mapped.code, &mapped.description, payload, Some(headers))
                .await?;
            Ok(())
        })
    });

    service
        .add_unique_endpoint(
            EndpointBuilder::new(&name, handler)
                .subject(&subject)
                .metadata(metadata),
        )
        .await
}
