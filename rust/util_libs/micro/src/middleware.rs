use crate::request::Request;
use crate::types::AsyncEndpointHandler;
use async_nats::{HeaderMap, PublishError};
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// A reply captured from the wrapped handler instead of being published.
///
/// Middlewares may inspect and rewrite the payload and headers before the
/// outermost wrapper publishes it on the original request.
#[derive(Clone, Debug, Default)]
pub struct Response {
    payload: Bytes,
    headers: HeaderMap,
}

impl Response {
    pub fn new(payload: Bytes, headers: HeaderMap) -> Self {
        Self { payload, headers }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn set_payload(&mut self, payload: Bytes) {
        self.payload = payload;
    }

    pub fn clear_payload(&mut self) {
        self.payload = Bytes::new();
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name, value);
    }

    pub fn set_headers(&mut self, headers: HeaderMap) {
        self.headers = headers;
    }

    pub fn clear_headers(&mut self) {
        self.headers = HeaderMap::new();
    }
}

/// The continuation of a middleware chain.
///
/// Returns the response the wrapped handler captured, or `None` when the
/// handler completed without replying.
pub type NextHandler = Arc<
    dyn Fn(
            Arc<dyn Request>,
        )
            -> Pin<Box<dyn Future<Output = Result<Option<Response>, anyhow::Error>> + Send>>
        + Send
        + Sync,
>;

/// A middleware wraps a handler: it receives the request and the rest of
/// the chain, and returns the response to publish (or `None` to swallow
/// it, in which case nothing is published).
pub type Middleware = Arc<
    dyn Fn(
            Arc<dyn Request>,
            NextHandler,
        )
            -> Pin<Box<dyn Future<Output = Result<Option<Response>, anyhow::Error>> + Send>>
        + Send
        + Sync,
>;

/// Wrap a handler in an ordered list of middlewares.
///
/// The first middleware of the list is the outermost one. The terminal
/// handler runs against a capturing request, so the reply travels back
/// through the chain and is published exactly once by the outer wrapper.
pub fn apply_middlewares(handler: AsyncEndpointHandler, middlewares: Vec<Middleware>) -> AsyncEndpointHandler {
    if middlewares.is_empty() {
        return handler;
    }
    let mut next = terminal_handler(handler);
    for middleware in middlewares.into_iter().rev() {
        next = chain(middleware, next);
    }
    Arc::new(move |request: Arc<dyn Request>| {
        let next = next.clone();
        Box::pin(async move {
            if let Some(response) = next(request.clone()).await? {
                request
                    .respond(response.payload, Some(response.headers))
                    .await?;
            }
            Ok(())
        })
    })
}

fn terminal_handler(handler: AsyncEndpointHandler) -> NextHandler {
    Arc::new(move |request: Arc<dyn Request>| {
        let handler = handler.clone();
        Box::pin(async move {
            let captured = Arc::new(CapturedRequest::new(request));
            handler(captured.clone()).await?;
            Ok(captured.take_response())
        })
    })
}

fn chain(middleware: Middleware, next: NextHandler) -> NextHandler {
    Arc::new(move |request: Arc<dyn Request>| {
        let middleware = middleware.clone();
        let next = next.clone();
        Box::pin(async move { middleware(request, next).await })
    })
}

/// A request wrapper that records the reply instead of publishing it.
struct CapturedRequest {
    inner: Arc<dyn Request>,
    response: Mutex<Option<Response>>,
}

impl CapturedRequest {
    fn new(inner: Arc<dyn Request>) -> Self {
        Self {
            inner,
            response: Mutex::new(None),
        }
    }

    fn take_response(&self) -> Option<Response> {
        self.response.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

#[async_trait]
impl Request for CapturedRequest {
    fn subject(&self) -> &str {
        self.inner.subject()
    }

    fn headers(&self) -> HeaderMap {
        self.inner.headers()
    }

    fn payload(&self) -> Bytes {
        self.inner.payload()
    }

    async fn respond(&self, payload: Bytes, headers: Option<HeaderMap>) -> Result<(), PublishError> {
        let mut slot = self.response.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(Response::new(payload, headers.unwrap_or_default()));
        Ok(())
    }
}
