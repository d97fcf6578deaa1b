pub mod context;
pub mod service;
pub mod typed;

use crate::request::Request;
use crate::types::AsyncEndpointHandler;
use std::sync::Arc;

/// A handler that echoes the request payload back.
pub fn echo_handler() -> AsyncEndpointHandler {
    Arc::new(|req: Arc<dyn Request>| {
        Box::pin(async move {
            req.respond(req.payload(), None).await?;
            Ok(())
        })
    })
}

/// A handler that always fails.
pub fn failing_handler(message: &'static str) -> AsyncEndpointHandler {
    Arc::new(move |_req: Arc<dyn Request>| {
        Box::pin(async move { Err(anyhow::anyhow!(message)) })
    })
}
