use bytes::Bytes;
use micro_utils::{apply_middlewares, AsyncEndpointHandler, Middleware, Request};
use micro_utils::request::{NATS_SERVICE_ERROR_CODE, NATS_SERVICE_SUCCESS_CODE};
use mock_utils::request_stub::RequestStub;
use std::sync::Arc;

fn echo_handler() -> AsyncEndpointHandler {
    Arc::new(|req: Arc<dyn Request>| {
        Box::pin(async move {
            req.respond(req.payload(), None).await?;
            Ok(())
        })
    })
}

#[tokio::test]
async fn test_stub_captures_success_reply() {
    let stub = Arc::new(RequestStub::new("ECHO", b"hello".to_vec()));
    stub.respond_success(200, Bytes::from_static(b"ok"), None)
        .await
        .expect("Stub respond failed");
    assert_eq!(stub.response_payload(), Some(Bytes::from_static(b"ok")));
    assert_eq!(
        stub.response_header(NATS_SERVICE_SUCCESS_CODE),
        Some("200".to_string())
    );
}

#[tokio::test]
async fn test_stub_captures_error_reply() {
    let stub = Arc::new(RequestStub::new("ECHO", Vec::new()));
    stub.respond_error(400, "Bad request", Bytes::new(), None)
        .await
        .expect("Stub respond failed");
    assert_eq!(
        stub.response_header(NATS_SERVICE_ERROR_CODE),
        Some("400".to_string())
    );
    assert_eq!(
        stub.response_header("Nats-Service-Error"),
        Some("Bad request".to_string())
    );
}

#[tokio::test]
async fn test_middleware_chain_publishes_once() {
    let tagging: Middleware = Arc::new(|request, next| {
        Box::pin(async move {
            let response = next(request).await?;
            Ok(response.map(|mut response| {
                response.add_header("X-Middleware", "seen");
                response
            }))
        })
    });

    let handler = apply_middlewares(echo_handler(), vec![tagging]);
    let stub = Arc::new(RequestStub::new("ECHO", b"hello".to_vec()));
    handler(stub.clone()).await.expect("Handler failed");

    assert_eq!(stub.response_payload(), Some(Bytes::from_static(b"hello")));
    assert_eq!(stub.response_header("X-Middleware"), Some("seen".to_string()));
}

#[tokio::test]
async fn test_middleware_order_is_outermost_first() {
    let order: Arc<std::sync::Mutex<Vec<&'static str>>> =
        Arc::new(std::sync::Mutex::new(Vec::new()));

    let record = |label: &'static str, order: Arc<std::sync::Mutex<Vec<&'static str>>>| -> Middleware {
        Arc::new(move |request, next| {
            let order = order.clone();
            Box::pin(async move {
                order.lock().unwrap_or_else(|e| e.into_inner()).push(label);
                next(request).await
            })
        })
    };

    let handler = apply_middlewares(
        echo_handler(),
        vec![
            record("outer", order.clone()),
            record("inner", order.clone()),
        ],
    );
    let stub = Arc::new(RequestStub::new("ECHO", b"x".to_vec()));
    handler(stub).await.expect("Handler failed");

    assert_eq!(
        *order.lock().unwrap_or_else(|e| e.into_inner()),
        vec!["outer", "inner"]
    );
}

#[tokio::test]
async fn test_swallowing_middleware_publishes_nothing() {
    let swallow: Middleware = Arc::new(|request, next| {
        Box::pin(async move {
            let _ = next(request).await?;
            Ok(None)
        })
    });

    let handler = apply_middlewares(echo_handler(), vec![swallow]);
    let stub = Arc::new(RequestStub::new("ECHO", b"hello".to_vec()));
    handler(stub.clone()).await.expect("Handler failed");

    assert_eq!(stub.response_payload(), None);
}

#[tokio::test]
async fn test_handler_without_reply_publishes_nothing() {
    let silent: AsyncEndpointHandler =
        Arc::new(|_req: Arc<dyn Request>| Box::pin(async move { Ok(()) }));

    let passthrough: Middleware = Arc::new(|request, next| Box::pin(async move { next(request).await }));

    let handler = apply_middlewares(silent, vec![passthrough]);
    let stub = Arc::new(RequestStub::new("ECHO", b"hello".to_vec()));
    handler(stub.clone()).await.expect("Handler failed");

    assert_eq!(stub.response_payload(), None);
}
