use crate::context::Context;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn test_teardown_runs_in_reverse_order() {
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let context = Context::new();

    for label in ["first", "second", "third"] {
        let order = order.clone();
        context.push_teardown(move || async move {
            order.lock().unwrap_or_else(|e| e.into_inner()).push(label);
        });
    }
    context.shutdown().await;

    assert_eq!(
        *order.lock().unwrap_or_else(|e| e.into_inner()),
        vec!["third", "second", "first"]
    );
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let context = Context::new();
    {
        let order = order.clone();
        context.push_teardown(move || async move {
            order.lock().unwrap_or_else(|e| e.into_inner()).push("only");
        });
    }
    context.shutdown().await;
    context.shutdown().await;
    assert_eq!(
        *order.lock().unwrap_or_else(|e| e.into_inner()),
        vec!["only"]
    );
}

#[tokio::test]
async fn test_cancel_flag() {
    let context = Context::new();
    assert!(!context.cancelled());
    context.cancel();
    assert!(context.cancelled());
    // wait returns immediately once cancelled
    context.wait().await;
}

#[tokio::test]
async fn test_wait_for_returns_output_when_not_cancelled() {
    let context = Context::new();
    let output = context.wait_for(async { 42 }).await;
    assert_eq!(output, Some(42));
}

#[tokio::test]
async fn test_wait_for_loses_to_cancel() {
    let context = Arc::new(Context::new());
    let waiter = context.clone();
    let task = tokio::spawn(async move {
        waiter
            .wait_for(std::future::pending::<()>())
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    context.cancel();
    let output = task.await.expect("Task panicked");
    assert_eq!(output, None);
    assert!(context.cancelled());
}

#[tokio::test]
async fn test_add_service_requires_connection() {
    let context = Context::new();
    let result = context
        .add_service(crate::types::ServiceBuilder::new("service1", "0.0.1"))
        .await;
    assert!(result.is_err());
}
