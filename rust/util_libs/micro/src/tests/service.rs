use super::{echo_handler, failing_handler};
use crate::client::{Client, ServiceError};
use crate::service::add_service;
use crate::types::{EndpointBuilder, GroupBuilder, ServiceBuilder};
use anyhow::Result;
use bytes::Bytes;
use mock_utils::test_nats_server::{check_nats_server, TestNatsServer};
use serial_test::serial;
use std::time::Duration;

fn test_service_builder() -> ServiceBuilder {
    ServiceBuilder::new("service1", "0.0.1").id_generator(|| "123456789".to_string())
}

#[tokio::test]
#[serial]
async fn test_echo_endpoint_and_stats() -> Result<()> {
    if !check_nats_server() {
        log::debug!("Skipping test: nats-server not available");
        return Ok(());
    }

    let server = TestNatsServer::new().await?;
    let nats = server.connect(&server.port).await?;

    let service = add_service(nats.clone(), test_service_builder())?;
    service.start().await.map_err(anyhow::Error::from_boxed)?;
    let endpoint = service
        .add_endpoint(EndpointBuilder::new("echo", echo_handler()).subject("ECHO"))
        .await
        .expect("Failed to add endpoint");

    let client = Client::new(nats.clone());
    let response = client
        .request("ECHO", Bytes::from_static(b"hello"), None, None)
        .await
        .expect("Echo request failed");
    assert_eq!(&response.payload[..], b"hello");
    assert!(response
        .headers
        .as_ref()
        .map(|headers| headers.iter().count() == 0)
        .unwrap_or(true));

    let stats = endpoint.stats().await;
    assert_eq!(stats.num_requests, 1);
    assert_eq!(stats.num_errors, 0);
    assert!(stats.processing_time > 0);
    assert_eq!(
        stats.average_processing_time,
        stats.processing_time / stats.num_requests
    );

    service.stop().await.map_err(anyhow::Error::from_boxed)?;
    let _ = server.shutdown().await;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_handler_failure_maps_to_500() -> Result<()> {
    if !check_nats_server() {
        log::debug!("Skipping test: nats-server not available");
        return Ok(());
    }

    let server = TestNatsServer::new().await?;
    let nats = server.connect(&server.port).await?;

    let service = add_service(nats.clone(), test_service_builder())?;
    service.start().await.map_err(anyhow::Error::from_boxed)?;
    let endpoint = service
        .add_endpoint(EndpointBuilder::new("broken", failing_handler("boom")))
        .await
        .expect("Failed to add endpoint");

    let client = Client::new(nats.clone());
    let err = client
        .request("broken", Bytes::from_static(b"hi"), None, None)
        .await
        .expect_err("The handler failure should surface as an error");
    let service_err = err
        .downcast::<ServiceError>()
        .expect("Expected a service error");
    assert_eq!(service_err.code, 500);
    assert_eq!(service_err.description, "Internal Server Error");
    assert!(service_err.data.is_empty());

    let stats = endpoint.stats().await;
    assert_eq!(stats.num_requests, 1);
    assert_eq!(stats.num_errors, 1);
    assert_eq!(stats.last_error, "boom");

    service.stop().await.map_err(anyhow::Error::from_boxed)?;
    let _ = server.shutdown().await;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_group_prefixes_and_queue_groups() -> Result<()> {
    if !check_nats_server() {
        log::debug!("Skipping test: nats-server not available");
        return Ok(());
    }

    let server = TestNatsServer::new().await?;
    let nats = server.connect(&server.port).await?;

    let service = add_service(nats.clone(), test_service_builder())?;
    service.start().await.map_err(anyhow::Error::from_boxed)?;

    let group1 = service.add_group(GroupBuilder::new("group1").queue_group("q1"))?;
    let ep1 = group1
        .add_endpoint(EndpointBuilder::new("endpoint1", echo_handler()))
        .await
        .expect("Failed to add endpoint");
    assert_eq!(ep1.info().subject, "group1.endpoint1");
    assert_eq!(ep1.info().queue_group, "q1");

    let group2 = group1.add_group(GroupBuilder::new("group2").queue_group("q2"))?;
    let ep2 = group2
        .add_endpoint(EndpointBuilder::new("endpoint1", echo_handler()))
        .await
        .expect("Failed to add endpoint");
    assert_eq!(ep2.info().subject, "group1.group2.endpoint1");
    assert_eq!(ep2.info().queue_group, "q2");

    // The nested subject is live.
    let client = Client::new(nats.clone());
    let response = client
        .request(
            "group1.group2.endpoint1",
            Bytes::from_static(b"ping"),
            None,
            None,
        )
        .await
        .expect("Request to nested endpoint failed");
    assert_eq!(&response.payload[..], b"ping");

    service.stop().await.map_err(anyhow::Error::from_boxed)?;
    let _ = server.shutdown().await;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_info_lists_endpoints_in_insertion_order() -> Result<()> {
    if !check_nats_server() {
        log::debug!("Skipping test: nats-server not available");
        return Ok(());
    }

    let server = TestNatsServer::new().await?;
    let nats = server.connect(&server.port).await?;

    let service = add_service(nats.clone(), test_service_builder())?;
    service.start().await.map_err(anyhow::Error::from_boxed)?;
    service
        .add_endpoint(EndpointBuilder::new("endpoint1", echo_handler()))
        .await
        .expect("Failed to add endpoint");
    service
        .add_endpoint(EndpointBuilder::new("endpoint2", echo_handler()))
        .await
        .expect("Failed to add endpoint");

    let info = service.info().await;
    let names: Vec<&str> = info.endpoints.iter().map(|ep| ep.name.as_str()).collect();
    assert_eq!(names, ["endpoint1", "endpoint2"]);
    assert_eq!(info.endpoints[0].subject, "endpoint1");
    assert_eq!(info.endpoints[0].queue_group, "q");

    let stats = service.stats().await;
    let names: Vec<&str> = stats.endpoints.iter().map(|ep| ep.name.as_str()).collect();
    assert_eq!(names, ["endpoint1", "endpoint2"]);

    service.stop().await.map_err(anyhow::Error::from_boxed)?;
    let _ = server.shutdown().await;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_stopped_service_is_silent() -> Result<()> {
    if !check_nats_server() {
        log::debug!("Skipping test: nats-server not available");
        return Ok(());
    }

    let server = TestNatsServer::new().await?;
    let nats = server.connect(&server.port).await?;

    let service = add_service(nats.clone(), test_service_builder())?;
    service.start().await.map_err(anyhow::Error::from_boxed)?;
    service
        .add_endpoint(EndpointBuilder::new("echo", echo_handler()))
        .await
        .expect("Failed to add endpoint");

    service.stop().await.map_err(anyhow::Error::from_boxed)?;
    assert!(service.stopped());

    // Adding endpoints to a stopped service is a usage error.
    let result = service
        .add_endpoint(EndpointBuilder::new("late", echo_handler()))
        .await;
    assert!(result.is_err());

    // Neither endpoints nor monitoring subjects reply any more.
    let client = Client::new(nats.clone());
    assert!(client
        .request(
            "echo",
            Bytes::from_static(b"hello"),
            None,
            Some(Duration::from_millis(250)),
        )
        .await
        .is_err());
    assert!(client
        .request(
            "$SRV.PING.service1.123456789",
            Bytes::new(),
            None,
            Some(Duration::from_millis(250)),
        )
        .await
        .is_err());

    let _ = server.shutdown().await;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_reset_is_idempotent_on_quiescent_service() -> Result<()> {
    if !check_nats_server() {
        log::debug!("Skipping test: nats-server not available");
        return Ok(());
    }

    let server = TestNatsServer::new().await?;
    let nats = server.connect(&server.port).await?;

    let service = add_service(nats.clone(), test_service_builder())?;
    service.start().await.map_err(anyhow::Error::from_boxed)?;
    let endpoint = service
        .add_endpoint(EndpointBuilder::new("echo", echo_handler()))
        .await
        .expect("Failed to add endpoint");

    let client = Client::new(nats.clone());
    client
        .request("echo", Bytes::from_static(b"hello"), None, None)
        .await
        .expect("Echo request failed");
    assert_eq!(endpoint.stats().await.num_requests, 1);

    service.reset().await;
    let after_reset = endpoint.stats().await;
    assert_eq!(after_reset.num_requests, 0);
    assert_eq!(after_reset.processing_time, 0);

    service.reset().await;
    assert_eq!(endpoint.stats().await, after_reset);

    service.stop().await.map_err(anyhow::Error::from_boxed)?;
    let _ = server.shutdown().await;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_invalid_service_configs_are_rejected() -> Result<()> {
    if !check_nats_server() {
        log::debug!("Skipping test: nats-server not available");
        return Ok(());
    }

    let server = TestNatsServer::new().await?;
    let nats = server.connect(&server.port).await?;

    assert!(add_service(nats.clone(), ServiceBuilder::new("bad name", "0.0.1")).is_err());
    assert!(add_service(nats.clone(), ServiceBuilder::new("service1", "not-semver")).is_err());

    let service = add_service(nats.clone(), test_service_builder())?;
    assert!(service.add_group(GroupBuilder::new("group.>")).is_err());

    let _ = server.shutdown().await;
    Ok(())
}
