use crate::client::{Client, ServiceError};
use crate::request::{CONTENT_TYPE, NATS_SERVICE_SUCCESS_CODE};
use crate::service::add_service;
use crate::typed::address::{Address, AddressError, ParamValue, Parameters};
use crate::typed::adapter::Schema;
use crate::typed::client::{Reply, TypedClient};
use crate::typed::message::TypedMessage;
use crate::typed::operation::{add_operation, ErrorMapper, Operation, OperationSpec};
use crate::types::ServiceBuilder;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use mock_utils::test_nats_server::{check_nats_server, TestNatsServer};
use serde::{Deserialize, Serialize};
use serial_test::serial;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq)]
struct DeviceParams {
    device_id: String,
}

impl Parameters for DeviceParams {
    fn fields() -> &'static [&'static str] {
        &["device_id"]
    }

    fn get(&self, field: &str) -> Option<ParamValue> {
        match field {
            "device_id" => Some(ParamValue::Token(self.device_id.clone())),
            _ => None,
        }
    }

    fn from_values(mut values: HashMap<String, ParamValue>) -> Result<Self, AddressError> {
        match values.remove("device_id") {
            Some(ParamValue::Token(device_id)) => Ok(Self { device_id }),
            _ => Err(AddressError::MissingValue("device_id".to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct MultiplyRequest {
    value: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct MultiplyResponse {
    result: i64,
}

#[derive(Debug, Error)]
#[error("malformed request data")]
struct MalformedRequest;

struct MultiplyOperation;

#[async_trait]
impl Operation for MultiplyOperation {
    type Params = DeviceParams;
    type Request = MultiplyRequest;
    type Response = MultiplyResponse;
    type Error = String;

    async fn handle(
        &self,
        message: TypedMessage<DeviceParams, MultiplyRequest, MultiplyResponse, String>,
    ) -> Result<(), anyhow::Error> {
        let value = message.payload().value;
        if value < 0 {
            return Err(MalformedRequest.into());
        }
        message
            .respond(&MultiplyResponse { result: value * 7 })
            .await
    }
}

fn multiply_spec() -> OperationSpec<DeviceParams, MultiplyRequest, MultiplyResponse, String> {
    OperationSpec::new(
        "multiply",
        Address::new("foo.{device_id}").expect("Valid address template"),
        Schema::json(),
        Schema::json(),
        Schema::text(),
    )
    .catch(ErrorMapper::new().catches_with::<MalformedRequest, _>(
        400,
        "Bad request",
        |_err| "Request failed due to malformed request data".to_string(),
    ))
}

#[tokio::test]
#[serial]
async fn test_typed_operation_success() -> Result<()> {
    if !check_nats_server() {
        log::debug!("Skipping test: nats-server not available");
        return Ok(());
    }

    let server = TestNatsServer::new().await?;
    let nats = server.connect(&server.port).await?;

    let service = add_service(nats.clone(), ServiceBuilder::new("devices", "0.0.1"))?;
    service.start().await.map_err(anyhow::Error::from_boxed)?;
    add_operation(&service, multiply_spec(), Arc::new(MultiplyOperation))
        .await
        .expect("Failed to add operation");

    let client = Client::new(nats.clone());
    let response = client
        .request(
            "foo.123",
            Bytes::from_static(b"{\"value\":2}"),
            None,
            None,
        )
        .await
        .expect("Typed request failed");

    let decoded: MultiplyResponse = serde_json::from_slice(&response.payload)?;
    assert_eq!(decoded, MultiplyResponse { result: 14 });
    let headers = response.headers.expect("Expected reply headers");
    assert_eq!(
        headers
            .get(NATS_SERVICE_SUCCESS_CODE)
            .map(|v| v.as_str().to_string()),
        Some("200".to_string())
    );
    assert_eq!(
        headers.get(CONTENT_TYPE).map(|v| v.as_str().to_string()),
        Some("application/json".to_string())
    );

    service.stop().await.map_err(anyhow::Error::from_boxed)?;
    let _ = server.shutdown().await;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_typed_operation_catch_table() -> Result<()> {
    if !check_nats_server() {
        log::debug!("Skipping test: nats-server not available");
        return Ok(());
    }

    let server = TestNatsServer::new().await?;
    let nats = server.connect(&server.port).await?;

    let service = add_service(nats.clone(), ServiceBuilder::new("devices", "0.0.1"))?;
    service.start().await.map_err(anyhow::Error::from_boxed)?;
    add_operation(&service, multiply_spec(), Arc::new(MultiplyOperation))
        .await
        .expect("Failed to add operation");

    let client = Client::new(nats.clone());
    let err = client
        .request(
            "foo.123",
            Bytes::from_static(b"{\"value\":-1}"),
            None,
            None,
        )
        .await
        .expect_err("Negative values should be rejected");
    let service_err = err
        .downcast::<ServiceError>()
        .expect("Expected a service error");
    assert_eq!(service_err.code, 400);
    assert_eq!(service_err.description, "Bad request");
    assert_eq!(
        &service_err.data[..],
        b"Request failed due to malformed request data"
    );

    service.stop().await.map_err(anyhow::Error::from_boxed)?;
    let _ = server.shutdown().await;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_typed_operation_unmatched_error_is_500() -> Result<()> {
    if !check_nats_server() {
        log::debug!("Skipping test: nats-server not available");
        return Ok(());
    }

    let server = TestNatsServer::new().await?;
    let nats = server.connect(&server.port).await?;

    let service = add_service(nats.clone(), ServiceBuilder::new("devices", "0.0.1"))?;
    service.start().await.map_err(anyhow::Error::from_boxed)?;
    add_operation(&service, multiply_spec(), Arc::new(MultiplyOperation))
        .await
        .expect("Failed to add operation");

    // A payload that fails to decode raises outside the catch table
    // (only MalformedRequest is mapped), so the generic 500 path answers.
    let client = Client::new(nats.clone());
    let err = client
        .request("foo.123", Bytes::from_static(b"not json"), None, None)
        .await
        .expect_err("Undecodable payloads should be rejected");
    let service_err = err
        .downcast::<ServiceError>()
        .expect("Expected a service error");
    assert_eq!(service_err.code, 500);
    assert_eq!(service_err.description, "Internal Server Error");

    service.stop().await.map_err(anyhow::Error::from_boxed)?;
    let _ = server.shutdown().await;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_duplicate_operation_subject_is_rejected() -> Result<()> {
    if !check_nats_server() {
        log::debug!("Skipping test: nats-server not available");
        return Ok(());
    }

    let server = TestNatsServer::new().await?;
    let nats = server.connect(&server.port).await?;

    let service = add_service(nats.clone(), ServiceBuilder::new("devices", "0.0.1"))?;
    service.start().await.map_err(anyhow::Error::from_boxed)?;
    add_operation(&service, multiply_spec(), Arc::new(MultiplyOperation))
        .await
        .expect("Failed to add operation");
    let duplicate = add_operation(&service, multiply_spec(), Arc::new(MultiplyOperation)).await;
    assert!(duplicate.is_err());

    service.stop().await.map_err(anyhow::Error::from_boxed)?;
    let _ = server.shutdown().await;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_typed_client_round_trip() -> Result<()> {
    if !check_nats_server() {
        log::debug!("Skipping test: nats-server not available");
        return Ok(());
    }

    let server = TestNatsServer::new().await?;
    let nats = server.connect(&server.port).await?;

    let service = add_service(nats.clone(), ServiceBuilder::new("devices", "0.0.1"))?;
    service.start().await.map_err(anyhow::Error::from_boxed)?;
    add_operation(&service, multiply_spec(), Arc::new(MultiplyOperation))
        .await
        .expect("Failed to add operation");

    let client = TypedClient::new(nats.clone());
    let spec = multiply_spec();

    let request = spec
        .request_to_send(
            &DeviceParams {
                device_id: "123".to_string(),
            },
            &MultiplyRequest { value: 3 },
        )
        .expect("Failed to build request");
    assert_eq!(request.subject, "foo.123");
    match client.send(request, None).await.map_err(|e| anyhow::anyhow!(e))? {
        Reply::Ok { data, .. } => assert_eq!(data, MultiplyResponse { result: 21 }),
        Reply::Err { code, .. } => panic!("Unexpected error reply: {code}"),
    }

    let request = spec
        .request_to_send(
            &DeviceParams {
                device_id: "123".to_string(),
            },
            &MultiplyRequest { value: -2 },
        )
        .expect("Failed to build request");
    match client.send(request, None).await.map_err(|e| anyhow::anyhow!(e))? {
        Reply::Ok { .. } => panic!("Negative values should produce an error reply"),
        Reply::Err {
            code,
            description,
            data,
        } => {
            assert_eq!(code, 400);
            assert_eq!(description, "Bad request");
            assert_eq!(
                data.as_deref(),
                Some("Request failed due to malformed request data")
            );
        }
    }

    service.stop().await.map_err(anyhow::Error::from_boxed)?;
    let _ = server.shutdown().await;
    Ok(())
}
