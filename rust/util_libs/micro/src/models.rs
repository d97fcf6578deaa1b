use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PING_RESPONSE_TYPE: &str = "io.nats.micro.v1.ping_response";
pub const INFO_RESPONSE_TYPE: &str = "io.nats.micro.v1.info_response";
pub const STATS_RESPONSE_TYPE: &str = "io.nats.micro.v1.stats_response";

/// The response to a ping request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PingInfo {
    pub name: String,
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// The information of a single endpoint, as listed by an info response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub name: String,
    pub subject: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub queue_group: String,
}

/// The response to an info request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub endpoints: Vec<EndpointInfo>,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// The statistics of a single endpoint.
///
/// `processing_time` and `average_processing_time` are expressed in
/// nanoseconds; the average is the integer quotient of the cumulative
/// processing time by the number of requests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EndpointStats {
    pub name: String,
    pub subject: String,
    #[serde(default)]
    pub num_requests: u64,
    #[serde(default)]
    pub num_errors: u64,
    #[serde(default)]
    pub last_error: String,
    #[serde(default)]
    pub processing_time: u64,
    #[serde(default)]
    pub average_processing_time: u64,
    pub queue_group: String,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

/// The response to a stats request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub name: String,
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub started: String,
    #[serde(default)]
    pub endpoints: Vec<EndpointStats>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_info_round_trip() {
        let info = PingInfo {
            name: "service1".to_string(),
            id: "123456789".to_string(),
            version: "0.0.1".to_string(),
            metadata: HashMap::new(),
            kind: PING_RESPONSE_TYPE.to_string(),
        };
        let encoded = serde_json::to_vec(&info).unwrap();
        let decoded: PingInfo = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn test_type_discriminator_uses_wire_name() {
        let info = PingInfo {
            name: "service1".to_string(),
            id: "123456789".to_string(),
            version: "0.0.1".to_string(),
            metadata: HashMap::new(),
            kind: PING_RESPONSE_TYPE.to_string(),
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["type"], PING_RESPONSE_TYPE);
        assert!(value.get("kind").is_none());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let decoded: ServiceInfo = serde_json::from_str(
            r#"{
                "name": "service1",
                "id": "abc",
                "version": "1.0.0",
                "endpoints": [],
                "future_field": {"nested": true},
                "type": "io.nats.micro.v1.info_response"
            }"#,
        )
        .unwrap();
        assert_eq!(decoded.name, "service1");
        assert_eq!(decoded.kind, INFO_RESPONSE_TYPE);
        assert_eq!(decoded.description, "");
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let decoded: EndpointStats = serde_json::from_str(
            r#"{"name": "echo", "subject": "ECHO", "queue_group": "q"}"#,
        )
        .unwrap();
        assert_eq!(decoded.num_requests, 0);
        assert_eq!(decoded.num_errors, 0);
        assert_eq!(decoded.last_error, "");
        assert_eq!(decoded.processing_time, 0);
        assert!(decoded.data.is_empty());
    }
}
