use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to decode payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("payload is not valid UTF-8: {0}")]
    InvalidText(#[from] std::string::FromUtf8Error),

    #[error("expected an empty payload")]
    UnexpectedPayload,
}

/// A pluggable encode/decode pair used by the typed layer.
pub trait TypeAdapter<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<Bytes, SchemaError>;
    fn decode(&self, data: &[u8]) -> Result<T, SchemaError>;
}

/// JSON adapter for structured types.
pub struct JsonAdapter<T>(PhantomData<fn() -> T>);

impl<T> Default for JsonAdapter<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Serialize + DeserializeOwned> TypeAdapter<T> for JsonAdapter<T> {
    fn encode(&self, value: &T) -> Result<Bytes, SchemaError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(SchemaError::Encode)
    }

    fn decode(&self, data: &[u8]) -> Result<T, SchemaError> {
        serde_json::from_slice(data).map_err(SchemaError::Decode)
    }
}

/// Plain-text adapter for string schemas.
pub struct TextAdapter;

impl TypeAdapter<String> for TextAdapter {
    fn encode(&self, value: &String) -> Result<Bytes, SchemaError> {
        Ok(Bytes::from(value.clone().into_bytes()))
    }

    fn decode(&self, data: &[u8]) -> Result<String, SchemaError> {
        Ok(String::from_utf8(data.to_vec())?)
    }
}

/// Raw passthrough adapter for byte schemas.
pub struct RawAdapter;

impl TypeAdapter<Bytes> for RawAdapter {
    fn encode(&self, value: &Bytes) -> Result<Bytes, SchemaError> {
        Ok(value.clone())
    }

    fn decode(&self, data: &[u8]) -> Result<Bytes, SchemaError> {
        Ok(Bytes::copy_from_slice(data))
    }
}

/// Adapter for schemas that carry no payload.
pub struct EmptyAdapter;

impl TypeAdapter<()> for EmptyAdapter {
    fn encode(&self, _value: &()) -> Result<Bytes, SchemaError> {
        Ok(Bytes::new())
    }

    fn decode(&self, data: &[u8]) -> Result<(), SchemaError> {
        if data.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::UnexpectedPayload)
        }
    }
}

/// A schema binds a type adapter to the content type advertised on
/// replies. Each constructor carries the default content type for its
/// payload shape; `with_content_type` overrides it.
pub struct Schema<T> {
    content_type: Option<&'static str>,
    adapter: Arc<dyn TypeAdapter<T>>,
}

impl<T> Clone for Schema<T> {
    fn clone(&self) -> Self {
        Self {
            content_type: self.content_type,
            adapter: self.adapter.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl<T> Schema<T> {
    pub fn with_adapter(adapter: Arc<dyn TypeAdapter<T>>, content_type: Option<&'static str>) -> Self {
        Self {
            content_type,
            adapter,
        }
    }

    pub fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn content_type(&self) -> Option<&'static str> {
        self.content_type
    }

    pub fn encode(&self, value: &T) -> Result<Bytes, SchemaError> {
        self.adapter.encode(value)
    }

    pub fn decode(&self, data: &[u8]) -> Result<T, SchemaError> {
        self.adapter.decode(data)
    }
}

impl<T: Serialize + DeserializeOwned + 'static> Schema<T> {
    /// JSON schema for a structured type.
    pub fn json() -> Self {
        Self {
            content_type: Some("application/json"),
            adapter: Arc::new(JsonAdapter::<T>::default()),
        }
    }
}

impl Schema<String> {
    /// Plain-text schema.
    pub fn text() -> Self {
        Self {
            content_type: Some("text/plain"),
            adapter: Arc::new(TextAdapter),
        }
    }
}

impl Schema<Bytes> {
    /// Opaque bytes schema.
    pub fn raw() -> Self {
        Self {
            content_type: Some("application/octet-stream"),
            adapter: Arc::new(RawAdapter),
        }
    }
}

impl Schema<()> {
    /// Schema for operations without a payload.
    pub fn empty() -> Self {
        Self {
            content_type: None,
            adapter: Arc::new(EmptyAdapter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        value: i64,
    }

    #[test]
    fn test_json_schema_round_trip() {
        let schema: Schema<Payload> = Schema::json();
        assert_eq!(schema.content_type(), Some("application/json"));
        let encoded = schema.encode(&Payload { value: 2 }).unwrap();
        assert_eq!(schema.decode(&encoded).unwrap(), Payload { value: 2 });
    }

    #[test]
    fn test_text_schema() {
        let schema = Schema::text();
        assert_eq!(schema.content_type(), Some("text/plain"));
        let encoded = schema.encode(&"hello".to_string()).unwrap();
        assert_eq!(&encoded[..], b"hello");
        assert_eq!(schema.decode(b"hello").unwrap(), "hello");
        assert!(schema.decode(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_raw_schema_is_passthrough() {
        let schema = Schema::raw();
        let payload = Bytes::from_static(b"\x00\x01\x02");
        assert_eq!(schema.encode(&payload).unwrap(), payload);
        assert_eq!(schema.decode(b"\x00\x01\x02").unwrap(), payload);
    }

    #[test]
    fn test_empty_schema_requires_empty_payload() {
        let schema = Schema::empty();
        assert_eq!(schema.content_type(), None);
        assert!(schema.encode(&()).unwrap().is_empty());
        schema.decode(b"").unwrap();
        assert!(matches!(
            schema.decode(b"data"),
            Err(SchemaError::UnexpectedPayload)
        ));
    }

    #[test]
    fn test_content_type_override() {
        let schema: Schema<Payload> = Schema::json().with_content_type("application/vnd.custom+json");
        assert_eq!(schema.content_type(), Some("application/vnd.custom+json"));
    }

    #[test]
    fn test_json_decode_failure() {
        let schema: Schema<Payload> = Schema::json();
        assert!(matches!(
            schema.decode(b"not json"),
            Err(SchemaError::Decode(_))
        ));
    }
}
