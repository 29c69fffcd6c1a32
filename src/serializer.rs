//! MIME-type-keyed (de)serializer registry (§4.1). Structured request/response bodies are
//! represented generically as `serde_json::Value`, mirroring the source's use of plain
//! dictionaries/lists for any JSON-like payload regardless of MIME type.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use mime::Mime;

use crate::error::TransportError;

/// Converts a structured body to and from wire bytes for one MIME type.
pub trait Serializer: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// Returns [`TransportError::Serialization`] if `value` cannot be represented in this
    /// format.
    fn serialize(&self, value: &serde_json::Value) -> Result<Bytes, TransportError>;

    /// # Errors
    /// Returns [`TransportError::Serialization`] if `bytes` is not valid for this format.
    fn deserialize(&self, bytes: &[u8]) -> Result<serde_json::Value, TransportError>;
}

fn serialization_error(err: impl std::error::Error + Send + Sync + 'static) -> TransportError {
    TransportError::Serialization(Box::new(err))
}

#[derive(Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &serde_json::Value) -> Result<Bytes, TransportError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(serialization_error)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<serde_json::Value, TransportError> {
        serde_json::from_slice(bytes).map_err(serialization_error)
    }
}

/// Newline-delimited JSON: the structured body must be a JSON array; each element becomes one
/// line.
#[derive(Debug, Default)]
pub struct NdjsonSerializer;

impl Serializer for NdjsonSerializer {
    fn serialize(&self, value: &serde_json::Value) -> Result<Bytes, TransportError> {
        let items = value.as_array().ok_or_else(|| {
            TransportError::Validation("ndjson body must be a JSON array".to_owned())
        })?;
        let mut out = Vec::new();
        for item in items {
            serde_json::to_writer(&mut out, item).map_err(serialization_error)?;
            out.push(b'\n');
        }
        Ok(Bytes::from(out))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<serde_json::Value, TransportError> {
        let text = std::str::from_utf8(bytes)
            .map_err(serialization_error)?;
        let mut items = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            items.push(serde_json::from_str(line).map_err(serialization_error)?);
        }
        Ok(serde_json::Value::Array(items))
    }
}

/// Plain text: the structured body must be a JSON string.
#[derive(Debug, Default)]
pub struct TextSerializer;

impl Serializer for TextSerializer {
    fn serialize(&self, value: &serde_json::Value) -> Result<Bytes, TransportError> {
        let text = value.as_str().ok_or_else(|| {
            TransportError::Validation("text/* body must be a string".to_owned())
        })?;
        Ok(Bytes::copy_from_slice(text.as_bytes()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<serde_json::Value, TransportError> {
        let text = std::str::from_utf8(bytes).map_err(serialization_error)?;
        Ok(serde_json::Value::String(text.to_owned()))
    }
}

/// Fixed registry of serializers by MIME essence string, with caller overrides and a `text/*`
/// fallback.
#[derive(Debug, Clone)]
pub struct SerializerRegistry {
    by_essence: HashMap<String, Arc<dyn Serializer>>,
    text_fallback: Arc<dyn Serializer>,
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        let mut by_essence: HashMap<String, Arc<dyn Serializer>> = HashMap::new();
        by_essence.insert(mime::APPLICATION_JSON.essence_str().to_owned(), Arc::new(JsonSerializer));
        by_essence.insert("application/x-ndjson".to_owned(), Arc::new(NdjsonSerializer));
        Self {
            by_essence,
            text_fallback: Arc::new(TextSerializer),
        }
    }
}

impl SerializerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the serializer used for an exact MIME essence string (e.g.
    /// `"application/json"`).
    pub fn register(&mut self, mimetype: impl Into<String>, serializer: Arc<dyn Serializer>) {
        self.by_essence.insert(mimetype.into(), serializer);
    }

    /// Look up a serializer for `mime`: an exact essence-string match first, then a `text/*`
    /// fallback.
    #[must_use]
    pub fn get(&self, mime: &Mime) -> Option<Arc<dyn Serializer>> {
        if let Some(serializer) = self.by_essence.get(mime.essence_str()) {
            return Some(Arc::clone(serializer));
        }
        if mime.type_() == mime::TEXT {
            return Some(Arc::clone(&self.text_fallback));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trips() {
        let ser = JsonSerializer;
        let value = json!({"a": 1, "b": [true, null, "x"]});
        let bytes = ser.serialize(&value).unwrap();
        assert_eq!(ser.deserialize(&bytes).unwrap(), value);
    }

    #[test]
    fn ndjson_round_trips() {
        let ser = NdjsonSerializer;
        let value = json!([{"a": 1}, {"b": 2}]);
        let bytes = ser.serialize(&value).unwrap();
        assert_eq!(bytes.as_ref(), b"{\"a\":1}\n{\"b\":2}\n".as_slice());
        assert_eq!(ser.deserialize(&bytes).unwrap(), value);
    }

    #[test]
    fn ndjson_rejects_non_array() {
        let ser = NdjsonSerializer;
        assert!(ser.serialize(&json!({"a": 1})).is_err());
    }

    #[test]
    fn text_round_trips() {
        let ser = TextSerializer;
        let value = json!("hello world");
        let bytes = ser.serialize(&value).unwrap();
        assert_eq!(bytes.as_ref(), b"hello world");
        assert_eq!(ser.deserialize(&bytes).unwrap(), value);
    }

    #[test]
    fn registry_resolves_known_mimetypes() {
        let registry = SerializerRegistry::new();
        assert!(registry.get(&mime::APPLICATION_JSON).is_some());
        let ndjson: Mime = "application/x-ndjson".parse().unwrap();
        assert!(registry.get(&ndjson).is_some());
        let plain: Mime = "text/csv".parse().unwrap();
        assert!(registry.get(&plain).is_some());
        assert!(registry.get(&mime::IMAGE_PNG).is_none());
    }

    #[test]
    fn registry_override_replaces_default() {
        #[derive(Debug)]
        struct AlwaysEmpty;
        impl Serializer for AlwaysEmpty {
            fn serialize(&self, _value: &serde_json::Value) -> Result<Bytes, TransportError> {
                Ok(Bytes::new())
            }
            fn deserialize(&self, _bytes: &[u8]) -> Result<serde_json::Value, TransportError> {
                Ok(serde_json::Value::Null)
            }
        }

        let mut registry = SerializerRegistry::new();
        registry.register("application/json", Arc::new(AlwaysEmpty));
        let serializer = registry.get(&mime::APPLICATION_JSON).unwrap();
        assert_eq!(serializer.serialize(&json!({"x": 1})).unwrap(), Bytes::new());
    }
}
