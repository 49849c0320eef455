//! Body serialization utilities.

use bytes::Bytes;

use crate::Result;

/// Media types a STAC API speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// JSON content type (`application/json`).
    Json,
    /// GeoJSON content type (`application/geo+json`).
    GeoJson,
    /// JSON schema content type (`application/schema+json`), used by queryables.
    JsonSchema,
}

impl ContentType {
    /// Get the MIME type string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::GeoJson => "application/geo+json",
            Self::JsonSchema => "application/schema+json",
        }
    }

    /// Whether `media_type` (possibly with parameters) is this content type.
    #[must_use]
    pub fn matches(&self, media_type: &str) -> bool {
        media_type
            .split(';')
            .next()
            .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(self.as_str()))
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Serialize a value to JSON bytes.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(Into::into)
}

/// Deserialize JSON bytes to a value with path-aware error messages.
///
/// Uses `serde_path_to_error` so a failure names the exact field, e.g.
/// `links[2].href`.
///
/// # Errors
///
/// Returns an error if JSON deserialization fails, with the error message
/// including the path to the problematic field.
///
/// # Example
///
/// ```
/// use stac_client_core::from_json;
/// use serde::Deserialize;
///
/// #[derive(Debug, PartialEq, Deserialize)]
/// struct Landing { id: String }
///
/// let landing: Landing = from_json(br#"{"id":"earth-search"}"#).expect("deserialize");
/// assert_eq!(landing, Landing { id: "earth-search".to_string() });
/// ```
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        crate::Error::json_deserialization(e.path().to_string(), e.inner().to_string())
    })
}

/// Deserialize an already parsed JSON value, with the same path-aware errors
/// as [`from_json`].
pub fn from_value<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_path_to_error::deserialize(value).map_err(|e| {
        crate::Error::json_deserialization(e.path().to_string(), e.inner().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_matches() {
        assert!(ContentType::GeoJson.matches("application/geo+json"));
        assert!(ContentType::Json.matches("Application/JSON; charset=utf-8"));
        assert!(!ContentType::Json.matches("application/geo+json"));
        assert_eq!(ContentType::JsonSchema.to_string(), "application/schema+json");
    }

    #[test]
    fn to_json_serialize() {
        let bytes = to_json(&serde_json::json!({"collections": ["naip"]})).expect("serialize");
        assert_eq!(bytes.as_ref(), br#"{"collections":["naip"]}"#);
    }

    #[test]
    fn from_json_syntax_error() {
        let result: Result<serde_json::Value> = from_json(b"not json");
        let err = result.expect_err("should fail");
        assert!(err.to_string().contains("JSON deserialization error"));
    }

    #[test]
    fn from_value_reports_path() {
        #[derive(Debug, serde::Deserialize)]
        struct Link {
            #[allow(dead_code)]
            href: String,
        }

        #[derive(Debug, serde::Deserialize)]
        struct Doc {
            #[allow(dead_code)]
            links: Vec<Link>,
        }

        let value = serde_json::json!({"links": [{"href": "a"}, {"href": 3}]});
        let err = from_value::<Doc>(value).expect_err("href is not a string");
        let msg = err.to_string();
        assert!(msg.contains("links[1].href"), "{msg}");
    }
}
