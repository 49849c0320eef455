//! HTTP method types.

use derive_more::Display;
use serde::{Deserialize, Deserializer, Serialize};

/// HTTP method used against a STAC API.
///
/// Searches go out either as `GET` with a query string or as `POST` with a
/// JSON body; links may carry either, in any letter case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// GET method - parameters in the query string.
    #[default]
    #[display("GET")]
    Get,
    /// POST method - parameters in a JSON body.
    #[display("POST")]
    Post,
}

impl Method {
    /// Returns `true` if responses to this method may be memoized.
    #[must_use]
    pub const fn is_cacheable(&self) -> bool {
        matches!(self, Self::Get)
    }
}

impl std::str::FromStr for Method {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("GET") {
            Ok(Self::Get)
        } else if s.eq_ignore_ascii_case("POST") {
            Ok(Self::Post)
        } else {
            Err(crate::Error::InvalidRequest(format!(
                "unsupported HTTP method: {s}"
            )))
        }
    }
}

impl<'de> Deserialize<'de> for Method {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = std::borrow::Cow::<'de, str>::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
        }
    }
}

impl TryFrom<http::Method> for Method {
    type Error = crate::Error;

    fn try_from(method: http::Method) -> Result<Self, Self::Error> {
        match method {
            http::Method::GET => Ok(Self::Get),
            http::Method::POST => Ok(Self::Post),
            other => Err(crate::Error::InvalidRequest(format!(
                "unsupported HTTP method: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_display() {
        assert_eq!(Method::Get.to_string(), "GET");
        assert_eq!(Method::Post.to_string(), "POST");
    }

    #[test]
    fn method_from_str() {
        assert_eq!("post".parse::<Method>().expect("POST"), Method::Post);
        assert_eq!("GET".parse::<Method>().expect("GET"), Method::Get);
        assert!("PATCH".parse::<Method>().is_err());
    }

    #[test]
    fn method_serde() {
        let method: Method = serde_json::from_str(r#""POST""#).expect("deserialize");
        assert_eq!(method, Method::Post);
        for raw in [r#""Post""#, r#""post""#, r#""pOsT""#] {
            assert_eq!(serde_json::from_str::<Method>(raw).expect(raw), Method::Post);
        }
        assert!(serde_json::from_str::<Method>(r#""PATCH""#).is_err());
        assert_eq!(
            serde_json::to_string(&Method::Get).expect("serialize"),
            r#""GET""#
        );
    }

    #[test]
    fn method_is_cacheable() {
        assert!(Method::Get.is_cacheable());
        assert!(!Method::Post.is_cacheable());
    }

    #[test]
    fn method_http_conversions() {
        assert_eq!(http::Method::from(Method::Post), http::Method::POST);
        assert_eq!(
            Method::try_from(http::Method::GET).expect("GET"),
            Method::Get
        );
        assert!(Method::try_from(http::Method::DELETE).is_err());
    }
}
