//! Error types for the STAC client.
//!
//! Every failure falls in one of four [`ErrorKind`]s so callers can tell
//! "this server cannot do that" apart from "your input was invalid",
//! "the network or server failed" and "the server answered something odd".

use derive_more::{Display, Error, From};

use crate::Capability;

/// Broad category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ErrorKind {
    /// The server does not advertise a capability the request needs.
    #[display("capability")]
    Capability,
    /// Filter arguments or request configuration were rejected locally.
    #[display("invalid input")]
    InvalidInput,
    /// Connection failures, timeouts and non-2xx responses.
    #[display("transport")]
    Transport,
    /// A response body did not have the expected shape.
    #[display("response shape")]
    ResponseShape,
}

/// Main error type for STAC client operations.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// A conformance class needed by a feature is not advertised.
    #[display(
        "{feature} is not supported by this server: conformance class \"{capability}\" is not advertised{}",
        capability.fallback_hint()
    )]
    #[from(skip)]
    NotSupported {
        /// Missing conformance class.
        capability: Capability,
        /// User-facing feature that required it.
        feature: String,
    },

    /// The root document lacks a link the operation needs.
    #[display("no link with rel \"{rel}\" could be found in the root catalog")]
    #[from(skip)]
    MissingLink {
        /// Link relation that was looked up.
        rel: String,
    },

    /// Filter arguments could not be normalized into a search request.
    #[display("invalid search request: {_0}")]
    #[from(skip)]
    InvalidSearch(#[error(not(source))] String),

    /// HTTP-level errors (non-2xx status codes).
    #[display("HTTP error {status}: {message}")]
    #[from(skip)]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
        /// Response body, if available.
        #[error(not(source))]
        body: Option<bytes::Bytes>,
    },

    /// Network/connection errors.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// Request timeout.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    /// Invalid request configuration.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// A response was decoded but is missing an expected field.
    #[display("unexpected response from {context}: {message}")]
    #[from(skip)]
    InvalidResponse {
        /// What was being read (e.g. "search page", "root catalog").
        context: String,
        /// What was wrong with it.
        message: String,
    },

    /// JSON serialization error.
    #[display("JSON serialization error: {_0}")]
    #[from]
    JsonSerialization(serde_json::Error),

    /// JSON deserialization error with path context.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// JSON path to the error (e.g., "links[0].href").
        path: String,
        /// Error message.
        message: String,
    },

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a capability error for `feature`.
    #[must_use]
    pub fn not_supported(capability: Capability, feature: impl Into<String>) -> Self {
        Self::NotSupported {
            capability,
            feature: feature.into(),
        }
    }

    /// Create a missing link error.
    #[must_use]
    pub fn missing_link(rel: impl Into<String>) -> Self {
        Self::MissingLink { rel: rel.into() }
    }

    /// Create an invalid search request error.
    #[must_use]
    pub fn invalid_search(message: impl Into<String>) -> Self {
        Self::InvalidSearch(message.into())
    }

    /// Create an HTTP error from status code and message.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: None,
        }
    }

    /// Create an HTTP error with body.
    #[must_use]
    pub fn http_with_body(status: u16, message: impl Into<String>, body: bytes::Bytes) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: Some(body),
        }
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a response-shape error.
    #[must_use]
    pub fn invalid_response(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a JSON deserialization error with path context.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Prefix the path of a deserialization error with `prefix`, the
    /// location of the value it was decoded from (`features[3]`,
    /// `links[0]`). Other errors pass through.
    #[must_use]
    pub fn within(self, prefix: &str) -> Self {
        match self {
            Self::JsonDeserialization { path, message } => {
                let path = match path.as_str() {
                    "" | "." => prefix.to_string(),
                    nested if nested.starts_with('[') => format!("{prefix}{nested}"),
                    nested => format!("{prefix}.{nested}"),
                };
                Self::JsonDeserialization { path, message }
            }
            other => other,
        }
    }

    /// Category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotSupported { .. } | Self::MissingLink { .. } => ErrorKind::Capability,
            Self::InvalidSearch(_)
            | Self::InvalidRequest(_)
            | Self::InvalidUrl(_)
            | Self::JsonSerialization(_) => ErrorKind::InvalidInput,
            Self::Http { .. } | Self::Connection(_) | Self::Tls(_) | Self::Timeout => {
                ErrorKind::Transport
            }
            Self::InvalidResponse { .. } | Self::JsonDeserialization { .. } => {
                ErrorKind::ResponseShape
            }
        }
    }

    /// Returns `true` if a server capability is missing.
    #[must_use]
    pub const fn is_capability(&self) -> bool {
        matches!(self.kind(), ErrorKind::Capability)
    }

    /// Returns `true` if the input was rejected before any request was sent.
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self.kind(), ErrorKind::InvalidInput)
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns the HTTP status code if this is an HTTP error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if this is a 404 Not Found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Returns the response body if this is an HTTP error with a body.
    #[must_use]
    pub fn body(&self) -> Option<&bytes::Bytes> {
        match self {
            Self::Http { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}
