//! Tower middleware layers for the STAC transport.
//!
//! [`crate::Transport`] stacks these around the raw hyper client. From the
//! inside out:
//!
//! - [`RetryPolicy`] with [`RetryLayer`] - capped exponential backoff on
//!   transient failures
//! - [`LoggingLayer`] - one `tracing` span per network request
//! - layers added with [`crate::TransportBuilder::layer`]
//! - [`CacheLayer`] - memoized `GET` responses
//! - a request modifier, if one is set
//! - [`DefaultsLayer`] - session headers, auth and query parameters
//!
//! # Example
//!
//! ```ignore
//! use stac_client::Transport;
//! use stac_client::middleware::ConcurrencyLimitLayer;
//!
//! let transport = Transport::builder()
//!     .with_bearer_auth("my-token")
//!     .layer(ConcurrencyLimitLayer::new(4))
//!     .build();
//! ```

mod cache;
mod defaults;
mod logging;
mod retry;

pub use cache::{CacheLayer, Cached, ResponseCache};
pub use defaults::{DefaultsLayer, WithDefaults};
pub use logging::{LogLevel, Logging, LoggingLayer};
pub use retry::{Backoff, RetryPolicy};

pub use tower::limit::ConcurrencyLimitLayer;
pub use tower::retry::RetryLayer;
pub use tower::{Layer, ServiceBuilder};
