//! Prelude module for convenient imports.
//!
//! ```ignore
//! use stac_client::prelude::*;
//! ```

pub use crate::{
    Capability, Client, ClientOptions, Collection, Conformance, Error, ErrorKind, HttpClient,
    HttpClientExt, Item, ItemCollection, ItemSearch, Method, Page, Result, RootDescriptor,
    SearchBuilder, SearchConfig, SearchRequest, SortBy, Transport, TransportConfig,
};
