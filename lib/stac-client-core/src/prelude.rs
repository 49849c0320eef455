//! Prelude module for convenient imports.
//!
//! ```ignore
//! use stac_client_core::prelude::*;
//! ```

pub use crate::{
    Capability, Collection, Conformance, ContentType, Error, ErrorKind, HttpClient, HttpClientExt,
    Item, ItemCollection, Link, Method, Page, PageOptions, Request, RequestBuilder, Response,
    Result, RootDescriptor, SearchBuilder, SearchConfig, SearchRequest, SortBy, ToQueryPairs,
    from_json, to_json,
};
