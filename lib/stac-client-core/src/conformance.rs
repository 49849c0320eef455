//! Conformance classes advertised by a STAC API.
//!
//! Servers list the specifications they implement in the `conformsTo` array of
//! their landing page. Different server generations publish slightly different
//! URIs for the same capability (`v1.0.0-beta.1/item-search`,
//! `v1.0.0/item-search`, ...), so each [`Capability`] is matched by a set of
//! case-insensitive patterns rather than a single URI.
//!
//! # Example
//!
//! ```
//! use stac_client_core::{Capability, Conformance};
//!
//! let conformance = Conformance::new(["https://api.stacspec.org/v1.0.0/item-search"]);
//! assert!(conformance.supports(Capability::ItemSearch));
//! assert!(!conformance.supports(Capability::Sort));
//! ```

use std::sync::LazyLock;

use derive_more::Display;
use regex::{Regex, RegexBuilder};
use tracing::error;

use crate::{Error, Result};

/// A capability a STAC API may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Capability {
    /// STAC API - Core.
    #[display("core")]
    Core,
    /// STAC API - Item Search (`/search`).
    #[display("item search")]
    ItemSearch,
    /// Context extension (`context.matched`).
    #[display("context")]
    Context,
    /// Fields extension (field inclusion/exclusion).
    #[display("fields")]
    Fields,
    /// Sort extension (`sortby`).
    #[display("sort")]
    Sort,
    /// Query extension (`query` object).
    #[display("query")]
    Query,
    /// Filter extension (CQL2 `filter`).
    #[display("filter")]
    Filter,
    /// STAC API - Collections (`/collections`).
    #[display("collections")]
    Collections,
    /// STAC API - Features (`/collections/{id}/items/{item}`).
    #[display("features")]
    Features,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Core,
        Self::ItemSearch,
        Self::Context,
        Self::Fields,
        Self::Sort,
        Self::Query,
        Self::Filter,
        Self::Collections,
        Self::Features,
    ];

    // Matched anywhere in the URI, up to an optional trailing slash.
    fn patterns(self) -> &'static [&'static str] {
        match self {
            Self::Core => &[r"stacspec\.org/v1\.\d+\.[^/]+/core"],
            Self::ItemSearch => &[r"stacspec\.org/v1\.\d+\.[^/]+/item-search"],
            Self::Context => &[r"stacspec\.org/v1\.\d+\.[^/]+/item-search#context"],
            Self::Fields => &[r"stacspec\.org/v1\.\d+\.[^/]+/(item-search|ogcapi-features)#fields"],
            Self::Sort => &[r"stacspec\.org/v1\.\d+\.[^/]+/(item-search|ogcapi-features)#sort"],
            Self::Query => &[r"stacspec\.org/v1\.\d+\.[^/]+/item-search#query"],
            Self::Filter => &[
                r"stacspec\.org/v1\.\d+\.[^/]+/(item-search|ogcapi-features)#filter",
                r"opengis\.net/spec/ogcapi-features-3/1\.\d+/conf/(filter|features-filter)",
            ],
            Self::Collections => &[
                r"stacspec\.org/v1\.\d+\.[^/]+/collections",
                r"opengis\.net/spec/ogcapi-features-1/1\.\d+/req/oas30",
            ],
            Self::Features => &[
                r"stacspec\.org/v1\.\d+\.[^/]+/ogcapi-features",
                r"opengis\.net/spec/ogcapi-features-1/1\.\d+/conf/core",
            ],
        }
    }

    /// Suffix appended to capability errors to point at a fallback.
    pub(crate) const fn fallback_hint(self) -> &'static str {
        match self {
            Self::ItemSearch => {
                "; browse the catalog through its collections instead of searching"
            }
            _ => "",
        }
    }
}

struct Matcher {
    capability: Capability,
    patterns: Vec<Regex>,
}

fn compile(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    // a fragment or path segment may not continue past the pattern
    RegexBuilder::new(&format!("{pattern}/?$"))
        .case_insensitive(true)
        .build()
}

static MATCHERS: LazyLock<Vec<Matcher>> = LazyLock::new(|| {
    Capability::ALL
        .iter()
        .map(|&capability| Matcher {
            capability,
            patterns: capability
                .patterns()
                .iter()
                .filter_map(|pattern| {
                    compile(pattern)
                        .inspect_err(|err| {
                            error!(%capability, pattern, %err, "invalid conformance pattern");
                        })
                        .ok()
                })
                .collect(),
        })
        .collect()
});

/// The set of conformance URIs published by a server.
///
/// Pure data: no network I/O happens here. Build one from the root document's
/// `conformsTo` array and ask it [`supports`](Self::supports) before emitting
/// a request that depends on an optional capability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conformance {
    // `None` answers `true` for everything
    uris: Option<Vec<String>>,
}

impl Conformance {
    /// Registry over the given conformance URIs.
    pub fn new<I, S>(uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            uris: Some(uris.into_iter().map(Into::into).collect()),
        }
    }

    /// Registry that treats every capability as supported.
    ///
    /// Used for servers that do not publish `conformsTo` at all, or when the
    /// caller explicitly chose to skip conformance checks.
    #[must_use]
    pub const fn ignored() -> Self {
        Self { uris: None }
    }

    /// Whether conformance checks are skipped.
    #[must_use]
    pub const fn is_ignored(&self) -> bool {
        self.uris.is_none()
    }

    /// Advertised URIs, if any.
    #[must_use]
    pub fn uris(&self) -> &[String] {
        self.uris.as_deref().unwrap_or_default()
    }

    /// Whether at least one advertised URI matches `capability`.
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        let Some(uris) = &self.uris else {
            return true;
        };
        MATCHERS
            .iter()
            .filter(|matcher| matcher.capability == capability)
            .flat_map(|matcher| matcher.patterns.iter())
            .any(|pattern| uris.iter().any(|uri| pattern.is_match(uri)))
    }

    /// Fail with [`Error::NotSupported`] unless `capability` is advertised.
    ///
    /// `feature` names what the caller tried to use (e.g. `"sortby"`).
    pub fn require(&self, capability: Capability, feature: &str) -> Result<()> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(Error::not_supported(capability, feature))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_all_published_versions() {
        for uri in [
            "https://api.stacspec.org/v1.0.0-beta.1/item-search",
            "https://api.stacspec.org/v1.0.0-beta.2/item-search",
            "https://api.stacspec.org/v1.0.0-rc.1/item-search",
            "https://api.stacspec.org/v1.0.0/item-search",
            "HTTPS://API.STACSPEC.ORG/V1.0.0/ITEM-SEARCH",
        ] {
            let conformance = Conformance::new([uri]);
            assert!(conformance.supports(Capability::ItemSearch), "{uri}");
        }
    }

    #[test]
    fn trailing_slash_and_later_versions() {
        for uri in [
            "https://api.stacspec.org/v1.0.0/item-search/",
            "https://api.stacspec.org/v1.1.0/item-search",
            "https://api.stacspec.org/v1.2.0-beta.1/item-search/",
        ] {
            let conformance = Conformance::new([uri]);
            assert!(conformance.supports(Capability::ItemSearch), "{uri}");
        }
        let ogc = Conformance::new(["http://www.opengis.net/spec/ogcapi-features-1/1.1/conf/core/"]);
        assert!(ogc.supports(Capability::Features));
        let sort = Conformance::new(["https://api.stacspec.org/v1.1.0/item-search#sort/"]);
        assert!(sort.supports(Capability::Sort));
        assert!(!sort.supports(Capability::ItemSearch));
    }

    #[test]
    fn extensions_are_distinct_from_item_search() {
        let conformance = Conformance::new(["https://api.stacspec.org/v1.0.0/item-search#sort"]);
        assert!(conformance.supports(Capability::Sort));
        assert!(!conformance.supports(Capability::ItemSearch));
        assert!(!conformance.supports(Capability::Fields));
    }

    #[test]
    fn core_only_does_not_support_search() {
        let conformance = Conformance::new(["https://api.stacspec.org/v1.0.0/core"]);
        assert!(conformance.supports(Capability::Core));
        assert!(!conformance.supports(Capability::ItemSearch));
    }

    #[test]
    fn ogc_uris() {
        let conformance = Conformance::new([
            "http://www.opengis.net/spec/ogcapi-features-1/1.0/conf/core",
            "http://www.opengis.net/spec/ogcapi-features-1/1.0/req/oas30",
            "http://www.opengis.net/spec/ogcapi-features-3/1.0/conf/filter",
        ]);
        assert!(conformance.supports(Capability::Features));
        assert!(conformance.supports(Capability::Collections));
        assert!(conformance.supports(Capability::Filter));
        assert!(!conformance.supports(Capability::Core));
    }

    #[test]
    fn empty_supports_nothing() {
        let conformance = Conformance::new(Vec::<String>::new());
        for capability in Capability::ALL {
            assert!(!conformance.supports(capability));
        }
    }

    #[test]
    fn ignored_supports_everything() {
        let conformance = Conformance::ignored();
        assert!(conformance.is_ignored());
        for capability in Capability::ALL {
            assert!(conformance.supports(capability));
        }
    }

    #[test]
    fn require_reports_capability() {
        let conformance = Conformance::new(["https://api.stacspec.org/v1.0.0/item-search"]);
        assert!(conformance.require(Capability::ItemSearch, "search").is_ok());

        let err = conformance
            .require(Capability::Fields, "fields")
            .expect_err("fields not advertised");
        assert!(matches!(
            err,
            Error::NotSupported {
                capability: Capability::Fields,
                ..
            }
        ));
    }

    #[test]
    fn every_pattern_compiles() {
        for capability in Capability::ALL {
            for pattern in capability.patterns() {
                assert!(compile(pattern).is_ok(), "{pattern}");
            }
        }
        for matcher in MATCHERS.iter() {
            assert_eq!(
                matcher.patterns.len(),
                matcher.capability.patterns().len(),
                "{}",
                matcher.capability
            );
        }
    }
}
