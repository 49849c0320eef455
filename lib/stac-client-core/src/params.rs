//! Search parameter inputs and their normalized forms.
//!
//! Each `*Input` enum lists the shapes a caller may pass; each is turned into
//! one canonical value by `normalize`, and only canonical values reach
//! [`SearchRequest`](crate::SearchRequest).

use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::{Error, Result};

// ---- bbox ----

/// A bounding box of four (2D) or six (3D) coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Bbox(Vec<f64>);

impl Bbox {
    /// Validate coordinates.
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if values.len() != 4 && values.len() != 6 {
            return Err(Error::invalid_search(format!(
                "bbox must have 4 or 6 coordinates, got {}",
                values.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::invalid_search("bbox coordinates must be finite numbers"));
        }
        Ok(Self(values))
    }

    /// Coordinates in order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    /// Comma-joined form used in query strings.
    #[must_use]
    pub fn to_query_value(&self) -> String {
        join(self.0.iter().map(ToString::to_string))
    }
}

/// Accepted bbox shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum BboxInput {
    /// Numeric coordinates.
    Values(Vec<f64>),
    /// Comma-separated coordinates, e.g. `"-110,39.5,-105,40.5"`.
    Text(String),
}

impl BboxInput {
    /// Normalize into a [`Bbox`].
    pub fn normalize(self) -> Result<Bbox> {
        match self {
            Self::Values(values) => Bbox::new(values),
            Self::Text(text) => {
                let values = text
                    .split(',')
                    .map(|part| {
                        part.trim().parse::<f64>().map_err(|_| {
                            Error::invalid_search(format!("bbox coordinate {part:?} is not a number"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Bbox::new(values)
            }
        }
    }
}

impl From<Vec<f64>> for BboxInput {
    fn from(values: Vec<f64>) -> Self {
        Self::Values(values)
    }
}

impl From<&[f64]> for BboxInput {
    fn from(values: &[f64]) -> Self {
        Self::Values(values.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for BboxInput {
    fn from(values: [f64; N]) -> Self {
        Self::Values(values.to_vec())
    }
}

impl From<&str> for BboxInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for BboxInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

// ---- intersects ----

/// Anything that can describe itself as a GeoJSON geometry.
///
/// Implement it for geometry types from other crates to pass them straight to
/// [`SearchBuilder::intersects`](crate::SearchBuilder::intersects) through
/// [`IntersectsInput::geo`].
pub trait GeoInterface {
    /// GeoJSON representation (a geometry, or a feature wrapping one).
    fn geo_interface(&self) -> Value;
}

impl GeoInterface for Value {
    fn geo_interface(&self) -> Value {
        self.clone()
    }
}

impl GeoInterface for Map<String, Value> {
    fn geo_interface(&self) -> Value {
        Value::Object(self.clone())
    }
}

/// Accepted intersects shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum IntersectsInput {
    /// A GeoJSON value.
    Json(Value),
    /// GeoJSON text.
    Text(String),
}

impl IntersectsInput {
    /// From a [`GeoInterface`] implementor.
    pub fn geo(shape: &impl GeoInterface) -> Self {
        Self::Json(shape.geo_interface())
    }

    /// Normalize into a GeoJSON geometry object.
    ///
    /// A `Feature` contributes its `geometry`.
    pub fn normalize(self) -> Result<Map<String, Value>> {
        let value = match self {
            Self::Json(value) => value,
            Self::Text(text) => serde_json::from_str(&text)
                .map_err(|e| Error::invalid_search(format!("intersects is not valid JSON: {e}")))?,
        };
        let Value::Object(mut object) = value else {
            return Err(Error::invalid_search("intersects must be a GeoJSON object"));
        };
        match object.get("type").and_then(Value::as_str) {
            Some("Feature") => match object.remove("geometry") {
                Some(Value::Object(geometry)) => Self::Json(Value::Object(geometry)).normalize(),
                _ => Err(Error::invalid_search("intersects feature has no geometry")),
            },
            Some("FeatureCollection") => Err(Error::invalid_search(
                "intersects must be a single geometry, not a FeatureCollection",
            )),
            Some(_) => Ok(object),
            None => Err(Error::invalid_search("intersects has no GeoJSON \"type\"")),
        }
    }
}

impl From<Value> for IntersectsInput {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Map<String, Value>> for IntersectsInput {
    fn from(object: Map<String, Value>) -> Self {
        Self::Json(Value::Object(object))
    }
}

impl From<&str> for IntersectsInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for IntersectsInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

// ---- string lists (ids, collections) ----

/// Comma-separated text or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringList {
    /// `"a,b,c"`.
    Text(String),
    /// Already split.
    Items(Vec<String>),
}

impl StringList {
    /// Trimmed, non-empty entries.
    #[must_use]
    pub fn normalize(self) -> Vec<String> {
        let items = match self {
            Self::Text(text) => text.split(',').map(str::to_string).collect(),
            Self::Items(items) => items,
        };
        items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    }
}

impl From<&str> for StringList {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for StringList {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<String>> for StringList {
    fn from(items: Vec<String>) -> Self {
        Self::Items(items)
    }
}

impl From<Vec<&str>> for StringList {
    fn from(items: Vec<&str>) -> Self {
        Self::Items(items.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for StringList {
    fn from(items: &[&str]) -> Self {
        Self::Items(items.iter().map(|s| (*s).to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for StringList {
    fn from(items: [&str; N]) -> Self {
        Self::Items(items.iter().map(|s| (*s).to_string()).collect())
    }
}

// ---- filter ----

/// CQL2 encoding of a `filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum FilterLang {
    /// JSON encoding.
    #[display("cql2-json")]
    #[serde(rename = "cql2-json")]
    Cql2Json,
    /// Text encoding.
    #[display("cql2-text")]
    #[serde(rename = "cql2-text")]
    Cql2Text,
}

impl FromStr for FilterLang {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cql2-json" => Ok(Self::Cql2Json),
            "cql2-text" => Ok(Self::Cql2Text),
            other => Err(Error::invalid_search(format!(
                "unknown filter language {other:?}, expected cql2-json or cql2-text"
            ))),
        }
    }
}

/// Accepted filter shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterInput {
    /// A CQL2-JSON expression.
    Json(Value),
    /// A CQL2-text expression.
    Text(String),
}

/// A normalized filter expression and its language.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// The expression: a JSON object for CQL2-JSON, a string for CQL2-text.
    pub expression: Value,
    /// Its language.
    pub lang: FilterLang,
}

impl FilterInput {
    /// Normalize, inferring the language from the shape unless `lang` is given.
    pub fn normalize(self, lang: Option<FilterLang>) -> Result<Filter> {
        let (expression, inferred) = match self {
            Self::Json(Value::String(text)) | Self::Text(text) => {
                if text.trim().is_empty() {
                    return Err(Error::invalid_search("filter must not be empty"));
                }
                (Value::String(text), FilterLang::Cql2Text)
            }
            Self::Json(value @ Value::Object(_)) => (value, FilterLang::Cql2Json),
            Self::Json(_) => {
                return Err(Error::invalid_search(
                    "filter must be a CQL2-JSON object or CQL2-text string",
                ));
            }
        };
        let lang = lang.unwrap_or(inferred);
        if lang == FilterLang::Cql2Json && !expression.is_object() {
            return Err(Error::invalid_search(
                "filter-lang cql2-json requires a JSON object filter",
            ));
        }
        Ok(Filter { expression, lang })
    }
}

impl Filter {
    /// Query string form: text as-is, JSON serialized.
    #[must_use]
    pub fn to_query_value(&self) -> String {
        match &self.expression {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

impl From<Value> for FilterInput {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Map<String, Value>> for FilterInput {
    fn from(object: Map<String, Value>) -> Self {
        Self::Json(Value::Object(object))
    }
}

impl From<&str> for FilterInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for FilterInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

// ---- sort ----

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Ascending.
    #[default]
    #[display("asc")]
    Asc,
    /// Descending.
    #[display("desc")]
    Desc,
}

/// One sort directive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortBy {
    /// Property to sort on.
    pub field: String,
    /// Direction.
    #[serde(default)]
    pub direction: Direction,
}

impl SortBy {
    /// Ascending on `field`.
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    /// Descending on `field`.
    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    fn prefixed(&self) -> String {
        match self.direction {
            Direction::Asc => format!("+{}", self.field),
            Direction::Desc => format!("-{}", self.field),
        }
    }
}

impl FromStr for SortBy {
    type Err = Error;

    /// `-field` is descending; `+field` and `field` ascending.
    fn from_str(part: &str) -> Result<Self> {
        let part = part.trim();
        let sort = if let Some(field) = part.strip_prefix('-') {
            Self::desc(field.trim())
        } else {
            Self::asc(part.strip_prefix('+').unwrap_or(part).trim())
        };
        if sort.field.is_empty() {
            return Err(Error::invalid_search(format!("sortby entry {part:?} names no field")));
        }
        Ok(sort)
    }
}

/// Query string form of a sort list, e.g. `+datetime,-eo:cloud_cover`.
#[must_use]
pub fn sortby_to_query(sortby: &[SortBy]) -> String {
    join(sortby.iter().map(SortBy::prefixed))
}

/// Parse the query string form back into directives.
pub fn sortby_from_query(text: &str) -> Result<Vec<SortBy>> {
    text.split(',').map(str::parse).collect()
}

/// JSON body form of a sort list.
pub fn sortby_to_body(sortby: &[SortBy]) -> Result<Value> {
    Ok(serde_json::to_value(sortby)?)
}

/// Parse the JSON body form back into directives.
pub fn sortby_from_body(value: Value) -> Result<Vec<SortBy>> {
    crate::from_value(value)
}

/// Accepted sort shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortInput {
    /// `"-datetime,+id"`.
    Text(String),
    /// `["-datetime", "id"]`.
    Fields(Vec<String>),
    /// Explicit directives.
    Directives(Vec<SortBy>),
}

impl SortInput {
    /// Normalize into directives; an empty list is rejected.
    pub fn normalize(self) -> Result<Vec<SortBy>> {
        let sortby = match self {
            Self::Text(text) => sortby_from_query(&text)?,
            Self::Fields(fields) => fields
                .iter()
                .map(|f| f.parse())
                .collect::<Result<Vec<_>>>()?,
            Self::Directives(directives) => directives,
        };
        if sortby.is_empty() {
            return Err(Error::invalid_search("sortby must not be empty"));
        }
        if let Some(blank) = sortby.iter().find(|s| s.field.trim().is_empty()) {
            return Err(Error::invalid_search(format!(
                "sortby directive {blank:?} names no field"
            )));
        }
        Ok(sortby)
    }
}

impl From<&str> for SortInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for SortInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<String>> for SortInput {
    fn from(fields: Vec<String>) -> Self {
        Self::Fields(fields)
    }
}

impl From<Vec<&str>> for SortInput {
    fn from(fields: Vec<&str>) -> Self {
        Self::Fields(fields.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<SortBy>> for SortInput {
    fn from(directives: Vec<SortBy>) -> Self {
        Self::Directives(directives)
    }
}

impl From<SortBy> for SortInput {
    fn from(directive: SortBy) -> Self {
        Self::Directives(vec![directive])
    }
}

// ---- fields ----

/// Properties to include in or exclude from returned items.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fields {
    /// Included properties.
    #[serde(default)]
    pub includes: Vec<String>,
    /// Excluded properties.
    #[serde(default)]
    pub excludes: Vec<String>,
}

impl Fields {
    /// From prefixed entries: `-f` excludes, `+f` and `f` include.
    #[must_use]
    pub fn from_prefixed<S: AsRef<str>>(entries: impl IntoIterator<Item = S>) -> Self {
        let mut fields = Self::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if let Some(field) = entry.strip_prefix('-') {
                fields.excludes.push(field.to_string());
            } else if !entry.is_empty() {
                fields
                    .includes
                    .push(entry.strip_prefix('+').unwrap_or(entry).to_string());
            }
        }
        fields
    }

    /// Query string form: includes as `+f`, then excludes as `-f`.
    #[must_use]
    pub fn to_query_value(&self) -> String {
        join(
            self.includes
                .iter()
                .map(|f| format!("+{f}"))
                .chain(self.excludes.iter().map(|f| format!("-{f}"))),
        )
    }

    /// Nothing included or excluded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }
}

/// Accepted fields shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldsInput {
    /// `"id,-properties.datetime"`.
    Text(String),
    /// Prefixed entries.
    List(Vec<String>),
    /// Explicit includes/excludes.
    Fields(Fields),
}

impl FieldsInput {
    /// Normalize into [`Fields`].
    #[must_use]
    pub fn normalize(self) -> Fields {
        match self {
            Self::Text(text) => Fields::from_prefixed(text.split(',')),
            Self::List(list) => Fields::from_prefixed(list),
            Self::Fields(fields) => fields,
        }
    }
}

impl From<&str> for FieldsInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for FieldsInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<String>> for FieldsInput {
    fn from(list: Vec<String>) -> Self {
        Self::List(list)
    }
}

impl From<Vec<&str>> for FieldsInput {
    fn from(list: Vec<&str>) -> Self {
        Self::List(list.into_iter().map(str::to_string).collect())
    }
}

impl From<Fields> for FieldsInput {
    fn from(fields: Fields) -> Self {
        Self::Fields(fields)
    }
}

// ---- query extension ----

// Longest operators first so `>=` is not read as `>`.
const QUERY_OPERATORS: [(&str, &str); 5] = [
    (">=", "gte"),
    ("<=", "lte"),
    ("=", "eq"),
    (">", "gt"),
    ("<", "lt"),
];

/// Parse a `field<op>value` shortcut such as `eo:cloud_cover<=10` into a query
/// extension object.
///
/// Numeric-looking values become JSON numbers unless `field` is listed in
/// `textual_fields`.
pub fn parse_query_shortcut(shortcut: &str, textual_fields: &[String]) -> Result<Map<String, Value>> {
    let malformed = || {
        Error::invalid_search(format!(
            "query shortcut {shortcut:?} must look like field<op>value with op one of >=, <=, =, >, <"
        ))
    };
    let (field, op, raw) = QUERY_OPERATORS
        .iter()
        .find_map(|(symbol, op)| {
            let mut parts = shortcut.split(symbol);
            match (parts.next(), parts.next(), parts.next()) {
                (Some(field), Some(value), None) => Some((field.trim(), *op, value.trim())),
                _ => None,
            }
        })
        .ok_or_else(malformed)?;
    if field.is_empty() || raw.is_empty() {
        return Err(malformed());
    }

    let value = if textual_fields.iter().any(|t| t == field) {
        Value::String(raw.to_string())
    } else {
        number_or_string(raw)
    };

    let mut comparison = Map::new();
    comparison.insert(op.to_string(), value);
    let mut query = Map::new();
    query.insert(field.to_string(), Value::Object(comparison));
    Ok(query)
}

fn number_or_string(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Number(int.into());
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or_else(|| Value::String(raw.to_string()), Value::Number)
}

/// Recursively merge `source` into `target`; nested objects merge, anything
/// else in `source` overwrites.
pub fn deep_merge(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

fn join(parts: impl Iterator<Item = String>) -> String {
    parts.collect::<Vec<_>>().join(",")
}
