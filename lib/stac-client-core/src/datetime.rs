//! Temporal filters.
//!
//! A search accepts a single instant or an interval. Users write those in many
//! ways; everything is normalized here into [`Datetime`], whose
//! [`Display`](std::fmt::Display) is the canonical wire form:
//!
//! - instants in UTC with a `Z` suffix, fractional seconds only when non-zero;
//! - intervals as `start/end`, an open side written `..`;
//! - bare dates (`2017`, `2017-06`, `2017-06-10`) cover the whole period.
//!
//! ```
//! use stac_client_core::Datetime;
//!
//! let datetime: Datetime = "2017".parse().expect("valid");
//! assert_eq!(datetime.to_string(), "2017-01-01T00:00:00Z/2017-12-31T23:59:59Z");
//!
//! let open: Datetime = "2020-03-01T12:00:00+02:00/".parse().expect("valid");
//! assert_eq!(open.to_string(), "2020-03-01T10:00:00Z/..");
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::{Error, Result};

const OPEN: &str = "..";

/// A normalized temporal filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Datetime {
    /// A single instant.
    Instant(DateTime<Utc>),
    /// An interval; `None` is an open side. Never open on both sides.
    Interval {
        /// Inclusive start.
        start: Option<DateTime<Utc>>,
        /// Inclusive end.
        end: Option<DateTime<Utc>>,
    },
}

impl Datetime {
    /// Normalize an interval, rejecting reversed or fully open ones.
    pub fn interval(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        match (start, end) {
            (None, None) => Err(Error::invalid_search(
                "datetime interval must have at least one closed side",
            )),
            (Some(start), Some(end)) if start > end => Err(Error::invalid_search(format!(
                "datetime interval start {} is after end {}",
                canonical(start),
                canonical(end)
            ))),
            _ => Ok(Self::Interval { start, end }),
        }
    }

    /// Start of the covered range, if bounded.
    #[must_use]
    pub const fn start(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Instant(instant) => Some(*instant),
            Self::Interval { start, .. } => *start,
        }
    }

    /// End of the covered range, if bounded.
    #[must_use]
    pub const fn end(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Instant(instant) => Some(*instant),
            Self::Interval { end, .. } => *end,
        }
    }
}

fn canonical(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl fmt::Display for Datetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instant(instant) => f.write_str(&canonical(*instant)),
            Self::Interval { start, end } => {
                let side = |bound: Option<DateTime<Utc>>| bound.map_or_else(|| OPEN.to_string(), canonical);
                write!(f, "{}/{}", side(*start), side(*end))
            }
        }
    }
}

impl serde::Serialize for Datetime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Which end of a bare-date period a component stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Start,
    End,
}

/// `YYYY`, `YYYY-MM` or `YYYY-MM-DD` expanded to its first and last second.
fn parse_period(text: &str) -> Option<Result<(DateTime<Utc>, DateTime<Utc>)>> {
    let parts: Vec<&str> = text.split('-').collect();
    let well_formed = match parts.as_slice() {
        [year] => year.len() == 4,
        [year, month] => year.len() == 4 && month.len() == 2,
        [year, month, day] => year.len() == 4 && month.len() == 2 && day.len() == 2,
        _ => false,
    };
    if !well_formed || !parts.iter().all(|part| part.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }

    let number = |index: usize| parts.get(index).and_then(|part| part.parse::<u32>().ok());
    let year = number(0).and_then(|year| i32::try_from(year).ok())?;
    let invalid = || Error::invalid_search(format!("invalid date {text:?}"));

    let period = match (number(1), number(2)) {
        (None, _) => NaiveDate::from_ymd_opt(year, 1, 1).zip(NaiveDate::from_ymd_opt(year, 12, 31)),
        (Some(month), None) => NaiveDate::from_ymd_opt(year, month, 1).and_then(|first| {
            let next = if month == 12 {
                NaiveDate::from_ymd_opt(year + 1, 1, 1)
            } else {
                NaiveDate::from_ymd_opt(year, month + 1, 1)
            };
            Some((first, next?.pred_opt()?))
        }),
        (Some(month), Some(day)) => NaiveDate::from_ymd_opt(year, month, day).map(|d| (d, d)),
    };

    Some(
        period
            .and_then(|(first, last)| {
                Some((
                    Utc.from_utc_datetime(&first.and_hms_opt(0, 0, 0)?),
                    Utc.from_utc_datetime(&last.and_hms_opt(23, 59, 59)?),
                ))
            })
            .ok_or_else(invalid),
    )
}

/// A full timestamp; a missing zone means UTC.
fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let upper = text.to_ascii_uppercase();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&upper) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&upper, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(Error::invalid_search(format!("invalid datetime {text:?}")))
}

fn parse_component(text: &str, side: Side) -> Result<Option<DateTime<Utc>>> {
    let text = text.trim();
    if text.is_empty() || text == OPEN {
        return Ok(None);
    }
    if let Some(period) = parse_period(text) {
        let (first, last) = period?;
        return Ok(Some(match side {
            Side::Start => first,
            Side::End => last,
        }));
    }
    parse_timestamp(text).map(Some)
}

impl FromStr for Datetime {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let components: Vec<&str> = text.split('/').collect();
        match components.as_slice() {
            [single] => {
                let single = single.trim();
                if single.is_empty() || single == OPEN {
                    return Err(Error::invalid_search("datetime must not be empty"));
                }
                match parse_period(single) {
                    Some(period) => {
                        let (first, last) = period?;
                        Self::interval(Some(first), Some(last))
                    }
                    None => parse_timestamp(single).map(Self::Instant),
                }
            }
            [start, end] => Self::interval(
                parse_component(start, Side::Start)?,
                parse_component(end, Side::End)?,
            ),
            _ => Err(Error::invalid_search(format!(
                "datetime {text:?} has more than two components"
            ))),
        }
    }
}

/// The shapes a caller may hand over as a temporal filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatetimeInput {
    /// Text: an instant, an interval, or a bare date.
    Text(String),
    /// A single instant.
    Instant(DateTime<Utc>),
    /// A pair of optional bounds.
    Range(Option<DateTime<Utc>>, Option<DateTime<Utc>>),
}

impl DatetimeInput {
    /// Normalize into a [`Datetime`].
    pub fn normalize(self) -> Result<Datetime> {
        match self {
            Self::Text(text) => text.parse(),
            Self::Instant(instant) => Ok(Datetime::Instant(instant)),
            Self::Range(start, end) => Datetime::interval(start, end),
        }
    }
}

impl From<&str> for DatetimeInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for DatetimeInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for DatetimeInput {
    fn from(instant: DateTime<Tz>) -> Self {
        Self::Instant(instant.with_timezone(&Utc))
    }
}

impl<Tz: TimeZone> From<(Option<DateTime<Tz>>, Option<DateTime<Tz>>)> for DatetimeInput {
    fn from((start, end): (Option<DateTime<Tz>>, Option<DateTime<Tz>>)) -> Self {
        Self::Range(
            start.map(|s| s.with_timezone(&Utc)),
            end.map(|e| e.with_timezone(&Utc)),
        )
    }
}

impl From<Datetime> for DatetimeInput {
    fn from(datetime: Datetime) -> Self {
        match datetime {
            Datetime::Instant(instant) => Self::Instant(instant),
            Datetime::Interval { start, end } => Self::Range(start, end),
        }
    }
}
