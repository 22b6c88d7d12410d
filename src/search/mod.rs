//! Search parameter model and per-type in-memory filters.
//!
//! Filters are pure: they run over the latest-version resource set the
//! provider returns. Every supplied parameter narrows the result
//! (conjunctive); unknown parameters do not filter.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde_json::Value;

pub mod conformance;
pub mod observation;
pub mod patient;
pub mod questionnaire_response;

/// Raw query string as repeated key/value pairs, so parameters like
/// `date=ge2024-01-01&date=le2024-12-31` compose.
#[derive(Debug, Default, Clone)]
pub struct SearchQuery(Vec<(String, String)>);

impl SearchQuery {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.0
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn token(&self, name: &str) -> Option<TokenParam> {
        self.first(name).map(TokenParam::parse)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.first(name)
    }

    pub fn reference(&self, name: &str) -> Option<ReferenceParam> {
        self.first(name).map(|v| ReferenceParam { value: v.to_string() })
    }

    pub fn uri(&self, name: &str) -> Option<&str> {
        self.first(name)
    }

    /// Combine every value supplied for `name` into one date range.
    pub fn date_range(&self, name: &str) -> Option<DateRangeParam> {
        let mut range: Option<DateRangeParam> = None;
        for value in self.all(name) {
            if let Some(bound) = DateRangeParam::parse_value(value) {
                range.get_or_insert_with(DateRangeParam::default).narrow(bound);
            }
        }
        range
    }
}

/// Token parameter: `value` or `system|value`.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenParam {
    pub system: Option<String>,
    pub value: String,
}

impl TokenParam {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('|') {
            Some((system, value)) => Self {
                system: Some(system.to_string()),
                value: value.to_string(),
            },
            None => Self { system: None, value: raw.to_string() },
        }
    }

    /// Match against a coding-like pair. A query without a system matches
    /// any system; values compare exactly.
    pub fn matches(&self, system: Option<&str>, value: Option<&str>) -> bool {
        if let Some(query_system) = &self.system {
            if Some(query_system.as_str()) != system {
                return false;
            }
        }
        value == Some(self.value.as_str())
    }

    /// Case-insensitive value match, for status-like enums.
    pub fn matches_ignore_case(&self, value: Option<&str>) -> bool {
        value.is_some_and(|v| v.eq_ignore_ascii_case(&self.value))
    }
}

/// Reference parameter, tolerant to `Type/id` and bare `id` forms.
#[derive(Debug, Clone)]
pub struct ReferenceParam {
    pub value: String,
}

impl ReferenceParam {
    pub fn matches(&self, stored: Option<&str>) -> bool {
        let Some(stored) = stored else { return false };
        stored == self.value
            || stored.ends_with(&format!("/{}", self.value))
            || stored == format!("Patient/{}", self.value)
    }

    /// Looser match used for canonical questionnaire references.
    pub fn matches_canonical(&self, stored: Option<&str>) -> bool {
        let Some(stored) = stored else { return false };
        stored == self.value
            || stored.ends_with(&format!("/{}", self.value))
            || stored.contains(&self.value)
    }
}

/// A half-open datetime window `[lower, upper)` accumulated from
/// prefixed date parameter values.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DateRangeParam {
    pub lower: Option<DateTime<Utc>>,
    pub upper: Option<DateTime<Utc>>,
}

impl DateRangeParam {
    /// Parse one query value (`ge2024-01-01`, `lt2024-06-01T12:00:00Z`,
    /// bare value = eq) into a partial range.
    fn parse_value(raw: &str) -> Option<DateRangeParam> {
        let (prefix, text) = match raw.get(..2) {
            Some(p @ ("eq" | "ge" | "gt" | "le" | "lt")) => (p, &raw[2..]),
            _ => ("eq", raw),
        };
        let (start, end) = parse_window(text)?;
        Some(match prefix {
            "ge" => DateRangeParam { lower: Some(start), upper: None },
            "gt" => DateRangeParam { lower: Some(end), upper: None },
            "le" => DateRangeParam { lower: None, upper: Some(end) },
            "lt" => DateRangeParam { lower: None, upper: Some(start) },
            _ => DateRangeParam { lower: Some(start), upper: Some(end) },
        })
    }

    fn narrow(&mut self, other: DateRangeParam) {
        if let Some(lower) = other.lower {
            self.lower = Some(self.lower.map_or(lower, |l| l.max(lower)));
        }
        if let Some(upper) = other.upper {
            self.upper = Some(self.upper.map_or(upper, |u| u.min(upper)));
        }
    }

    /// A missing timestamp never matches a range query.
    pub fn matches(&self, timestamp: Option<DateTime<Utc>>) -> bool {
        let Some(t) = timestamp else { return false };
        self.lower.map_or(true, |l| t >= l) && self.upper.map_or(true, |u| t < u)
    }
}

/// The `[start, end)` window covered by a FHIR date/datetime literal at
/// its own precision.
fn parse_window(text: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        let t = t.with_timezone(&Utc);
        return Some((t, t + chrono::Duration::seconds(1)));
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let start = d.and_hms_opt(0, 0, 0)?.and_utc();
        return Some((start, start + chrono::Duration::days(1)));
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{}-01", text), "%Y-%m-%d") {
        // year-month precision
        let start = d.and_hms_opt(0, 0, 0)?.and_utc();
        let end = if d.month() == 12 {
            NaiveDate::from_ymd_opt(d.year() + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(d.year(), d.month() + 1, 1)?
        };
        return Some((start, end.and_hms_opt(0, 0, 0)?.and_utc()));
    }
    if let Ok(year) = text.parse::<i32>() {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)?.and_utc();
        let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)?.and_hms_opt(0, 0, 0)?.and_utc();
        return Some((start, end));
    }
    None
}

/// Parse a stored FHIR date or datetime element to its window start.
pub fn parse_point(text: &str) -> Option<DateTime<Utc>> {
    parse_window(text).map(|(start, _)| start)
}

// JSON navigation helpers shared by the type filters

pub(crate) fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str()
}

pub(crate) fn array_at<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter())
        .unwrap_or_default()
}

/// Match a token parameter against any coding of a CodeableConcept.
pub(crate) fn matches_any_coding(concept: &Value, token: &TokenParam) -> bool {
    array_at(concept, "coding").any(|coding| {
        token.matches(
            str_at(coding, &["system"]),
            str_at(coding, &["code"]),
        )
    })
}

/// Match a token parameter against any element of an identifier list.
pub(crate) fn matches_any_identifier<'a>(
    mut identifiers: impl Iterator<Item = &'a Value>,
    token: &TokenParam,
) -> bool {
    identifiers.any(|identifier| {
        token.matches(
            str_at(identifier, &["system"]),
            str_at(identifier, &["value"]),
        )
    })
}
