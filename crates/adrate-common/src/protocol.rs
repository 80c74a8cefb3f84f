use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Event parameters, keyed by name. Ordered so that serialized events are stable.
pub type Params = BTreeMap<String, Scalar>;

/// Accepts RFC 3339 timestamps as well as naive ISO-8601 ones (no offset),
/// which older action logs contain. Naive values are taken to be UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Ok(ts.with_timezone(&Utc)),
        Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|n| n.and_utc()),
    }
}

/// A single scalar parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    /// Numeric view of the value. Booleans map to 0/1 and numeric text is parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value as f64)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

/// Kind of recorded interaction. Unrecognized names are kept as `Other`
/// so they survive a save/load cycle unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Navigate,
    Click,
    Scroll,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Navigate => "navigate",
            EventKind::Click => "click",
            EventKind::Scroll => "scroll",
            EventKind::Other(name) => name,
        }
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "navigate" => EventKind::Navigate,
            "click" => EventKind::Click,
            "scroll" => EventKind::Scroll,
            _ => EventKind::Other(value),
        }
    }
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        EventKind::from(value.to_string())
    }
}

impl From<EventKind> for String {
    fn from(value: EventKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded interaction. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub params: Params,
}

impl Event {
    /// Create an event stamped with the current wall-clock time.
    pub fn new(kind: EventKind, params: Params) -> Self {
        Self::at(Utc::now(), kind, params)
    }

    pub fn at(timestamp: DateTime<Utc>, kind: EventKind, params: Params) -> Self {
        Self {
            timestamp,
            kind,
            params,
        }
    }

    pub fn navigate(url: &str) -> Self {
        Self::new(EventKind::Navigate, Params::from([("url".into(), url.into())]))
    }

    pub fn click(x: i64, y: i64) -> Self {
        Self::new(
            EventKind::Click,
            Params::from([("x".into(), x.into()), ("y".into(), y.into())]),
        )
    }

    pub fn scroll(direction: &str, amount: i64) -> Self {
        Self::new(
            EventKind::Scroll,
            Params::from([
                ("direction".into(), direction.into()),
                ("amount".into(), amount.into()),
            ]),
        )
    }

    pub fn param(&self, key: &str) -> Option<&Scalar> {
        self.params.get(key)
    }

    /// Numeric value of a parameter, if present and numeric.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.param(key).and_then(Scalar::as_f64)
    }
}
