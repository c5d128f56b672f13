//! Spine event records and line parsing.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

pub const LISTENER_START: &str = "listener.start";
pub const LISTENER_CRASH: &str = "listener.crash";
pub const INVARIANT_VIOLATION: &str = "invariant.violation";
pub const MARKET_REGIME: &str = "market.regime";
pub const MARKET_REGIME_CHANGE: &str = "market.regime_change";

/// Event types the router folds. Anything else is carried through the
/// reader untouched and ignored by the reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ListenerStart,
    ListenerCrash,
    InvariantViolation,
    MarketRegime,
    MarketRegimeChange,
    Other,
}

impl EventKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            LISTENER_START => EventKind::ListenerStart,
            LISTENER_CRASH => EventKind::ListenerCrash,
            INVARIANT_VIOLATION => EventKind::InvariantViolation,
            MARKET_REGIME => EventKind::MarketRegime,
            MARKET_REGIME_CHANGE => EventKind::MarketRegimeChange,
            _ => EventKind::Other,
        }
    }

    /// System-wide events re-evaluate every known symbol.
    pub fn is_system_wide(&self) -> bool {
        matches!(
            self,
            EventKind::ListenerStart | EventKind::ListenerCrash | EventKind::InvariantViolation
        )
    }
}

/// One parsed line of the spine. Immutable once read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpineEvent {
    pub event_type: String,
    pub payload: Map<String, Value>,
    pub event_id: Option<String>,
    pub timestamp: Option<String>,
    /// Byte offset of the line within the spine file.
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Json(String),
    NotObject,
    MissingEventType,
    PayloadNotObject,
    InvalidUtf8,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Json(e) => write!(f, "invalid json: {}", e),
            ParseError::NotObject => write!(f, "line is not a json object"),
            ParseError::MissingEventType => write!(f, "event_type missing or not a string"),
            ParseError::PayloadNotObject => write!(f, "payload is not an object"),
            ParseError::InvalidUtf8 => write!(f, "line is not valid utf-8"),
        }
    }
}

impl std::error::Error for ParseError {}

impl SpineEvent {
    pub fn new(event_type: &str, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            event_type: event_type.to_string(),
            payload,
            event_id: None,
            timestamp: None,
            offset: 0,
        }
    }

    pub fn with_provenance(mut self, event_id: &str, timestamp: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self.timestamp = Some(timestamp.to_string());
        self
    }

    /// Parse one non-blank spine line.
    ///
    /// A missing `payload` is read as an empty object. Non-string
    /// `event_id`/`timestamp` values are dropped rather than rejected: the
    /// event still folds into state, it just cannot source an emission.
    pub fn parse(line: &str, offset: u64) -> Result<Self, ParseError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| ParseError::Json(e.to_string()))?;
        let Value::Object(mut map) = value else {
            return Err(ParseError::NotObject);
        };

        let event_type = match map.remove("event_type") {
            Some(Value::String(s)) => s,
            _ => return Err(ParseError::MissingEventType),
        };
        let payload = match map.remove("payload") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(p)) => p,
            Some(_) => return Err(ParseError::PayloadNotObject),
        };
        let event_id = match map.remove("event_id") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };
        let timestamp = match map.remove("timestamp") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };

        Ok(Self {
            event_type,
            payload,
            event_id,
            timestamp,
            offset,
        })
    }

    pub fn kind(&self) -> EventKind {
        EventKind::from_type(&self.event_type)
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    /// `(event_id, timestamp)` when both are present.
    pub fn provenance(&self) -> Option<(&str, &str)> {
        match (&self.event_id, &self.timestamp) {
            (Some(id), Some(ts)) => Some((id.as_str(), ts.as_str())),
            _ => None,
        }
    }
}
