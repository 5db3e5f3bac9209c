use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;

/// A single segment of a parsed [`EventPattern`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Literal(String),
    Wildcard,
}

/// A dot-segmented event-type pattern.
///
/// Matching is case-sensitive and follows these rules:
///
/// - `*` on its own matches every event type.
/// - A literal segment matches only the identical segment.
/// - A `*` segment in a non-final position matches exactly one segment, so
///   `*.paid` matches `invoice.paid` but not `invoice.payment.paid`.
/// - A trailing `*` segment matches one or more remaining segments, so
///   `invoice.*` matches `invoice.paid` and `invoice.payment.failed` but not
///   `invoice` itself.
///
/// # Examples
///
/// ```
/// use hookline_routing::EventPattern;
///
/// let pattern = EventPattern::parse("invoice.*").unwrap();
/// assert!(pattern.matches("invoice.paid"));
/// assert!(pattern.matches("invoice.payment.failed"));
/// assert!(!pattern.matches("invoice"));
/// assert!(!pattern.matches("Invoice.paid"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl EventPattern {
    /// Parse an event-type pattern.
    ///
    /// Rejects empty patterns, empty segments (`a..b`), and segments that mix
    /// `*` with other characters (`inv*`).
    pub fn parse(raw: &str) -> Result<Self, RoutingError> {
        let invalid = |reason: &str| RoutingError::InvalidPattern {
            pattern: raw.to_owned(),
            reason: reason.to_owned(),
        };

        if raw.is_empty() {
            return Err(invalid("pattern must not be empty"));
        }

        let mut segments = Vec::new();
        for part in raw.split('.') {
            if part.is_empty() {
                return Err(invalid("pattern segments must not be empty"));
            }
            if part == "*" {
                segments.push(Segment::Wildcard);
            } else if part.contains('*') {
                return Err(invalid("'*' must occupy a whole segment"));
            } else {
                segments.push(Segment::Literal(part.to_owned()));
            }
        }

        Ok(Self {
            raw: raw.to_owned(),
            segments,
        })
    }

    /// The pattern that matches every event type.
    pub fn any() -> Self {
        Self {
            raw: "*".into(),
            segments: vec![Segment::Wildcard],
        }
    }

    /// Return the pattern as originally written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern matches every event type.
    pub fn is_match_all(&self) -> bool {
        self.segments == [Segment::Wildcard]
    }

    /// Test an event type against this pattern.
    pub fn matches(&self, event_type: &str) -> bool {
        if self.is_match_all() {
            return !event_type.is_empty();
        }

        let parts: Vec<&str> = event_type.split('.').collect();
        let last = self.segments.len() - 1;

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Wildcard if i == last => return parts.len() > i,
                Segment::Wildcard => {
                    if parts.get(i).is_none_or(|p| p.is_empty()) {
                        return false;
                    }
                }
                Segment::Literal(lit) => {
                    if parts.get(i) != Some(&lit.as_str()) {
                        return false;
                    }
                }
            }
        }

        parts.len() == self.segments.len()
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for EventPattern {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EventPattern {
    type Error = RoutingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EventPattern> for String {
    fn from(pattern: EventPattern) -> Self {
        pattern.raw
    }
}
