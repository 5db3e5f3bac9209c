use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::RoutingError;
use crate::path::FieldPath;

/// Comparison operator of a [`Predicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Field equals the literal.
    Eq,
    /// Field differs from the literal (or is absent).
    Ne,
    /// Field equals one of the literal array's elements.
    In,
    /// Field equals none of the literal array's elements (or is absent).
    NotIn,
    /// Numeric `>`.
    Gt,
    /// Numeric `>=`.
    Gte,
    /// Numeric `<`.
    Lt,
    /// Numeric `<=`.
    Lte,
    /// Field is present and non-null (literal `false` inverts the test).
    Exists,
}

impl Operator {
    fn is_numeric(self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }
}

/// Wire form of a predicate, validated into a [`Predicate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPredicate {
    field: String,
    op: Operator,
    #[serde(default)]
    value: Value,
}

/// A single filter condition evaluated against an event payload.
///
/// Predicates are validated when they are built: the path must be
/// well-formed, numeric operators need a numeric literal, and set
/// operators need an array literal.
///
/// # Examples
///
/// ```
/// use hookline_routing::{Operator, Predicate};
/// use serde_json::json;
///
/// let big = Predicate::new("data.amount", Operator::Gte, json!(1000)).unwrap();
/// assert!(big.evaluate(&json!({"data": {"amount": 2500}})));
/// assert!(!big.evaluate(&json!({"data": {"amount": 10}})));
///
/// assert!(Predicate::new("data.amount", Operator::Gt, json!("lots")).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPredicate", into = "RawPredicate")]
pub struct Predicate {
    path: FieldPath,
    op: Operator,
    value: Value,
}

impl Predicate {
    /// Build and validate a predicate.
    pub fn new(path: &str, op: Operator, value: Value) -> Result<Self, RoutingError> {
        let path = FieldPath::parse(path)?;
        let invalid = |reason: &str| RoutingError::InvalidPredicate {
            path: path.to_string(),
            reason: reason.to_owned(),
        };

        match op {
            _ if op.is_numeric() && !value.is_number() => {
                return Err(invalid("numeric comparison requires a numeric literal"));
            }
            Operator::In | Operator::NotIn if !value.is_array() => {
                return Err(invalid("set membership requires an array literal"));
            }
            Operator::Exists if !(value.is_null() || value.is_boolean()) => {
                return Err(invalid("exists accepts only a boolean literal"));
            }
            _ => {}
        }

        Ok(Self { path, op, value })
    }

    /// Shorthand for an equality predicate.
    pub fn equals(path: &str, value: Value) -> Result<Self, RoutingError> {
        Self::new(path, Operator::Eq, value)
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    pub fn operator(&self) -> Operator {
        self.op
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Evaluate the predicate against a payload.
    ///
    /// A missing field fails every operator except `Ne`, `NotIn`, and
    /// `Exists` with a `false` literal.
    pub fn evaluate(&self, payload: &Value) -> bool {
        let field = self.path.resolve(payload);
        match self.op {
            Operator::Eq => field.is_some_and(|f| values_equal(f, &self.value)),
            Operator::Ne => !field.is_some_and(|f| values_equal(f, &self.value)),
            Operator::In => field.is_some_and(|f| self.set_contains(f)),
            Operator::NotIn => !field.is_some_and(|f| self.set_contains(f)),
            Operator::Gt => self.compare(field, Ordering::is_gt),
            Operator::Gte => self.compare(field, Ordering::is_ge),
            Operator::Lt => self.compare(field, Ordering::is_lt),
            Operator::Lte => self.compare(field, Ordering::is_le),
            Operator::Exists => {
                let present = field.is_some_and(|f| !f.is_null());
                present == self.value.as_bool().unwrap_or(true)
            }
        }
    }

    fn set_contains(&self, field: &Value) -> bool {
        self.value
            .as_array()
            .is_some_and(|set| set.iter().any(|v| values_equal(field, v)))
    }

    fn compare(&self, field: Option<&Value>, accept: impl Fn(Ordering) -> bool) -> bool {
        match (field, &self.value) {
            (Some(Value::Number(actual)), Value::Number(expected)) => {
                number_order(actual, expected).is_some_and(accept)
            }
            _ => false,
        }
    }
}

/// Evaluate a conjunction of predicates. An empty list always matches.
pub fn all_match(predicates: &[Predicate], payload: &Value) -> bool {
    predicates.iter().all(|p| p.evaluate(payload))
}

/// Equality that treats `1` and `1.0` as the same number.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_order(x, y) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Integers compare exactly; only a pair involving a float goes through
/// `f64`, where integers above 2^53 would collide.
fn number_order(x: &Number, y: &Number) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
        return Some(x.cmp(&y));
    }
    x.as_f64()?.partial_cmp(&y.as_f64()?)
}

impl TryFrom<RawPredicate> for Predicate {
    type Error = RoutingError;

    fn try_from(raw: RawPredicate) -> Result<Self, Self::Error> {
        Self::new(&raw.field, raw.op, raw.value)
    }
}

impl From<Predicate> for RawPredicate {
    fn from(p: Predicate) -> Self {
        Self {
            field: p.path.into(),
            op: p.op,
            value: p.value,
        }
    }
}
