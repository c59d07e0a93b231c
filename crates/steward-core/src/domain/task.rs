//! Task identity and scalar parameters.
//!
//! identity はレジストリの lookup key です（例: `"PopulateSchedulerTask"`）。
//! parameters は名前付きスカラー値の map で、そのまま行に JSON で保存されます。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Stable string naming a registered task implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskIdentity(String);

impl TaskIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A parameter value. Only scalars are allowed; nested structures are not representable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// CLI などの文字列入力から最も具体的な型を推測する。失敗しない（最後は Text）
impl FromStr for Scalar {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = match s {
            "null" => Self::Null,
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => {
                if let Ok(i) = s.parse::<i64>() {
                    Self::Int(i)
                } else if let Ok(f) = s.parse::<f64>() {
                    Self::Float(f)
                } else {
                    Self::Text(s.to_string())
                }
            }
        };
        Ok(value)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Named scalar parameters handed to a task. Ordered so the stored JSON is stable.
pub type Parameters = BTreeMap<String, Scalar>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::null("null", Scalar::Null)]
    #[case::bool_true("true", Scalar::Bool(true))]
    #[case::int("42", Scalar::Int(42))]
    #[case::negative("-7", Scalar::Int(-7))]
    #[case::float("2.5", Scalar::Float(2.5))]
    #[case::text("hello", Scalar::Text("hello".into()))]
    #[case::padded_number(" 42", Scalar::Text(" 42".into()))]
    fn scalar_from_str_infers_type(#[case] input: &str, #[case] expected: Scalar) {
        assert_eq!(input.parse::<Scalar>().unwrap(), expected);
    }

    #[test]
    fn parameters_serialize_as_flat_json_object() {
        let mut params = Parameters::new();
        params.insert("source".into(), "catalog".into());
        params.insert("limit".into(), 10.into());
        params.insert("dry_run".into(), false.into());
        params.insert("missing".into(), Scalar::Null);

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"dry_run": false, "limit": 10, "missing": null, "source": "catalog"})
        );

        let back: Parameters = serde_json::from_value(json).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn nested_values_are_rejected() {
        let result = serde_json::from_str::<Parameters>(r#"{"nested": {"a": 1}}"#);
        assert!(result.is_err());
    }
}
