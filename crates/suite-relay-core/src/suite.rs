//! Suite / test tree as reported by a remote client.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};

/// Message used when a client reports a failure without saying what it was.
pub const UNKNOWN_ERROR: &str = "unknown error";

// Remote clients send `null` for unset fields as often as they omit them.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Error payload reported by a remote client.
#[derive(Debug, Clone, Default, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct RemoteError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Assertion details and anything else the client attached.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RemoteError {
    /// Create an error with just a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Create a named error.
    #[must_use]
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Interpret whatever a client sent as an error value.
    ///
    /// Objects are read as error payloads, strings become the message and
    /// a missing or `null` value becomes [`UNKNOWN_ERROR`]. Anything else
    /// is kept as its JSON text.
    #[must_use]
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::new(UNKNOWN_ERROR),
            Some(Value::String(s)) => Self::new(s.as_str()),
            Some(v @ Value::Object(_)) => {
                Self::deserialize(v).unwrap_or_else(|_| Self::new(v.to_string()))
            }
            Some(other) => Self::new(other.to_string()),
        }
    }
}

/// A single test result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_passed: bool,
    /// Skip reason, when the test was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
    /// Milliseconds, kept as the number the client sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_elapsed: Option<Number>,
    /// Fields this crate does not interpret, kept for faithful re-emission.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Test {
    /// Create a test with a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A child of a suite: nested suite or leaf test.
///
/// Suites are recognized by their `tests` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SuiteChild {
    Suite(Suite),
    Test(Test),
}

impl From<Test> for SuiteChild {
    fn from(test: Test) -> Self {
        Self::Test(test)
    }
}

impl From<Suite> for SuiteChild {
    fn from(suite: Suite) -> Self {
        Self::Suite(suite)
    }
}

/// A suite node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suite {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// False only for the root suite reported by a remote client.
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_parent: bool,
    pub tests: Vec<SuiteChild>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_elapsed: Option<Number>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Suite {
    /// Create an empty suite.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Whether this is a root suite.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        !self.has_parent
    }

    /// Total number of leaf tests, recursively.
    #[must_use]
    pub fn num_tests(&self) -> usize {
        self.tests
            .iter()
            .map(|child| match child {
                SuiteChild::Suite(s) => s.num_tests(),
                SuiteChild::Test(_) => 1,
            })
            .sum()
    }

    /// Number of leaf tests that failed, recursively.
    #[must_use]
    pub fn num_failed(&self) -> usize {
        self.tests
            .iter()
            .map(|child| match child {
                SuiteChild::Suite(s) => s.num_failed(),
                SuiteChild::Test(t) => usize::from(t.error.is_some()),
            })
            .sum()
    }
}
