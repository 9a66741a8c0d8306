//! Tagged lifecycle events decoded from relayed messages.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::message::event_args;
use crate::suite::{RemoteError, Suite, Test};

pub const RUN_START: &str = "runStart";
pub const RUN_END: &str = "runEnd";
pub const SUITE_START: &str = "suiteStart";
pub const SUITE_END: &str = "suiteEnd";
pub const SUITE_ERROR: &str = "suiteError";
pub const FATAL_ERROR: &str = "fatalError";
pub const TEST_START: &str = "testStart";
pub const TEST_PASS: &str = "testPass";
pub const TEST_FAIL: &str = "testFail";
pub const TEST_SKIP: &str = "testSkip";
pub const TEST_END: &str = "testEnd";
pub const ERROR: &str = "error";

/// Event decode error.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("{event}: missing argument {index}")]
    MissingArgument { event: String, index: usize },
    #[error("{event}: invalid payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One lifecycle event with its typed payload.
///
/// Events this crate does not interpret, and events relayed without
/// interpretation, are kept as [`SuiteEvent::Other`] so they are re-emitted
/// exactly as received.
#[derive(Debug, Clone, PartialEq)]
pub enum SuiteEvent {
    RunStart,
    RunEnd,
    SuiteStart(Suite),
    SuiteEnd(Suite),
    SuiteError { suite: Suite, error: RemoteError },
    FatalError(RemoteError),
    TestStart(Test),
    TestPass(Test),
    TestFail(Test),
    TestSkip(Test),
    TestEnd(Test),
    Other { name: String, args: Vec<Value> },
}

impl SuiteEvent {
    /// Decode an event from its wire name and payload.
    ///
    /// # Errors
    /// Returns error if a known event is missing or has a malformed argument.
    pub fn decode(name: &str, data: &Value) -> Result<Self, EventError> {
        let args = event_args(data);
        let event = match name {
            RUN_START => Self::RunStart,
            RUN_END => Self::RunEnd,
            SUITE_START => Self::SuiteStart(arg(name, &args, 0)?),
            SUITE_END => Self::SuiteEnd(arg(name, &args, 0)?),
            SUITE_ERROR => {
                let suite: Suite = arg(name, &args, 0)?;
                let error = match args.get(1) {
                    Some(v) if !v.is_null() => RemoteError::from_value(Some(v)),
                    _ => suite
                        .error
                        .clone()
                        .unwrap_or_else(|| RemoteError::from_value(None)),
                };
                Self::SuiteError { suite, error }
            }
            FATAL_ERROR => Self::FatalError(RemoteError::from_value(args.first())),
            TEST_START => Self::TestStart(arg(name, &args, 0)?),
            TEST_PASS => Self::TestPass(arg(name, &args, 0)?),
            TEST_FAIL => Self::TestFail(arg(name, &args, 0)?),
            TEST_SKIP => Self::TestSkip(arg(name, &args, 0)?),
            TEST_END => Self::TestEnd(arg(name, &args, 0)?),
            _ => Self::Other {
                name: name.to_string(),
                args,
            },
        };
        Ok(event)
    }

    /// An event carried as-is, without looking at its arguments.
    #[must_use]
    pub fn verbatim(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Other {
            name: name.into(),
            args,
        }
    }

    /// Wire name of this event.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::RunStart => RUN_START,
            Self::RunEnd => RUN_END,
            Self::SuiteStart(_) => SUITE_START,
            Self::SuiteEnd(_) => SUITE_END,
            Self::SuiteError { .. } => SUITE_ERROR,
            Self::FatalError(_) => FATAL_ERROR,
            Self::TestStart(_) => TEST_START,
            Self::TestPass(_) => TEST_PASS,
            Self::TestFail(_) => TEST_FAIL,
            Self::TestSkip(_) => TEST_SKIP,
            Self::TestEnd(_) => TEST_END,
            Self::Other { name, .. } => name,
        }
    }

    /// Argument list in wire form.
    #[must_use]
    pub fn args(&self) -> Vec<Value> {
        fn json<T: serde::Serialize>(value: &T) -> Value {
            serde_json::to_value(value).unwrap_or(Value::Null)
        }

        match self {
            Self::RunStart | Self::RunEnd => Vec::new(),
            Self::SuiteStart(suite) | Self::SuiteEnd(suite) => vec![json(suite)],
            Self::SuiteError { suite, error } => vec![json(suite), json(error)],
            Self::FatalError(error) => vec![json(error)],
            Self::TestStart(test)
            | Self::TestPass(test)
            | Self::TestFail(test)
            | Self::TestSkip(test)
            | Self::TestEnd(test) => vec![json(test)],
            Self::Other { args, .. } => args.clone(),
        }
    }

    /// The suite this event is about, if any.
    #[must_use]
    pub fn suite(&self) -> Option<&Suite> {
        match self {
            Self::SuiteStart(suite) | Self::SuiteEnd(suite) | Self::SuiteError { suite, .. } => {
                Some(suite)
            }
            _ => None,
        }
    }
}

fn arg<T: DeserializeOwned>(event: &str, args: &[Value], index: usize) -> Result<T, EventError> {
    let value = args.get(index).ok_or_else(|| EventError::MissingArgument {
        event: event.to_string(),
        index,
    })?;
    T::deserialize(value).map_err(|source| EventError::Payload {
        event: event.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_root_suite_start() {
        let data = json!([{ "name": "unit", "hasParent": false, "tests": [{ "name": "t1" }] }]);
        let event = SuiteEvent::decode("suiteStart", &data).unwrap();
        let suite = event.suite().unwrap();
        assert!(suite.is_root());
        assert_eq!(suite.tests.len(), 1);
        assert_eq!(event.name(), "suiteStart");
    }

    #[test]
    fn test_decode_accepts_bare_object_payload() {
        let event = SuiteEvent::decode("testEnd", &json!({ "name": "t1", "hasPassed": true })).unwrap();
        match event {
            SuiteEvent::TestEnd(test) => assert!(test.has_passed),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_suite_error_falls_back_to_suite_field() {
        let data = json!([{
            "name": "unit",
            "tests": [],
            "error": { "message": "setup failed" }
        }]);
        let event = SuiteEvent::decode("suiteError", &data).unwrap();
        match event {
            SuiteEvent::SuiteError { error, .. } => assert_eq!(error.message, "setup failed"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_suite_error_without_error_is_unknown() {
        let data = json!([{ "name": "unit", "tests": [] }]);
        match SuiteEvent::decode("suiteError", &data).unwrap() {
            SuiteEvent::SuiteError { error, .. } => assert_eq!(error.message, "unknown error"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_fatal_error_accepts_any_shape() {
        for (data, message) in [
            (json!(["boom"]), "boom"),
            (Value::Null, "unknown error"),
            (json!([null]), "unknown error"),
            (json!([{ "message": "x", "showDiff": true }]), "x"),
        ] {
            match SuiteEvent::decode("fatalError", &data).unwrap() {
                SuiteEvent::FatalError(error) => assert_eq!(error.message, message),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[test]
    fn test_verbatim_event_is_not_reencoded() {
        let args = vec![json!({ "name": "t1", "timeElapsed": 5, "hasPassed": null })];
        let event = SuiteEvent::verbatim("testEnd", args.clone());
        assert_eq!(event.name(), "testEnd");
        assert_eq!(event.args(), args);
    }

    #[test]
    fn test_unknown_event_keeps_arguments() {
        let data = json!(["a", 1, { "b": true }]);
        let event = SuiteEvent::decode("coverage", &data).unwrap();
        assert_eq!(event.name(), "coverage");
        assert_eq!(event.args(), vec![json!("a"), json!(1), json!({ "b": true })]);
    }

    #[test]
    fn test_missing_suite_argument() {
        let err = SuiteEvent::decode("suiteEnd", &Value::Null).unwrap_err();
        assert!(err.to_string().contains("missing argument 0"));
    }
}
