//! Synchronization policy: whether acknowledging a message waits for its listeners.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::event::{ERROR, RUN_END, SUITE_END, TEST_END};
use crate::message::Message;

const ON_FAILURE: &str = "fail";

/// When the relay waits for listeners before acknowledging a message.
///
/// Serialized as `false`, `true`, `"fail"` or a list of event names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Never wait.
    #[default]
    Never,
    /// Wait for every event.
    Always,
    /// Wait only for failing `testEnd`/`suiteEnd` events and `error`.
    OnFailure,
    /// Wait for the named events.
    Events(Vec<String>),
}

impl SyncPolicy {
    /// Whether acknowledging `message` must wait for its listeners.
    ///
    /// `runEnd` is never waited on: its own listeners may depend on the
    /// ack having been sent.
    #[must_use]
    pub fn should_wait(&self, message: &Message) -> bool {
        let name = message.name.as_str();
        if name == RUN_END {
            return false;
        }

        match self {
            Self::Never => false,
            Self::Always => true,
            Self::OnFailure => {
                ((name == TEST_END || name == SUITE_END) && message.has_error_payload())
                    || name == ERROR
            }
            Self::Events(names) => names.iter().any(|n| n == name),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawPolicy {
    Flag(bool),
    Mode(String),
    Events(Vec<String>),
}

impl Serialize for SyncPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = match self {
            Self::Never => RawPolicy::Flag(false),
            Self::Always => RawPolicy::Flag(true),
            Self::OnFailure => RawPolicy::Mode(ON_FAILURE.to_string()),
            Self::Events(names) => RawPolicy::Events(names.clone()),
        };
        raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SyncPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawPolicy::deserialize(deserializer)? {
            RawPolicy::Flag(false) => Ok(Self::Never),
            RawPolicy::Flag(true) => Ok(Self::Always),
            RawPolicy::Mode(mode) if mode == ON_FAILURE => Ok(Self::OnFailure),
            RawPolicy::Mode(mode) => Err(serde::de::Error::custom(format!(
                "unknown sync mode {mode:?}, expected \"{ON_FAILURE}\""
            ))),
            RawPolicy::Events(names) => Ok(Self::Events(names)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn msg(name: &str, data: Value) -> Message {
        Message::new(1, "S1", name, data)
    }

    fn all_policies() -> Vec<SyncPolicy> {
        vec![
            SyncPolicy::Never,
            SyncPolicy::Always,
            SyncPolicy::OnFailure,
            SyncPolicy::Events(vec!["runEnd".into(), "testEnd".into()]),
        ]
    }

    #[test]
    fn test_never_waits_by_default() {
        let policy = SyncPolicy::default();
        assert!(!policy.should_wait(&msg("testEnd", json!([{ "error": { "message": "x" } }]))));
        assert!(!policy.should_wait(&msg("suiteStart", Value::Null)));
    }

    #[test]
    fn test_always_waits_except_run_end() {
        let policy = SyncPolicy::Always;
        assert!(policy.should_wait(&msg("suiteStart", Value::Null)));
        assert!(policy.should_wait(&msg("testPass", Value::Null)));
        assert!(!policy.should_wait(&msg("runEnd", Value::Null)));
    }

    #[test]
    fn test_fail_mode_only_waits_on_failures() {
        let policy = SyncPolicy::OnFailure;
        assert!(policy.should_wait(&msg("testEnd", json!({ "error": { "message": "x" } }))));
        assert!(policy.should_wait(&msg("suiteEnd", json!([{ "error": { "message": "x" } }]))));
        assert!(policy.should_wait(&msg("error", Value::Null)));
        assert!(!policy.should_wait(&msg("testEnd", json!({ "hasPassed": true }))));
        assert!(!policy.should_wait(&msg("testFail", json!({ "error": { "message": "x" } }))));
    }

    #[test]
    fn test_event_list_membership() {
        let policy = SyncPolicy::Events(vec!["testStart".into()]);
        assert!(policy.should_wait(&msg("testStart", Value::Null)));
        assert!(!policy.should_wait(&msg("testEnd", Value::Null)));
    }

    #[test]
    fn test_run_end_never_waits() {
        for policy in all_policies() {
            assert!(!policy.should_wait(&msg("runEnd", Value::Null)));
        }
    }

    #[test]
    fn test_policy_wire_shapes() {
        let cases = [
            (json!(false), SyncPolicy::Never),
            (json!(true), SyncPolicy::Always),
            (json!("fail"), SyncPolicy::OnFailure),
            (json!(["testEnd"]), SyncPolicy::Events(vec!["testEnd".into()])),
        ];
        for (raw, expected) in cases {
            let parsed: SyncPolicy = serde_json::from_value(raw.clone()).unwrap();
            assert_eq!(parsed, expected);
            assert_eq!(serde_json::to_value(&parsed).unwrap(), raw);
        }
        assert!(serde_json::from_value::<SyncPolicy>(json!("sometimes")).is_err());
    }
}
