//! Validation boundary for untrusted widget payloads.
//!
//! Everything that arrives from another client passes through here before a
//! state machine sees it. Three checks, in order:
//!
//! 1. **Size**: the raw content is no larger than the configured limit.
//! 2. **Discriminant**: the payload is an object with a string `type` that
//!    names an event kind of the receiving widget.
//! 3. **Shape**: typed deserialization of the payload for that kind.
//!
//! Failures are returned as [`SchemaError`]; the caller logs them and moves
//! on to the next event in the batch.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::data::{PollEvent, PollSetup, TodoEvent, TodoSetup, WidgetSetup};
use super::types::{EventKind, WidgetType};
use crate::error::SchemaError;

/// Parse raw submessage content into JSON, enforcing the size limit.
///
/// # Errors
///
/// Returns [`SchemaError::Oversized`] when `content` exceeds `limit` bytes,
/// or [`SchemaError::InvalidJson`] when it does not parse.
pub fn parse_content(content: &str, limit: usize) -> Result<Value, SchemaError> {
    if content.len() > limit {
        return Err(SchemaError::Oversized {
            size: content.len(),
            limit,
        });
    }
    serde_json::from_str(content).map_err(|e| SchemaError::InvalidJson(e.to_string()))
}

/// Read and resolve the `type` discriminant of a payload.
///
/// # Errors
///
/// Returns an error if `type` is missing, not a string, unknown, or belongs
/// to a different widget.
pub fn event_kind(widget: WidgetType, data: &Value) -> Result<EventKind, SchemaError> {
    let raw = data
        .get("type")
        .and_then(Value::as_str)
        .ok_or(SchemaError::MissingType)?;

    let kind: EventKind = raw
        .parse()
        .map_err(|_| SchemaError::UnknownKind(raw.to_string()))?;

    if kind.widget_type() != widget {
        return Err(SchemaError::UnknownKind(raw.to_string()));
    }
    Ok(kind)
}

fn typed<T: DeserializeOwned>(kind: EventKind, data: &Value) -> Result<T, SchemaError> {
    T::deserialize(data).map_err(|e| SchemaError::Malformed {
        kind,
        reason: e.to_string(),
    })
}

/// Validate a poll payload.
///
/// # Errors
///
/// Returns a [`SchemaError`] describing the first structural problem.
pub fn poll_event(data: &Value) -> Result<PollEvent, SchemaError> {
    let kind = event_kind(WidgetType::Poll, data)?;
    typed(kind, data)
}

/// Validate a todo payload.
///
/// # Errors
///
/// Returns a [`SchemaError`] describing the first structural problem.
pub fn todo_event(data: &Value) -> Result<TodoEvent, SchemaError> {
    let kind = event_kind(WidgetType::Todo, data)?;
    typed(kind, data)
}

/// Validate the content of a widget's first submessage.
///
/// # Errors
///
/// Returns [`SchemaError::MalformedSetup`] if `widget_type` is missing.
pub fn widget_setup(data: &Value) -> Result<WidgetSetup, SchemaError> {
    WidgetSetup::deserialize(data).map_err(|e| SchemaError::MalformedSetup {
        widget_type: "unknown".to_string(),
        reason: e.to_string(),
    })
}

fn setup<T: DeserializeOwned + Default>(
    widget: WidgetType,
    extra_data: Option<&Value>,
) -> Result<T, SchemaError> {
    match extra_data {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => T::deserialize(value).map_err(|e| SchemaError::MalformedSetup {
            widget_type: widget.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Validate poll seed data.
///
/// # Errors
///
/// Returns [`SchemaError::MalformedSetup`] on a shape mismatch.
pub fn poll_setup(extra_data: Option<&Value>) -> Result<PollSetup, SchemaError> {
    setup(WidgetType::Poll, extra_data)
}

/// Validate todo seed data.
///
/// # Errors
///
/// Returns [`SchemaError::MalformedSetup`] on a shape mismatch.
pub fn todo_setup(extra_data: Option<&Value>) -> Result<TodoSetup, SchemaError> {
    setup(WidgetType::Todo, extra_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::event::data::VoteDirection;
    use serde_json::json;

    #[test]
    fn accepts_well_formed_vote() {
        let e = poll_event(&json!({"type": "vote", "key": "5,0", "vote": 1})).expect("valid");
        assert_eq!(
            e,
            PollEvent::Vote {
                key: "5,0".into(),
                vote: VoteDirection::Cast
            }
        );
    }

    #[test]
    fn rejects_missing_type() {
        assert_eq!(
            poll_event(&json!({"question": "x"})),
            Err(SchemaError::MissingType)
        );
        assert_eq!(poll_event(&json!(42)), Err(SchemaError::MissingType));
        assert_eq!(
            poll_event(&json!({"type": 3})),
            Err(SchemaError::MissingType)
        );
    }

    #[test]
    fn rejects_kind_of_other_widget() {
        let err = poll_event(&json!({"type": "strike", "key": "0,1"})).unwrap_err();
        assert_eq!(err, SchemaError::UnknownKind("strike".into()));
    }

    #[test]
    fn rejects_wrong_field_types() {
        let cases = [
            json!({"type": "new_option", "idx": "1", "option": "a"}),
            json!({"type": "new_option", "idx": 1.5, "option": "a"}),
            json!({"type": "new_option", "idx": 1}),
            json!({"type": "question", "question": null}),
            json!({"type": "vote", "key": 7, "vote": 1}),
            json!({"type": "vote", "key": "5,0", "vote": 2}),
        ];
        for case in cases {
            let err = poll_event(&case).unwrap_err();
            assert!(
                matches!(err, SchemaError::Malformed { .. }),
                "expected malformed for {case}, got {err:?}"
            );
        }
    }

    #[test]
    fn todo_new_task_requires_every_field() {
        let complete = json!({
            "type": "new_task", "key": 0, "task": "a", "desc": "", "completed": false
        });
        assert!(todo_event(&complete).is_ok());
        let missing = json!({"type": "new_task", "key": 0, "task": "a", "desc": ""});
        let err = todo_event(&missing).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Malformed {
                kind: EventKind::NewTask,
                ..
            }
        ));
    }

    #[test]
    fn content_size_limit() {
        let err = parse_content(&"x".repeat(11), 10).unwrap_err();
        assert_eq!(
            err,
            SchemaError::Oversized {
                size: 11,
                limit: 10
            }
        );
        assert!(parse_content("{\"type\":\"vote\"}", 100).is_ok());
    }

    #[test]
    fn unparseable_content_is_invalid_json_not_missing_type() {
        for raw in ["{not json", "not json", ""] {
            let err = parse_content(raw, 100).unwrap_err();
            assert!(matches!(err, SchemaError::InvalidJson(_)), "{err:?}");
            assert_eq!(err.code(), ErrorCode::MalformedPayload);
        }
    }

    #[test]
    fn setup_validation() {
        let poll = poll_setup(Some(&json!({"question": "Lunch?", "options": ["a", "b"]})))
            .expect("valid");
        assert_eq!(poll.options, vec!["a".to_string(), "b".to_string()]);

        assert_eq!(poll_setup(None), Ok(PollSetup::default()));
        assert!(poll_setup(Some(&json!({"options": "a"}))).is_err());
        assert!(todo_setup(Some(&json!({"tasks": [{"task": "a"}]}))).is_err());

        let setup = widget_setup(&json!({"widget_type": "poll"})).expect("valid");
        assert_eq!(setup.widget_type, "poll");
        assert!(widget_setup(&json!({"extra_data": {}})).is_err());
    }
}
