//! Typed payloads for every widget event, plus the setup payloads carried by
//! the first submessage of a widget.
//!
//! Payloads are internally tagged by `type`. Unknown extra fields are
//! ignored so that newer clients can add data without breaking older ones.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::EventKind;

// ---------------------------------------------------------------------------
// VoteDirection
// ---------------------------------------------------------------------------

/// Absolute membership intent carried by a vote: add me, or remove me.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteDirection {
    /// `1` on the wire.
    Cast,
    /// `-1` on the wire.
    Retract,
}

impl VoteDirection {
    #[must_use]
    pub const fn as_i8(self) -> i8 {
        match self {
            Self::Cast => 1,
            Self::Retract => -1,
        }
    }
}

impl fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i8())
    }
}

impl Serialize for VoteDirection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.as_i8())
    }
}

impl<'de> Deserialize<'de> for VoteDirection {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match i64::deserialize(deserializer)? {
            1 => Ok(Self::Cast),
            -1 => Ok(Self::Retract),
            other => Err(serde::de::Error::custom(format!(
                "vote must be 1 or -1, got {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Poll events
// ---------------------------------------------------------------------------

/// Events understood by the poll widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PollEvent {
    /// Add an option; `idx` is the sender's local creation index.
    NewOption { idx: i64, option: String },
    /// Replace the question.
    Question { question: String },
    /// Cast or retract the sender's vote for the option named by `key`.
    Vote { key: String, vote: VoteDirection },
}

impl PollEvent {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::NewOption { .. } => EventKind::NewOption,
            Self::Question { .. } => EventKind::Question,
            Self::Vote { .. } => EventKind::Vote,
        }
    }
}

// ---------------------------------------------------------------------------
// Todo events
// ---------------------------------------------------------------------------

/// Events understood by the todo widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TodoEvent {
    /// Add a task. `key` is the sender's local creation index (the wire
    /// name is historical).
    NewTask {
        key: i64,
        task: String,
        desc: String,
        completed: bool,
    },
    /// Toggle completion of the task named by `key`.
    Strike { key: String },
    /// Replace the list title.
    NewTaskListTitle { title: String },
}

impl TodoEvent {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::NewTask { .. } => EventKind::NewTask,
            Self::Strike { .. } => EventKind::Strike,
            Self::NewTaskListTitle { .. } => EventKind::NewTaskListTitle,
        }
    }
}

// ---------------------------------------------------------------------------
// WidgetEvent
// ---------------------------------------------------------------------------

/// Any event a local widget may produce.
///
/// Serializes to the inner payload only; the `type` tag inside it is the
/// discriminant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WidgetEvent {
    Poll(PollEvent),
    Todo(TodoEvent),
}

impl WidgetEvent {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Poll(e) => e.kind(),
            Self::Todo(e) => e.kind(),
        }
    }

    /// Serialize to a JSON value for posting.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (should not happen with
    /// well-formed data).
    pub fn to_json_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl From<PollEvent> for WidgetEvent {
    fn from(e: PollEvent) -> Self {
        Self::Poll(e)
    }
}

impl From<TodoEvent> for WidgetEvent {
    fn from(e: TodoEvent) -> Self {
        Self::Todo(e)
    }
}

// ---------------------------------------------------------------------------
// Setup payloads
// ---------------------------------------------------------------------------

/// Content of the first submessage of a widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetSetup {
    /// Registry discriminant, e.g. `poll`.
    pub widget_type: String,

    /// Widget-specific seed data, validated by the widget's activator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<serde_json::Value>,
}

/// Seed data for a poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSetup {
    #[serde(default)]
    pub question: String,

    /// Initial options, replayed as `canned` new-option events.
    #[serde(default)]
    pub options: Vec<String>,
}

/// One seeded task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedTask {
    pub task: String,
    pub desc: String,
}

/// Seed data for a todo list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoSetup {
    /// Empty or missing means the configured placeholder title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_list_title: Option<String>,

    #[serde(default)]
    pub tasks: Vec<SeedTask>,
}
