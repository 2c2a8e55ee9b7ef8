//! Widget types and the catalog of event kinds each one understands.
//!
//! The string forms are the `type` discriminants used on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Built-in widget types.
///
/// The host registry is keyed by string so that types unknown to this build
/// can still be recognized (and ignored); this enum only names the ones
/// implemented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetType {
    Poll,
    Todo,
}

impl WidgetType {
    pub const ALL: [Self; 2] = [Self::Poll, Self::Todo];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Todo => "todo",
        }
    }
}

impl fmt::Display for WidgetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a widget type this build does not implement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown widget type '{0}'")]
pub struct UnknownWidgetType(pub String);

impl FromStr for WidgetType {
    type Err = UnknownWidgetType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poll" => Ok(Self::Poll),
            "todo" => Ok(Self::Todo),
            _ => Err(UnknownWidgetType(s.to_string())),
        }
    }
}

/// Every inbound event kind, across all widget types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Poll: add an option.
    NewOption,
    /// Poll: replace the question (owner only).
    Question,
    /// Poll: cast or retract the sender's vote on one option.
    Vote,
    /// Todo: add a task.
    NewTask,
    /// Todo: toggle a task's completion.
    Strike,
    /// Todo: replace the list title (owner only).
    NewTaskListTitle,
}

/// Error returned when parsing an unknown event kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind {
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown event type '{}': expected one of new_option, question, vote, \
             new_task, strike, new_task_list_title",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEventKind {}

impl EventKind {
    /// All known kinds in catalog order.
    pub const ALL: [Self; 6] = [
        Self::NewOption,
        Self::Question,
        Self::Vote,
        Self::NewTask,
        Self::Strike,
        Self::NewTaskListTitle,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewOption => "new_option",
            Self::Question => "question",
            Self::Vote => "vote",
            Self::NewTask => "new_task",
            Self::Strike => "strike",
            Self::NewTaskListTitle => "new_task_list_title",
        }
    }

    /// The widget type that owns this kind.
    #[must_use]
    pub const fn widget_type(self) -> WidgetType {
        match self {
            Self::NewOption | Self::Question | Self::Vote => WidgetType::Poll,
            Self::NewTask | Self::Strike | Self::NewTaskListTitle => WidgetType::Todo,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind { raw: s.to_string() })
    }
}
