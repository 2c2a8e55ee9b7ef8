use std::fmt;

use crate::event::EventKind;
use crate::identity::{MessageId, SenderId, UserId};

/// Machine-readable error codes surfaced on the diagnostic channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    MalformedPayload,
    UnknownEventKind,
    OversizedPayload,
    UnauthorizedSender,
    DuplicateText,
    EmptyText,
    IndexOutOfRange,
    UnknownKey,
    KeyInUse,
    HijackAttempt,
    UnknownWidgetType,
    NotAWidgetMessage,
    EmptyBatch,
    UnparseableSubmessageId,
    ActionMismatch,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`W####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MalformedPayload => "W1001",
            Self::UnknownEventKind => "W1002",
            Self::OversizedPayload => "W1003",
            Self::UnauthorizedSender => "W2001",
            Self::DuplicateText => "W3001",
            Self::EmptyText => "W3002",
            Self::IndexOutOfRange => "W3003",
            Self::UnknownKey => "W3004",
            Self::KeyInUse => "W3005",
            Self::HijackAttempt => "W4001",
            Self::UnknownWidgetType => "W4002",
            Self::NotAWidgetMessage => "W4003",
            Self::EmptyBatch => "W4004",
            Self::UnparseableSubmessageId => "W4005",
            Self::ActionMismatch => "W4006",
            Self::InternalUnexpected => "W9001",
        }
    }

    /// Short human-facing summary for logs.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::MalformedPayload => "Malformed widget event payload",
            Self::UnknownEventKind => "Unknown widget event type",
            Self::OversizedPayload => "Widget event payload too large",
            Self::UnauthorizedSender => "Sender may not perform this change",
            Self::DuplicateText => "Entry text already present",
            Self::EmptyText => "Entry text is empty",
            Self::IndexOutOfRange => "Entry index out of range",
            Self::UnknownKey => "Unknown option or task key",
            Self::KeyInUse => "Option or task key already taken",
            Self::HijackAttempt => "Widget setup sent by someone other than the message author",
            Self::UnknownWidgetType => "Unknown widget type",
            Self::NotAWidgetMessage => "Submessage is not a widget submessage",
            Self::EmptyBatch => "No submessages to replay",
            Self::UnparseableSubmessageId => "Submessage id is not an integer",
            Self::ActionMismatch => "Action does not apply to this widget type",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::MalformedPayload | Self::UnknownEventKind => {
                Some("The sending client is buggy or hostile; the event was dropped.")
            }
            Self::OversizedPayload => {
                Some("Raise `max_payload_bytes` if the payload is legitimate.")
            }
            Self::UnknownWidgetType => {
                Some("Newer clients may introduce widget types; upgrade this client.")
            }
            Self::HijackAttempt => Some("Check the reported sender; nothing was rendered."),
            Self::InternalUnexpected => Some("Report a bug with logs."),
            Self::UnauthorizedSender
            | Self::DuplicateText
            | Self::EmptyText
            | Self::IndexOutOfRange
            | Self::UnknownKey
            | Self::KeyInUse
            | Self::NotAWidgetMessage
            | Self::EmptyBatch
            | Self::UnparseableSubmessageId
            | Self::ActionMismatch => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A payload failed structural validation before reaching a state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The content does not parse as JSON.
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    /// The payload is not a JSON object with a string `type` field.
    #[error("payload has no string `type` discriminant")]
    MissingType,

    /// The `type` discriminant is not known to the widget.
    #[error("unknown event type '{0}'")]
    UnknownKind(String),

    /// Fields are missing or have the wrong type.
    #[error("invalid {kind} payload: {reason}")]
    Malformed { kind: EventKind, reason: String },

    /// The widget setup (`extra_data`) does not match its schema.
    #[error("invalid {widget_type} setup data: {reason}")]
    MalformedSetup { widget_type: String, reason: String },

    /// The serialized payload exceeds the configured limit.
    #[error("payload is {size} bytes, exceeds limit of {limit} bytes")]
    Oversized { size: usize, limit: usize },
}

impl SchemaError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidJson(_)
            | Self::MissingType
            | Self::Malformed { .. }
            | Self::MalformedSetup { .. } => ErrorCode::MalformedPayload,
            Self::UnknownKind(_) => ErrorCode::UnknownEventKind,
            Self::Oversized { .. } => ErrorCode::OversizedPayload,
        }
    }
}

/// Reasons a state machine refuses an event or a local action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WidgetError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("sender {sender} may not change the {field}; owner is {owner}")]
    Unauthorized {
        sender: SenderId,
        owner: SenderId,
        field: &'static str,
    },

    #[error("'{0}' is already present")]
    DuplicateText(String),

    #[error("text is empty")]
    EmptyText,

    #[error("index {idx} outside 0..={max}")]
    IndexOutOfRange { idx: i64, max: u32 },

    #[error("unknown key '{0}'")]
    UnknownKey(String),

    #[error("key '{0}' is already taken")]
    KeyInUse(String),

    #[error("{action} cannot be performed on a {widget_type} widget")]
    ActionMismatch {
        action: &'static str,
        widget_type: &'static str,
    },

    #[error("failed to encode outbound event: {0}")]
    Encode(String),
}

impl WidgetError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Schema(e) => e.code(),
            Self::Unauthorized { .. } => ErrorCode::UnauthorizedSender,
            Self::DuplicateText(_) => ErrorCode::DuplicateText,
            Self::EmptyText => ErrorCode::EmptyText,
            Self::IndexOutOfRange { .. } => ErrorCode::IndexOutOfRange,
            Self::UnknownKey(_) => ErrorCode::UnknownKey,
            Self::KeyInUse(_) => ErrorCode::KeyInUse,
            Self::ActionMismatch { .. } => ErrorCode::ActionMismatch,
            Self::Encode(_) => ErrorCode::InternalUnexpected,
        }
    }
}

/// Reasons a buffered submessage history cannot become a live widget.
///
/// None of these are fatal to the caller; the hosting message simply renders
/// without a widget.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    #[error("no submessages to replay for message {0}")]
    EmptyBatch(MessageId),

    #[error("User {claimed} tried to hijack message {message_id}")]
    Hijack {
        message_id: MessageId,
        claimed: UserId,
        author: UserId,
    },

    #[error("first submessage of message {message_id} has msg_type '{msg_type}', expected 'widget'")]
    NotAWidget {
        message_id: MessageId,
        msg_type: String,
    },

    #[error(transparent)]
    Setup(#[from] SchemaError),

    #[error("unknown widget type '{0}'")]
    UnknownWidgetType(String),

    #[error("widget type '{0}' is retired")]
    Retired(String),
}

impl ReplayError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::EmptyBatch(_) => ErrorCode::EmptyBatch,
            Self::Hijack { .. } => ErrorCode::HijackAttempt,
            Self::NotAWidget { .. } => ErrorCode::NotAWidgetMessage,
            Self::Setup(e) => e.code(),
            Self::UnknownWidgetType(_) | Self::Retired(_) => ErrorCode::UnknownWidgetType,
        }
    }
}
