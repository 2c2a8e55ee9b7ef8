//! Widget state machines.
//!
//! Each widget owns its shared state and changes it only by applying inbound
//! events, including the echoes of its own outbound events. Application is
//! receiver-enforced: every event is validated and authorized at apply time
//! and a rejected event leaves state untouched. Nothing a peer sends can make
//! [`Widget::handle_events`] fail; problems are logged and reported in the
//! returned [`ApplyReport`].

pub mod poll;
pub mod todo;

pub use poll::{PollOption, PollOptionView, PollParams, PollState, PollView};
pub use todo::{Task, TaskView, TodoParams, TodoState, TodoView};

use serde::Serialize;

use crate::directory::UserDirectory;
use crate::error::{ErrorCode, WidgetError};
use crate::event::{InboundEvent, WidgetEvent};
use crate::identity::SenderId;
use crate::key::{PollKey, TaskKey};

// ---------------------------------------------------------------------------
// Widget trait
// ---------------------------------------------------------------------------

/// The uniform contract every widget type satisfies.
pub trait Widget {
    /// Registry discriminant of this widget, e.g. `poll`.
    fn widget_type(&self) -> &'static str;

    /// Apply a batch of inbound events in order.
    fn handle_events(&mut self, events: &[InboundEvent]) -> ApplyReport;

    /// Turn a local UI action into the event to post, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the action fails a local pre-submit check or
    /// does not apply to this widget type.
    fn perform(&mut self, action: &WidgetAction) -> Result<Option<WidgetEvent>, WidgetError>;

    /// Materialized view for rendering.
    fn view(&self, users: &dyn UserDirectory) -> WidgetView;
}

// ---------------------------------------------------------------------------
// Actions and views
// ---------------------------------------------------------------------------

/// Local UI intents for a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollAction {
    AddOption(String),
    SetQuestion(String),
    ToggleVote(PollKey),
}

/// Local UI intents for a todo list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoAction {
    AddTask { task: String, desc: String },
    SetTitle(String),
    Strike(TaskKey),
}

/// Any local UI intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetAction {
    Poll(PollAction),
    Todo(TodoAction),
}

impl WidgetAction {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Poll(PollAction::AddOption(_)) => "add-option",
            Self::Poll(PollAction::SetQuestion(_)) => "set-question",
            Self::Poll(PollAction::ToggleVote(_)) => "toggle-vote",
            Self::Todo(TodoAction::AddTask { .. }) => "add-task",
            Self::Todo(TodoAction::SetTitle(_)) => "set-title",
            Self::Todo(TodoAction::Strike(_)) => "strike",
        }
    }
}

impl From<PollAction> for WidgetAction {
    fn from(a: PollAction) -> Self {
        Self::Poll(a)
    }
}

impl From<TodoAction> for WidgetAction {
    fn from(a: TodoAction) -> Self {
        Self::Todo(a)
    }
}

/// What a renderer consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "widget_type", rename_all = "lowercase")]
pub enum WidgetView {
    Poll(PollView),
    Todo(TodoView),
}

// ---------------------------------------------------------------------------
// ApplyReport
// ---------------------------------------------------------------------------

/// One event dropped from a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Position of the event in the batch (0-based).
    pub index: usize,
    pub sender: SenderId,
    pub code: ErrorCode,
    pub reason: String,
}

/// Outcome of applying one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub rejected: Vec<Rejection>,
}

impl ApplyReport {
    /// `true` if every event in the batch was applied.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Number of events seen (applied + rejected).
    #[must_use]
    pub const fn total(&self) -> usize {
        self.applied + self.rejected.len()
    }

    /// Record a dropped event and log it.
    pub(crate) fn reject(
        &mut self,
        widget: &'static str,
        index: usize,
        sender: SenderId,
        error: &WidgetError,
    ) {
        tracing::warn!(
            widget,
            index,
            %sender,
            code = %error.code(),
            "dropping widget event: {error}"
        );
        self.rejected.push(Rejection {
            index,
            sender,
            code: error.code(),
            reason: error.to_string(),
        });
    }

    /// Fold a report for a sub-batch into this one. `positions` maps the
    /// sub-batch's indices back to indices of this batch.
    pub fn absorb(&mut self, other: Self, positions: &[usize]) {
        self.applied += other.applied;
        self.rejected
            .extend(other.rejected.into_iter().map(|mut r| {
                r.index = positions.get(r.index).copied().unwrap_or(r.index);
                r
            }));
        self.rejected.sort_by_key(|r| r.index);
    }
}

// ---------------------------------------------------------------------------
// LocalIndex
// ---------------------------------------------------------------------------

/// Per-client counter of locally created options or tasks.
///
/// Reserving is unconditional: the index is consumed even if the receiving
/// side later rejects the entry. The counter only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalIndex {
    next: u32,
}

impl LocalIndex {
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// The index the next local creation will carry.
    #[must_use]
    pub const fn peek(self) -> u32 {
        self.next
    }

    /// Take the next index.
    pub const fn reserve(&mut self) -> u32 {
        let idx = self.next;
        self.next = self.next.saturating_add(1);
        idx
    }

    /// Advance past indices this user created on another device.
    ///
    /// Never moves backwards.
    pub fn reconcile(&mut self, observed: impl IntoIterator<Item = u32>) {
        if let Some(max) = observed.into_iter().max() {
            let candidate = max.saturating_add(1);
            if candidate > self.next {
                tracing::debug!(from = self.next, to = candidate, "advancing local index");
                self.next = candidate;
            }
        }
    }
}

/// Check a wire index against `0..=max`.
pub(crate) fn checked_idx(idx: i64, max: u32) -> Result<u32, WidgetError> {
    u32::try_from(idx)
        .ok()
        .filter(|&i| i <= max)
        .ok_or(WidgetError::IndexOutOfRange { idx, max })
}
