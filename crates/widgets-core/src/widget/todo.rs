//! Todo widget: a titled list of tasks anyone can add and anyone can strike.
//!
//! Mirrors the poll widget, with two differences: a `strike` flips a task's
//! completion without recording who did it, and a list created without a
//! title gets the configured placeholder instead of staying empty.

use indexmap::IndexMap;
use serde::Serialize;

use super::{
    ApplyReport, LocalIndex, TodoAction, Widget, WidgetAction, WidgetView, checked_idx,
};
use crate::config::{DEFAULT_TASK_LIST_TITLE, MAX_IDX};
use crate::directory::UserDirectory;
use crate::error::{SchemaError, WidgetError};
use crate::event::validate;
use crate::event::{InboundEvent, SeedTask, TodoEvent, WidgetEvent, WidgetType};
use crate::identity::{SenderId, UserId};
use crate::key::TaskKey;

const WIDGET: &str = "todo";

/// Construction parameters for [`TodoState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoParams {
    /// Author of the hosting message; the only one who may retitle the list.
    pub owner: UserId,
    pub current_user: UserId,
    /// Seed title; `None` or empty means `default_title`.
    pub title: Option<String>,
    /// Seed tasks, replayed as `canned` new-task events in order.
    pub tasks: Vec<SeedTask>,
    pub default_title: String,
    pub max_idx: u32,
}

impl TodoParams {
    #[must_use]
    pub fn new(owner: UserId, current_user: UserId) -> Self {
        Self {
            owner,
            current_user,
            title: None,
            tasks: Vec::new(),
            default_title: DEFAULT_TASK_LIST_TITLE.to_string(),
            max_idx: MAX_IDX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub task: String,
    pub desc: String,
    /// Creator; only used to form the key.
    pub owner: SenderId,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskView {
    pub key: String,
    pub task: String,
    pub desc: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodoView {
    pub title: String,
    pub tasks: Vec<TaskView>,
}

#[derive(Debug, Clone)]
pub struct TodoState {
    owner: UserId,
    me: UserId,
    is_my_list: bool,
    title: String,
    input_mode: bool,
    tasks: IndexMap<TaskKey, Task>,
    next_index: LocalIndex,
    max_idx: u32,
}

impl TodoState {
    #[must_use]
    pub fn new(params: TodoParams) -> Self {
        let title = params
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or(params.default_title);
        let mut list = Self {
            owner: params.owner,
            me: params.current_user,
            is_my_list: params.owner == params.current_user,
            title,
            input_mode: false,
            tasks: IndexMap::new(),
            next_index: LocalIndex::new(),
            max_idx: params.max_idx,
        };

        let seeds = params.tasks.into_iter().enumerate().map(|(idx, seed)| {
            let event = TodoEvent::NewTask {
                key: i64::try_from(idx).unwrap_or(i64::MAX),
                task: seed.task,
                desc: seed.desc,
                completed: false,
            };
            (SenderId::Canned, event)
        });
        let report = list.apply_events(seeds);
        if !report.is_clean() {
            tracing::debug!(
                rejected = report.rejected.len(),
                "some seeded tasks were dropped"
            );
        }
        list
    }

    // -- queries ----------------------------------------------------------

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub const fn owner(&self) -> UserId {
        self.owner
    }

    #[must_use]
    pub const fn is_my_list(&self) -> bool {
        self.is_my_list
    }

    #[must_use]
    pub const fn input_mode(&self) -> bool {
        self.input_mode
    }

    #[must_use]
    pub const fn next_index(&self) -> u32 {
        self.next_index.peek()
    }

    /// Exact, case-sensitive match against every known task name.
    #[must_use]
    pub fn is_task_present(&self, name: &str) -> bool {
        self.tasks.values().any(|t| t.task == name)
    }

    #[must_use]
    pub fn task(&self, key: &TaskKey) -> Option<&Task> {
        self.tasks.get(key)
    }

    /// Tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = (&TaskKey, &Task)> {
        self.tasks.iter()
    }

    #[must_use]
    pub fn key_for(&self, name: &str) -> Option<TaskKey> {
        self.tasks
            .iter()
            .find(|(_, t)| t.task == name)
            .map(|(k, _)| *k)
    }

    // -- local presentation state -----------------------------------------

    pub const fn set_input_mode(&mut self) {
        if self.is_my_list {
            self.input_mode = true;
        }
    }

    pub const fn clear_input_mode(&mut self) {
        self.input_mode = false;
    }

    // -- outbound ---------------------------------------------------------

    /// Build a new-task event and consume a local index. Always succeeds.
    pub fn new_task_event(
        &mut self,
        task: impl Into<String>,
        desc: impl Into<String>,
    ) -> TodoEvent {
        let idx = self.next_index.reserve();
        TodoEvent::NewTask {
            key: i64::from(idx),
            task: task.into(),
            desc: desc.into(),
            completed: false,
        }
    }

    /// Pre-submit checks, then [`new_task_event`](Self::new_task_event).
    ///
    /// # Errors
    ///
    /// Returns [`WidgetError::EmptyText`] or [`WidgetError::DuplicateText`].
    pub fn compose_new_task(&mut self, task: &str, desc: &str) -> Result<TodoEvent, WidgetError> {
        let task = task.trim();
        if task.is_empty() {
            return Err(WidgetError::EmptyText);
        }
        if self.is_task_present(task) {
            return Err(WidgetError::DuplicateText(task.to_string()));
        }
        Ok(self.new_task_event(task, desc.trim()))
    }

    /// Build a title event; `None` unless this client owns the list.
    #[must_use]
    pub fn title_event(&self, title: impl Into<String>) -> Option<TodoEvent> {
        self.is_my_list.then(|| TodoEvent::NewTaskListTitle {
            title: title.into(),
        })
    }

    /// Build a strike event for a known task.
    #[must_use]
    pub fn strike_event(&self, key: &TaskKey) -> Option<TodoEvent> {
        if !self.tasks.contains_key(key) {
            tracing::error!(%key, "strike requested for unknown task");
            debug_assert!(false, "strike requested for unknown task {key}");
            return None;
        }
        Some(TodoEvent::Strike {
            key: key.to_string(),
        })
    }

    // -- inbound ----------------------------------------------------------

    /// Apply already-typed events, in order.
    pub fn apply_events(
        &mut self,
        events: impl IntoIterator<Item = (SenderId, TodoEvent)>,
    ) -> ApplyReport {
        self.apply_batch(events.into_iter().map(|(sender, e)| (sender, Ok(e))))
    }

    fn apply_batch(
        &mut self,
        events: impl IntoIterator<Item = (SenderId, Result<TodoEvent, SchemaError>)>,
    ) -> ApplyReport {
        let mut report = ApplyReport::default();
        let mut own_indices = Vec::new();

        for (index, (sender, parsed)) in events.into_iter().enumerate() {
            let outcome = parsed
                .map_err(WidgetError::from)
                .and_then(|event| self.apply(sender, &event).map(|()| event));
            match outcome {
                Ok(TodoEvent::NewTask { key, .. }) if sender == SenderId::User(self.me) => {
                    report.applied += 1;
                    own_indices.extend(u32::try_from(key).ok());
                }
                Ok(_) => report.applied += 1,
                Err(error) => report.reject(WIDGET, index, sender, &error),
            }
        }

        self.next_index.reconcile(own_indices);
        report
    }

    fn apply(&mut self, sender: SenderId, event: &TodoEvent) -> Result<(), WidgetError> {
        match event {
            TodoEvent::NewTask {
                key,
                task,
                desc,
                completed,
            } => {
                if *completed {
                    tracing::debug!(%sender, "new task arrived completed; storing as open");
                }
                self.apply_new_task(sender, *key, task, desc)
            }
            TodoEvent::Strike { key } => self.apply_strike(key),
            TodoEvent::NewTaskListTitle { title } => self.apply_title(sender, title),
        }
    }

    fn apply_new_task(
        &mut self,
        sender: SenderId,
        idx: i64,
        task: &str,
        desc: &str,
    ) -> Result<(), WidgetError> {
        if self.is_task_present(task) {
            return Err(WidgetError::DuplicateText(task.to_string()));
        }
        let idx = checked_idx(idx, self.max_idx)?;

        let key = TaskKey::new(idx, sender);
        if self.tasks.contains_key(&key) {
            return Err(WidgetError::KeyInUse(key.to_string()));
        }
        self.tasks.insert(
            key,
            Task {
                task: task.to_string(),
                desc: desc.to_string(),
                owner: sender,
                completed: false,
            },
        );
        Ok(())
    }

    fn apply_strike(&mut self, key: &str) -> Result<(), WidgetError> {
        let task = key
            .parse::<TaskKey>()
            .ok()
            .and_then(|k| self.tasks.get_mut(&k))
            .ok_or_else(|| WidgetError::UnknownKey(key.to_string()))?;
        task.completed = !task.completed;
        Ok(())
    }

    fn apply_title(&mut self, sender: SenderId, title: &str) -> Result<(), WidgetError> {
        if sender != SenderId::User(self.owner) {
            return Err(WidgetError::Unauthorized {
                sender,
                owner: SenderId::User(self.owner),
                field: "task list title",
            });
        }
        self.title = title.to_string();
        self.input_mode = false;
        Ok(())
    }

    // -- view -------------------------------------------------------------

    #[must_use]
    pub fn view(&self) -> TodoView {
        TodoView {
            title: self.title.clone(),
            tasks: self
                .tasks
                .iter()
                .map(|(key, t)| TaskView {
                    key: key.to_string(),
                    task: t.task.clone(),
                    desc: t.desc.clone(),
                    completed: t.completed,
                })
                .collect(),
        }
    }
}

impl Widget for TodoState {
    fn widget_type(&self) -> &'static str {
        WidgetType::Todo.as_str()
    }

    fn handle_events(&mut self, events: &[InboundEvent]) -> ApplyReport {
        self.apply_batch(
            events
                .iter()
                .map(|e| (e.sender, validate::todo_event(&e.data))),
        )
    }

    fn perform(&mut self, action: &WidgetAction) -> Result<Option<WidgetEvent>, WidgetError> {
        let WidgetAction::Todo(action) = action else {
            return Err(WidgetError::ActionMismatch {
                action: action.name(),
                widget_type: WIDGET,
            });
        };
        let event = match action {
            TodoAction::AddTask { task, desc } => Some(self.compose_new_task(task, desc)?),
            TodoAction::SetTitle(title) => {
                let title = title.trim();
                if title.is_empty() {
                    return Err(WidgetError::EmptyText);
                }
                self.title_event(title)
            }
            TodoAction::Strike(key) => self.strike_event(key),
        };
        Ok(event.map(WidgetEvent::Todo))
    }

    fn view(&self, _users: &dyn UserDirectory) -> WidgetView {
        WidgetView::Todo(Self::view(self))
    }
}
