//! Hosting widgets inside chat messages.
//!
//! [`WidgetRegistry`] maps a `widget_type` string to an activator.
//! [`ActiveWidget`] wraps one activated state machine together with its
//! render sink and outbound callback, and is the only inbound entry point for
//! that widget. [`WidgetHost`] keeps the active widgets of one client, keyed by
//! hosting message.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::WidgetConfig;
use crate::directory::UserDirectory;
use crate::error::{ReplayError, SchemaError, WidgetError};
use crate::event::validate;
use crate::event::{InboundEvent, WidgetType};
use crate::identity::{MessageId, SenderId, UserId};
use crate::replay::{self, HostingMessage, Submessage, WIDGET_MSG_TYPE};
use crate::widget::{
    ApplyReport, PollParams, PollState, TodoParams, TodoState, Widget, WidgetAction, WidgetView,
};

// ---------------------------------------------------------------------------
// Host-facing callbacks
// ---------------------------------------------------------------------------

/// Where rendered views go.
pub trait RenderSink {
    fn render(&mut self, message_id: MessageId, view: &WidgetView);
}

impl<F> RenderSink for F
where
    F: FnMut(MessageId, &WidgetView),
{
    fn render(&mut self, message_id: MessageId, view: &WidgetView) {
        self(message_id, view);
    }
}

/// A sink that drops every view.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl RenderSink for NullSink {
    fn render(&mut self, _message_id: MessageId, _view: &WidgetView) {}
}

/// The body of a `POST` to the submessage endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundSubmessage {
    pub message_id: MessageId,
    pub msg_type: String,
    /// JSON-encoded event.
    pub content: String,
}

/// Callback that ships outbound submessages to the server.
pub type Outbound = Box<dyn FnMut(OutboundSubmessage)>;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Everything an activator needs to build a widget.
#[derive(Debug, Clone, Copy)]
pub struct ActivationContext<'a> {
    pub message: HostingMessage,
    pub current_user: UserId,
    pub config: &'a WidgetConfig,
    /// Widget-specific seed data from the setup submessage.
    pub extra_data: Option<&'a Value>,
}

/// Builds a widget from its activation context.
pub type Activator = fn(&ActivationContext<'_>) -> Result<Box<dyn Widget>, SchemaError>;

/// Maps widget type discriminants to activators.
#[derive(Clone, Default)]
pub struct WidgetRegistry {
    activators: HashMap<String, Activator>,
}

impl fmt::Debug for WidgetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.activators.keys().map(String::as_str).collect();
        types.sort_unstable();
        f.debug_struct("WidgetRegistry")
            .field("types", &types)
            .finish()
    }
}

impl WidgetRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with `poll` and `todo` registered.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(WidgetType::Poll.as_str(), activate_poll);
        registry.register(WidgetType::Todo.as_str(), activate_todo);
        registry
    }

    /// Register (or replace) the activator for `widget_type`.
    pub fn register(&mut self, widget_type: impl Into<String>, activator: Activator) {
        let widget_type = widget_type.into();
        let replaced = self.activators.insert(widget_type.clone(), activator);
        if replaced.is_some() {
            tracing::debug!(%widget_type, "replaced widget activator");
        }
    }

    #[must_use]
    pub fn is_registered(&self, widget_type: &str) -> bool {
        self.activators.contains_key(widget_type)
    }

    /// Build the widget for `widget_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Retired`] or [`ReplayError::UnknownWidgetType`]
    /// for unregistered types, or [`ReplayError::Setup`] when the activator
    /// rejects the seed data.
    pub fn activate(
        &self,
        widget_type: &str,
        ctx: &ActivationContext<'_>,
    ) -> Result<Box<dyn Widget>, ReplayError> {
        let Some(activator) = self.activators.get(widget_type) else {
            if ctx.config.is_retired(widget_type) {
                return Err(ReplayError::Retired(widget_type.to_string()));
            }
            return Err(ReplayError::UnknownWidgetType(widget_type.to_string()));
        };
        Ok(activator(ctx)?)
    }
}

fn activate_poll(ctx: &ActivationContext<'_>) -> Result<Box<dyn Widget>, SchemaError> {
    let setup = validate::poll_setup(ctx.extra_data)?;
    let mut params = PollParams::new(ctx.message.sender_id, ctx.current_user);
    params.question = setup.question;
    params.options = setup.options;
    params.max_idx = ctx.config.max_idx;
    Ok(Box::new(PollState::new(params)))
}

fn activate_todo(ctx: &ActivationContext<'_>) -> Result<Box<dyn Widget>, SchemaError> {
    let setup = validate::todo_setup(ctx.extra_data)?;
    let mut params = TodoParams::new(ctx.message.sender_id, ctx.current_user);
    params.title = setup.task_list_title;
    params.tasks = setup.tasks;
    let title = &ctx.config.default_task_list_title;
    params.default_title.clone_from(title);
    params.max_idx = ctx.config.max_idx;
    Ok(Box::new(TodoState::new(params)))
}

// ---------------------------------------------------------------------------
// ActiveWidget
// ---------------------------------------------------------------------------

/// One activated widget and its plumbing.
pub struct ActiveWidget {
    message: HostingMessage,
    widget: Box<dyn Widget>,
    users: Rc<dyn UserDirectory>,
    sink: Box<dyn RenderSink>,
    outbound: Outbound,
    applied: BTreeSet<u64>,
    max_payload_bytes: usize,
}

impl fmt::Debug for ActiveWidget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveWidget")
            .field("message", &self.message)
            .field("widget_type", &self.widget.widget_type())
            .field("applied", &self.applied.len())
            .finish_non_exhaustive()
    }
}

impl ActiveWidget {
    #[must_use]
    pub fn new(
        message: HostingMessage,
        widget: Box<dyn Widget>,
        users: Rc<dyn UserDirectory>,
        sink: Box<dyn RenderSink>,
        outbound: Outbound,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            message,
            widget,
            users,
            sink,
            outbound,
            applied: BTreeSet::new(),
            max_payload_bytes,
        }
    }

    #[must_use]
    pub const fn message(&self) -> HostingMessage {
        self.message
    }

    #[must_use]
    pub fn widget_type(&self) -> &'static str {
        self.widget.widget_type()
    }

    /// Whether the submessage with this id has already been processed.
    #[must_use]
    pub fn has_applied(&self, id: u64) -> bool {
        self.applied.contains(&id)
    }

    pub(crate) fn mark_applied(&mut self, id: u64) {
        self.applied.insert(id);
    }

    /// Apply a batch of submessages in the given order, then re-render.
    ///
    /// Ids seen before are skipped. Non-widget traffic is skipped. Content
    /// that fails to parse is reported like any other rejected event.
    pub fn handle_submessages(&mut self, batch: Vec<(u64, Submessage)>) -> ApplyReport {
        let mut report = ApplyReport::default();
        let mut events = Vec::with_capacity(batch.len());
        let mut positions = Vec::with_capacity(batch.len());

        for (index, (id, sub)) in batch.into_iter().enumerate() {
            if !self.applied.insert(id) {
                tracing::debug!(
                    message_id = %self.message.id,
                    id,
                    "skipping already applied submessage"
                );
                continue;
            }
            if sub.msg_type != WIDGET_MSG_TYPE {
                tracing::debug!(
                    message_id = %self.message.id,
                    id,
                    msg_type = %sub.msg_type,
                    "ignoring non-widget submessage"
                );
                continue;
            }
            let sender = SenderId::User(sub.sender_id);
            match validate::parse_content(&sub.content, self.max_payload_bytes) {
                Ok(data) => {
                    events.push(InboundEvent { sender, data });
                    positions.push(index);
                }
                Err(err) => {
                    let err = WidgetError::from(err);
                    report.reject(self.widget.widget_type(), index, sender, &err);
                }
            }
        }

        let applied = self.widget.handle_events(&events);
        report.absorb(applied, &positions);
        self.render();
        report
    }

    /// Apply already-parsed events directly, bypassing id bookkeeping.
    pub fn handle_events(&mut self, events: &[InboundEvent]) -> ApplyReport {
        let report = self.widget.handle_events(events);
        self.render();
        report
    }

    /// Run a local UI action and post the resulting event, if any.
    ///
    /// Local state only changes once the event echoes back from the server.
    ///
    /// # Errors
    ///
    /// Returns the widget's pre-submit error, or [`WidgetError::Encode`] if
    /// the event cannot be serialized.
    pub fn perform(
        &mut self,
        action: &WidgetAction,
    ) -> Result<Option<OutboundSubmessage>, WidgetError> {
        let Some(event) = self.widget.perform(action)? else {
            return Ok(None);
        };
        let content = serde_json::to_string(&event)
            .map_err(|e| WidgetError::Encode(e.to_string()))?;
        let submessage = OutboundSubmessage {
            message_id: self.message.id,
            msg_type: WIDGET_MSG_TYPE.to_string(),
            content,
        };
        tracing::debug!(
            message_id = %self.message.id,
            kind = %event.kind(),
            "posting widget event"
        );
        (self.outbound)(submessage.clone());
        Ok(Some(submessage))
    }

    #[must_use]
    pub fn view(&self) -> WidgetView {
        self.widget.view(self.users.as_ref())
    }

    pub fn render(&mut self) {
        let view = self.view();
        self.sink.render(self.message.id, &view);
    }
}

// ---------------------------------------------------------------------------
// WidgetHost
// ---------------------------------------------------------------------------

/// The active widgets of one client.
pub struct WidgetHost {
    registry: WidgetRegistry,
    config: WidgetConfig,
    current_user: UserId,
    users: Rc<dyn UserDirectory>,
    widgets: HashMap<MessageId, ActiveWidget>,
}

impl fmt::Debug for WidgetHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetHost")
            .field("registry", &self.registry)
            .field("current_user", &self.current_user)
            .field("widgets", &self.widgets.len())
            .finish_non_exhaustive()
    }
}

impl WidgetHost {
    #[must_use]
    pub fn new(current_user: UserId, config: WidgetConfig, users: Rc<dyn UserDirectory>) -> Self {
        Self {
            registry: WidgetRegistry::with_builtin(),
            config,
            current_user,
            users,
            widgets: HashMap::new(),
        }
    }

    /// Replace the registry, e.g. to add widget types.
    #[must_use]
    pub fn with_registry(mut self, registry: WidgetRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub const fn current_user(&self) -> UserId {
        self.current_user
    }

    #[must_use]
    pub const fn config(&self) -> &WidgetConfig {
        &self.config
    }

    #[must_use]
    pub fn widget(&self, message_id: MessageId) -> Option<&ActiveWidget> {
        self.widgets.get(&message_id)
    }

    pub fn widget_mut(&mut self, message_id: MessageId) -> Option<&mut ActiveWidget> {
        self.widgets.get_mut(&message_id)
    }

    #[must_use]
    pub fn is_active(&self, message_id: MessageId) -> bool {
        self.widgets.contains_key(&message_id)
    }

    /// Activate the widget of `message` from its buffered submessages and
    /// replay the history after the setup.
    ///
    /// A message that is already active is rebuilt from scratch.
    ///
    /// # Errors
    ///
    /// Returns a [`ReplayError`] when the history cannot be activated; the
    /// message then has no widget.
    pub fn process_submessages(
        &mut self,
        message: HostingMessage,
        submessages: impl IntoIterator<Item = Submessage>,
        sink: Box<dyn RenderSink>,
        outbound: Outbound,
    ) -> Result<ApplyReport, ReplayError> {
        let result = self.activate(message, submessages, sink, outbound);
        if let Err(err) = &result {
            self.widgets.remove(&message.id);
            if let ReplayError::Retired(widget_type) = err {
                tracing::debug!(message_id = %message.id, %widget_type, "ignoring retired widget");
            } else {
                tracing::warn!(
                    message_id = %message.id,
                    code = %err.code(),
                    "widget not activated: {err}"
                );
            }
        }
        result
    }

    fn activate(
        &mut self,
        message: HostingMessage,
        submessages: impl IntoIterator<Item = Submessage>,
        sink: Box<dyn RenderSink>,
        outbound: Outbound,
    ) -> Result<ApplyReport, ReplayError> {
        let plan = replay::prepare(message, submessages, self.config.max_payload_bytes)?;
        let ctx = ActivationContext {
            message,
            current_user: self.current_user,
            config: &self.config,
            extra_data: plan.setup.extra_data.as_ref(),
        };
        let widget = self.registry.activate(&plan.setup.widget_type, &ctx)?;

        let mut active = ActiveWidget::new(
            message,
            widget,
            Rc::clone(&self.users),
            sink,
            outbound,
            self.config.max_payload_bytes,
        );
        active.mark_applied(plan.setup_id);
        let report = active.handle_submessages(plan.history);
        tracing::debug!(
            message_id = %message.id,
            widget_type = active.widget_type(),
            applied = report.applied,
            rejected = report.rejected.len(),
            "widget activated"
        );
        if self.widgets.insert(message.id, active).is_some() {
            tracing::debug!(message_id = %message.id, "replaced active widget");
        }
        Ok(report)
    }

    /// Apply live submessages for an active widget.
    ///
    /// Returns `None` when the message has no active widget; such traffic is
    /// inert.
    pub fn handle_events(
        &mut self,
        message_id: MessageId,
        submessages: impl IntoIterator<Item = Submessage>,
    ) -> Option<ApplyReport> {
        let Some(active) = self.widgets.get_mut(&message_id) else {
            tracing::debug!(%message_id, "submessages for a message without a widget");
            return None;
        };
        Some(active.handle_submessages(replay::sort_by_id(submessages)))
    }

    /// Apply one live submessage.
    pub fn handle_event(
        &mut self,
        message_id: MessageId,
        submessage: Submessage,
    ) -> Option<ApplyReport> {
        self.handle_events(message_id, [submessage])
    }

    /// Run a local action on the widget of `message_id`.
    ///
    /// Returns `None` when the message has no active widget.
    pub fn perform(
        &mut self,
        message_id: MessageId,
        action: &WidgetAction,
    ) -> Option<Result<Option<OutboundSubmessage>, WidgetError>> {
        self.widgets
            .get_mut(&message_id)
            .map(|active| active.perform(action))
    }

    #[must_use]
    pub fn view(&self, message_id: MessageId) -> Option<WidgetView> {
        self.widgets.get(&message_id).map(ActiveWidget::view)
    }

    /// Drop the widget of a message that is no longer displayed.
    pub fn evict(&mut self, message_id: MessageId) -> bool {
        self.widgets.remove(&message_id).is_some()
    }
}
