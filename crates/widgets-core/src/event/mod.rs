//! Widget event model.
//!
//! - [`types`]: widget types and the event-kind catalog.
//! - [`data`]: typed payloads (poll, todo, setup).
//! - [`validate`]: the schema boundary for untrusted payloads.
//!
//! An [`InboundEvent`] is what the transport hands to a widget: the attributed
//! sender plus a raw JSON payload that has not been validated yet.

pub mod data;
pub mod types;
pub mod validate;

pub use data::{
    PollEvent, PollSetup, SeedTask, TodoEvent, TodoSetup, VoteDirection, WidgetEvent, WidgetSetup,
};
pub use types::{EventKind, UnknownEventKind, UnknownWidgetType, WidgetType};

use serde::{Deserialize, Serialize};

use crate::identity::SenderId;

/// One event delivered to a widget's inbound handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Who the transport attributes the event to.
    pub sender: SenderId,
    /// Untrusted payload; validated by the receiving widget.
    pub data: serde_json::Value,
}

impl InboundEvent {
    #[must_use]
    pub fn new(sender: impl Into<SenderId>, data: serde_json::Value) -> Self {
        Self {
            sender: sender.into(),
            data,
        }
    }

    /// Wrap a locally produced event as if it had looped back from the
    /// server, which is how a client sees its own actions.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized.
    pub fn echo(
        sender: impl Into<SenderId>,
        event: &WidgetEvent,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(sender, event.to_json_value()?))
    }
}
