//! widgets-core library.
//!
//! Collaborative chat widgets (polls and todo lists) built as event-sourced
//! state machines. Every client applies the same id-ordered submessage stream
//! and converges on the same state without coordination.
//!
//! - [`event`]: wire payloads and the validation boundary.
//! - [`widget`]: the poll and todo state machines.
//! - [`replay`]: ordering and authorship checks for buffered history.
//! - [`host`]: registry, active widgets and the per-client host.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums with stable [`ErrorCode`]s; `anyhow::Result`
//!   only where files are read.
//! - **Logging**: `tracing` macros. Rejected peer events log at `warn` and never
//!   fail the batch.

pub mod config;
pub mod directory;
pub mod error;
pub mod event;
pub mod host;
pub mod identity;
pub mod key;
pub mod replay;
pub mod widget;

pub use config::{WidgetConfig, load_config};
pub use directory::{NoDirectory, UNKNOWN_USER, UserDirectory};
pub use error::{ErrorCode, ReplayError, SchemaError, WidgetError};
pub use event::{EventKind, InboundEvent, PollEvent, TodoEvent, WidgetEvent, WidgetType};
pub use host::{
    ActivationContext, ActiveWidget, Activator, NullSink, Outbound, OutboundSubmessage,
    RenderSink, WidgetHost, WidgetRegistry,
};
pub use identity::{MessageId, SenderId, UserId};
pub use key::{PollKey, TaskKey};
pub use replay::{HostingMessage, Submessage};
pub use widget::{
    ApplyReport, PollAction, PollState, Rejection, TodoAction, TodoState, Widget, WidgetAction,
    WidgetView,
};
