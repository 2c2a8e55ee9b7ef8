//! Turning a message's buffered submessages into an activation plan.
//!
//! Submessage ids are decimal strings and must be ordered numerically. The
//! first submessage in that order carries the widget setup and must come from
//! the author of the hosting message; everything after it is event history.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, ReplayError};
use crate::event::WidgetSetup;
use crate::event::validate;
use crate::identity::{MessageId, UserId};

/// `msg_type` of every widget submessage.
pub const WIDGET_MSG_TYPE: &str = "widget";

/// The chat message a widget lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostingMessage {
    pub id: MessageId,
    /// Author of the message.
    pub sender_id: UserId,
}

/// One unit of widget traffic as the server stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submessage {
    /// Server-assigned id, a decimal integer string.
    pub id: String,
    pub sender_id: UserId,
    pub msg_type: String,
    /// JSON-encoded payload.
    pub content: String,
}

impl Submessage {
    #[must_use]
    pub fn widget(id: u64, sender_id: UserId, content: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            sender_id,
            msg_type: WIDGET_MSG_TYPE.to_string(),
            content: content.into(),
        }
    }

    /// The numeric id, if `id` is a plain decimal integer.
    #[must_use]
    pub fn numeric_id(&self) -> Option<u64> {
        parse_submessage_id(&self.id)
    }

    #[must_use]
    pub fn is_widget(&self) -> bool {
        self.msg_type == WIDGET_MSG_TYPE
    }
}

fn parse_submessage_id(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Sort submessages by numeric id, dropping those whose id does not parse.
///
/// The sort is stable, so submessages sharing an id keep their input order.
pub fn sort_by_id(submessages: impl IntoIterator<Item = Submessage>) -> Vec<(u64, Submessage)> {
    let mut sorted: Vec<(u64, Submessage)> = submessages
        .into_iter()
        .filter_map(|sub| {
            let Some(id) = sub.numeric_id() else {
                tracing::warn!(
                    id = %sub.id,
                    sender = %sub.sender_id,
                    code = %ErrorCode::UnparseableSubmessageId,
                    "dropping submessage with non-numeric id"
                );
                return None;
            };
            Some((id, sub))
        })
        .collect();
    sorted.sort_by_key(|(id, _)| *id);
    sorted
}

/// A validated history, ready to activate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay {
    /// Id of the setup submessage; never replayed as an event.
    pub setup_id: u64,
    pub setup: WidgetSetup,
    /// Remaining submessages in id order.
    pub history: Vec<(u64, Submessage)>,
}

/// Order the history, check authorship and parse the setup.
///
/// # Errors
///
/// - [`ReplayError::EmptyBatch`] when no submessage has a usable id.
/// - [`ReplayError::Hijack`] when the first submessage was not sent by the
///   message author.
/// - [`ReplayError::NotAWidget`] when the first submessage is not widget
///   traffic.
/// - [`ReplayError::Setup`] when the setup payload is malformed.
pub fn prepare(
    message: HostingMessage,
    submessages: impl IntoIterator<Item = Submessage>,
    max_payload_bytes: usize,
) -> Result<Replay, ReplayError> {
    let mut sorted = sort_by_id(submessages).into_iter();
    let (setup_id, first) = sorted
        .next()
        .ok_or(ReplayError::EmptyBatch(message.id))?;

    if first.sender_id != message.sender_id {
        return Err(ReplayError::Hijack {
            message_id: message.id,
            claimed: first.sender_id,
            author: message.sender_id,
        });
    }
    if !first.is_widget() {
        return Err(ReplayError::NotAWidget {
            message_id: message.id,
            msg_type: first.msg_type,
        });
    }

    let data = validate::parse_content(&first.content, max_payload_bytes)?;
    let setup = validate::widget_setup(&data)?;

    Ok(Replay {
        setup_id,
        setup,
        history: sorted.collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTHOR: UserId = UserId(5);

    fn message() -> HostingMessage {
        HostingMessage {
            id: MessageId(42),
            sender_id: AUTHOR,
        }
    }

    fn setup(id: u64, sender: UserId) -> Submessage {
        Submessage::widget(id, sender, r#"{"widget_type":"poll","extra_data":null}"#)
    }

    #[test]
    fn ids_sort_numerically() {
        let subs = ["10", "9", "100", "11"]
            .into_iter()
            .map(|id| Submessage {
                id: id.to_string(),
                sender_id: AUTHOR,
                msg_type: WIDGET_MSG_TYPE.into(),
                content: "{}".into(),
            });
        let ids: Vec<u64> = sort_by_id(subs).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![9, 10, 11, 100]);
    }

    #[test]
    fn non_numeric_ids_are_dropped() {
        for raw in ["", "abc", "-3", "+3", "1.5", " 7"] {
            assert_eq!(parse_submessage_id(raw), None, "{raw:?}");
        }
        assert_eq!(parse_submessage_id("007"), Some(7));
    }

    #[test]
    fn first_submessage_must_come_from_author() {
        let err = prepare(message(), [setup(1, UserId(7))], 1024).unwrap_err();
        assert_eq!(
            err,
            ReplayError::Hijack {
                message_id: MessageId(42),
                claimed: UserId(7),
                author: AUTHOR
            }
        );
    }

    #[test]
    fn hijack_is_judged_after_sorting() {
        // The author's setup has the lower id even though it arrives second.
        let plan = prepare(message(), [setup(20, UserId(7)), setup(3, AUTHOR)], 1024)
            .expect("author owns the first submessage");
        assert_eq!(plan.setup_id, 3);
        assert_eq!(plan.history.len(), 1);
    }

    #[test]
    fn empty_or_unusable_batches_fail() {
        assert_eq!(
            prepare(message(), [], 1024).unwrap_err(),
            ReplayError::EmptyBatch(MessageId(42))
        );
        let mut sub = setup(1, AUTHOR);
        sub.id = "x".into();
        assert_eq!(
            prepare(message(), [sub], 1024).unwrap_err().code(),
            ErrorCode::EmptyBatch
        );
    }

    #[test]
    fn setup_must_be_widget_traffic() {
        let mut sub = setup(1, AUTHOR);
        sub.msg_type = "zform".into();
        assert_eq!(
            prepare(message(), [sub], 1024).unwrap_err().code(),
            ErrorCode::NotAWidgetMessage
        );
    }

    #[test]
    fn malformed_setup_is_a_schema_error() {
        let sub = Submessage::widget(1, AUTHOR, r#"{"extra_data":{}}"#);
        let err = prepare(message(), [sub], 1024).unwrap_err();
        assert!(matches!(err, ReplayError::Setup(_)));

        let big = setup(1, AUTHOR);
        assert_eq!(
            prepare(message(), [big], 8).unwrap_err().code(),
            ErrorCode::OversizedPayload
        );
    }
}
