//! Poll widget: a question owned by the message author, options anyone can
//! add, and per-user votes.
//!
//! # Convergence
//!
//! A vote carries absolute intent (add me / remove me), not an increment, so
//! applying the same set of votes in any order, or applying one twice,
//! yields the same voter sets. The toggle decision happens when the vote is
//! produced, from local state that may already be stale; the receiver never
//! second-guesses it.
//!
//! # Authorization
//!
//! Only the poll owner's `question` events are applied. Options may be added
//! by anyone, but never with text that is already present.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::Serialize;

use super::{
    ApplyReport, LocalIndex, PollAction, Widget, WidgetAction, WidgetView, checked_idx,
};
use crate::config::MAX_IDX;
use crate::directory::UserDirectory;
use crate::error::{SchemaError, WidgetError};
use crate::event::validate;
use crate::event::{InboundEvent, PollEvent, VoteDirection, WidgetEvent, WidgetType};
use crate::identity::{SenderId, UserId};
use crate::key::PollKey;

const WIDGET: &str = "poll";

/// Construction parameters for [`PollState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollParams {
    /// Author of the hosting message; the only one who may set the question.
    pub owner: UserId,
    /// The user running this client.
    pub current_user: UserId,
    /// Seed question; empty leaves the poll waiting for the owner.
    pub question: String,
    /// Seed options, replayed as `canned` new-option events in order.
    pub options: Vec<String>,
    pub max_idx: u32,
}

impl PollParams {
    #[must_use]
    pub const fn new(owner: UserId, current_user: UserId) -> Self {
        Self {
            owner,
            current_user,
            question: String::new(),
            options: Vec::new(),
            max_idx: MAX_IDX,
        }
    }
}

/// One option and its voters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOption {
    pub option: String,
    /// Creator; only used to form the key.
    pub owner: SenderId,
    pub votes: BTreeSet<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollOptionView {
    pub option: String,
    /// Display names of the voters.
    pub names: String,
    pub count: usize,
    pub key: String,
    pub current_user_voted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollView {
    pub question: String,
    pub options: Vec<PollOptionView>,
}

#[derive(Debug, Clone)]
pub struct PollState {
    owner: UserId,
    me: UserId,
    is_my_poll: bool,
    question: String,
    input_mode: bool,
    options: IndexMap<PollKey, PollOption>,
    next_index: LocalIndex,
    max_idx: u32,
}

impl PollState {
    #[must_use]
    pub fn new(params: PollParams) -> Self {
        let is_my_poll = params.owner == params.current_user;
        let mut poll = Self {
            owner: params.owner,
            me: params.current_user,
            is_my_poll,
            question: String::new(),
            input_mode: is_my_poll,
            options: IndexMap::new(),
            next_index: LocalIndex::new(),
            max_idx: params.max_idx,
        };

        if !params.question.is_empty() {
            poll.set_question(params.question);
        }

        let seeds = params.options.into_iter().enumerate().map(|(idx, option)| {
            let idx = i64::try_from(idx).unwrap_or(i64::MAX);
            (SenderId::Canned, PollEvent::NewOption { idx, option })
        });
        let report = poll.apply_events(seeds);
        if !report.is_clean() {
            tracing::debug!(
                rejected = report.rejected.len(),
                "some seeded poll options were dropped"
            );
        }
        poll
    }

    // -- queries ----------------------------------------------------------

    #[must_use]
    pub fn question(&self) -> &str {
        &self.question
    }

    #[must_use]
    pub const fn owner(&self) -> UserId {
        self.owner
    }

    #[must_use]
    pub const fn is_my_poll(&self) -> bool {
        self.is_my_poll
    }

    #[must_use]
    pub const fn input_mode(&self) -> bool {
        self.input_mode
    }

    /// Index the next locally created option will carry.
    #[must_use]
    pub const fn next_index(&self) -> u32 {
        self.next_index.peek()
    }

    /// Exact, case-sensitive match against every known option.
    #[must_use]
    pub fn is_option_present(&self, text: &str) -> bool {
        self.options.values().any(|o| o.option == text)
    }

    #[must_use]
    pub fn option(&self, key: &PollKey) -> Option<&PollOption> {
        self.options.get(key)
    }

    /// Options in insertion order.
    pub fn options(&self) -> impl Iterator<Item = (&PollKey, &PollOption)> {
        self.options.iter()
    }

    /// Find an option's key by its text.
    #[must_use]
    pub fn key_for(&self, text: &str) -> Option<PollKey> {
        self.options
            .iter()
            .find(|(_, o)| o.option == text)
            .map(|(k, _)| *k)
    }

    // -- local presentation state -----------------------------------------

    /// Enter question editing. Only the owner can edit.
    pub const fn set_input_mode(&mut self) {
        if self.is_my_poll {
            self.input_mode = true;
        }
    }

    pub const fn clear_input_mode(&mut self) {
        self.input_mode = false;
    }

    // -- outbound ---------------------------------------------------------

    /// Build a new-option event and consume a local index.
    ///
    /// Always succeeds; callers check [`is_option_present`](Self::is_option_present)
    /// and emptiness first, or use [`compose_new_option`](Self::compose_new_option).
    pub fn new_option_event(&mut self, option: impl Into<String>) -> PollEvent {
        let idx = self.next_index.reserve();
        PollEvent::NewOption {
            idx: i64::from(idx),
            option: option.into(),
        }
    }

    /// Pre-submit checks, then [`new_option_event`](Self::new_option_event).
    ///
    /// # Errors
    ///
    /// Returns [`WidgetError::EmptyText`] or [`WidgetError::DuplicateText`];
    /// no index is consumed in that case.
    pub fn compose_new_option(&mut self, text: &str) -> Result<PollEvent, WidgetError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(WidgetError::EmptyText);
        }
        if self.is_option_present(text) {
            return Err(WidgetError::DuplicateText(text.to_string()));
        }
        Ok(self.new_option_event(text))
    }

    /// Build a question event; `None` unless this client owns the poll.
    #[must_use]
    pub fn question_event(&self, question: impl Into<String>) -> Option<PollEvent> {
        self.is_my_poll.then(|| PollEvent::Question {
            question: question.into(),
        })
    }

    /// Build a vote event that toggles the current user's vote.
    ///
    /// The key must name a known option; anything else is a bug in the
    /// caller and trips a debug assertion.
    #[must_use]
    pub fn vote_event(&self, key: &PollKey) -> Option<PollEvent> {
        let Some(option) = self.options.get(key) else {
            tracing::error!(%key, "vote requested for unknown poll option");
            debug_assert!(false, "vote requested for unknown poll option {key}");
            return None;
        };
        let vote = if option.votes.contains(&self.me) {
            VoteDirection::Retract
        } else {
            VoteDirection::Cast
        };
        Some(PollEvent::Vote {
            key: key.to_string(),
            vote,
        })
    }

    // -- inbound ----------------------------------------------------------

    /// Apply already-typed events, in order.
    pub fn apply_events(
        &mut self,
        events: impl IntoIterator<Item = (SenderId, PollEvent)>,
    ) -> ApplyReport {
        self.apply_batch(events.into_iter().map(|(sender, e)| (sender, Ok(e))))
    }

    fn apply_batch(
        &mut self,
        events: impl IntoIterator<Item = (SenderId, Result<PollEvent, SchemaError>)>,
    ) -> ApplyReport {
        let mut report = ApplyReport::default();
        let mut own_indices = Vec::new();

        for (index, (sender, parsed)) in events.into_iter().enumerate() {
            let outcome = parsed
                .map_err(WidgetError::from)
                .and_then(|event| self.apply(sender, &event).map(|()| event));
            match outcome {
                Ok(PollEvent::NewOption { idx, .. }) if sender == SenderId::User(self.me) => {
                    report.applied += 1;
                    own_indices.extend(u32::try_from(idx).ok());
                }
                Ok(_) => report.applied += 1,
                Err(error) => report.reject(WIDGET, index, sender, &error),
            }
        }

        self.next_index.reconcile(own_indices);
        report
    }

    fn apply(&mut self, sender: SenderId, event: &PollEvent) -> Result<(), WidgetError> {
        match event {
            PollEvent::NewOption { idx, option } => self.apply_new_option(sender, *idx, option),
            PollEvent::Question { question } => self.apply_question(sender, question),
            PollEvent::Vote { key, vote } => self.apply_vote(sender, key, *vote),
        }
    }

    fn apply_new_option(
        &mut self,
        sender: SenderId,
        idx: i64,
        option: &str,
    ) -> Result<(), WidgetError> {
        if self.is_option_present(option) {
            return Err(WidgetError::DuplicateText(option.to_string()));
        }
        let idx = checked_idx(idx, self.max_idx)?;

        let key = PollKey::new(sender, idx);
        if self.options.contains_key(&key) {
            return Err(WidgetError::KeyInUse(key.to_string()));
        }
        self.options.insert(
            key,
            PollOption {
                option: option.to_string(),
                owner: sender,
                votes: BTreeSet::new(),
            },
        );
        Ok(())
    }

    fn apply_question(&mut self, sender: SenderId, question: &str) -> Result<(), WidgetError> {
        if sender != SenderId::User(self.owner) {
            return Err(WidgetError::Unauthorized {
                sender,
                owner: SenderId::User(self.owner),
                field: "question",
            });
        }
        self.set_question(question.to_string());
        Ok(())
    }

    fn apply_vote(
        &mut self,
        sender: SenderId,
        key: &str,
        vote: VoteDirection,
    ) -> Result<(), WidgetError> {
        let option = key
            .parse::<PollKey>()
            .ok()
            .and_then(|k| self.options.get_mut(&k))
            .ok_or_else(|| WidgetError::UnknownKey(key.to_string()))?;

        let Some(voter) = sender.user_id() else {
            return Err(WidgetError::Unauthorized {
                sender,
                owner: SenderId::User(self.owner),
                field: "votes",
            });
        };

        match vote {
            VoteDirection::Cast => {
                option.votes.insert(voter);
            }
            VoteDirection::Retract => {
                option.votes.remove(&voter);
            }
        }
        Ok(())
    }

    fn set_question(&mut self, question: String) {
        self.question = question;
        self.input_mode = false;
    }

    // -- view -------------------------------------------------------------

    #[must_use]
    pub fn view(&self, users: &dyn UserDirectory) -> PollView {
        let options = self
            .options
            .iter()
            .map(|(key, o)| PollOptionView {
                option: o.option.clone(),
                names: users.display_names(&mut o.votes.iter().copied()),
                count: o.votes.len(),
                key: key.to_string(),
                current_user_voted: o.votes.contains(&self.me),
            })
            .collect();
        PollView {
            question: self.question.clone(),
            options,
        }
    }
}

impl Widget for PollState {
    fn widget_type(&self) -> &'static str {
        WidgetType::Poll.as_str()
    }

    fn handle_events(&mut self, events: &[InboundEvent]) -> ApplyReport {
        self.apply_batch(
            events
                .iter()
                .map(|e| (e.sender, validate::poll_event(&e.data))),
        )
    }

    fn perform(&mut self, action: &WidgetAction) -> Result<Option<WidgetEvent>, WidgetError> {
        let WidgetAction::Poll(action) = action else {
            return Err(WidgetError::ActionMismatch {
                action: action.name(),
                widget_type: WIDGET,
            });
        };
        let event = match action {
            PollAction::AddOption(text) => Some(self.compose_new_option(text)?),
            PollAction::SetQuestion(question) => {
                let question = question.trim();
                if question.is_empty() {
                    return Err(WidgetError::EmptyText);
                }
                self.question_event(question)
            }
            PollAction::ToggleVote(key) => self.vote_event(key),
        };
        Ok(event.map(WidgetEvent::Poll))
    }

    fn view(&self, users: &dyn UserDirectory) -> WidgetView {
        WidgetView::Poll(Self::view(self, users))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::NoDirectory;
    use crate::error::ErrorCode;
    use serde_json::json;
    use std::collections::BTreeMap;

    const OWNER: UserId = UserId(5);
    const ALICE: UserId = UserId(7);

    fn poll_for(me: UserId) -> PollState {
        PollState::new(PollParams::new(OWNER, me))
    }

    fn inbound(sender: UserId, data: serde_json::Value) -> InboundEvent {
        InboundEvent::new(sender, data)
    }

    fn new_option(sender: UserId, idx: i64, option: &str) -> InboundEvent {
        let data = json!({"type": "new_option", "idx": idx, "option": option});
        inbound(sender, data)
    }

    fn echo(poll: &mut PollState, sender: UserId, event: &PollEvent) -> ApplyReport {
        poll.apply_events([(SenderId::User(sender), event.clone())])
    }

    #[test]
    fn owner_starts_in_input_mode() {
        assert!(poll_for(OWNER).input_mode());
        assert!(!poll_for(ALICE).input_mode());
    }

    #[test]
    fn seeded_question_clears_input_mode() {
        let mut params = PollParams::new(OWNER, OWNER);
        params.question = "Lunch?".into();
        let poll = PollState::new(params);
        assert_eq!(poll.question(), "Lunch?");
        assert!(!poll.input_mode());
    }

    #[test]
    fn seeded_options_are_canned_in_order() {
        let mut params = PollParams::new(OWNER, ALICE);
        params.options = vec!["Pizza".into(), "Tacos".into(), "Pizza".into()];
        let poll = PollState::new(params);

        let keys: Vec<String> = poll.options().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["canned,0", "canned,1"]);
        assert_eq!(
            poll.next_index(),
            0,
            "canned seeds never move the local index"
        );
    }

    #[test]
    fn duplicate_option_text_is_rejected() {
        let mut poll = poll_for(ALICE);
        let report = poll.handle_events(&[
            new_option(OWNER, 0, "Pizza"),
            new_option(ALICE, 0, "Pizza"),
            new_option(UserId(9), 4, "pizza"),
        ]);
        assert_eq!(report.applied, 2, "matching is case-sensitive");
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].code, ErrorCode::DuplicateText);
        let pizzas = poll.options().filter(|(_, o)| o.option == "Pizza");
        assert_eq!(pizzas.count(), 1);
    }

    #[test]
    fn index_bounds_are_enforced() {
        let mut poll = poll_for(ALICE);
        let report = poll.handle_events(&[
            new_option(OWNER, 1001, "a"),
            new_option(OWNER, 1000, "b"),
            new_option(OWNER, -1, "c"),
        ]);
        assert_eq!(report.applied, 1);
        let codes: Vec<_> = report.rejected.iter().map(|r| (r.index, r.code)).collect();
        assert_eq!(
            codes,
            vec![(0, ErrorCode::IndexOutOfRange), (2, ErrorCode::IndexOutOfRange)]
        );
        let key = PollKey::new(SenderId::User(OWNER), 1000);
        assert!(poll.option(&key).is_some());
    }

    #[test]
    fn own_device_reconciliation() {
        let mut poll = poll_for(ALICE);
        poll.new_option_event("a");
        poll.new_option_event("b");
        assert_eq!(poll.next_index(), 2);

        let report = poll.handle_events(&[new_option(ALICE, 5, "from my phone")]);
        assert!(report.is_clean());
        assert_eq!(poll.next_index(), 6);

        let next = poll.new_option_event("c");
        assert_eq!(
            next,
            PollEvent::NewOption {
                idx: 6,
                option: "c".into()
            }
        );
    }

    #[test]
    fn other_senders_do_not_move_local_index() {
        let mut poll = poll_for(ALICE);
        poll.handle_events(&[new_option(OWNER, 40, "x")]);
        assert_eq!(poll.next_index(), 0);
    }

    #[test]
    fn produce_consumes_index_even_if_rejected_later() {
        let mut poll = poll_for(ALICE);
        poll.handle_events(&[new_option(OWNER, 0, "Pizza")]);
        let event = poll.new_option_event("Pizza");
        assert_eq!(poll.next_index(), 1);
        let report = echo(&mut poll, ALICE, &event);
        assert_eq!(report.rejected[0].code, ErrorCode::DuplicateText);
        assert_eq!(poll.next_index(), 1);
    }

    #[test]
    fn compose_checks_before_consuming_index() {
        let mut poll = poll_for(ALICE);
        assert_eq!(poll.compose_new_option("   "), Err(WidgetError::EmptyText));
        let event = poll.compose_new_option(" Tacos ").expect("valid");
        echo(&mut poll, ALICE, &event);
        assert_eq!(
            poll.compose_new_option("Tacos"),
            Err(WidgetError::DuplicateText("Tacos".into()))
        );
        assert_eq!(poll.next_index(), 1);
    }

    #[test]
    fn only_owner_produces_question() {
        assert!(poll_for(OWNER).question_event("Lunch?").is_some());
        assert!(poll_for(ALICE).question_event("Lunch?").is_none());
    }

    #[test]
    fn question_from_non_owner_is_ignored() {
        let mut poll = poll_for(ALICE);
        let report = poll.handle_events(&[
            inbound(OWNER, json!({"type": "question", "question": "Lunch?"})),
            inbound(ALICE, json!({"type": "question", "question": "Hijacked"})),
        ]);
        assert_eq!(poll.question(), "Lunch?");
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].code, ErrorCode::UnauthorizedSender);
        assert_eq!(report.rejected[0].sender, SenderId::User(ALICE));
    }

    #[test]
    fn owner_question_clears_input_mode() {
        let mut poll = poll_for(OWNER);
        let event = poll.question_event("Lunch?").expect("owner");
        echo(&mut poll, OWNER, &event);
        assert!(!poll.input_mode());
        poll.set_input_mode();
        assert!(poll.input_mode());
    }

    #[test]
    fn vote_toggle_round_trip() {
        let mut poll = poll_for(ALICE);
        poll.handle_events(&[new_option(OWNER, 0, "Tacos")]);
        let key = poll.key_for("Tacos").expect("present");

        let cast = poll.vote_event(&key).expect("known key");
        assert_eq!(
            cast,
            PollEvent::Vote {
                key: "5,0".into(),
                vote: VoteDirection::Cast
            }
        );
        echo(&mut poll, ALICE, &cast);
        assert_eq!(
            poll.option(&key).expect("present").votes,
            BTreeSet::from([ALICE])
        );

        let retract = poll.vote_event(&key).expect("known key");
        assert_eq!(
            retract,
            PollEvent::Vote {
                key: "5,0".into(),
                vote: VoteDirection::Retract
            }
        );
        echo(&mut poll, ALICE, &retract);
        assert!(poll.option(&key).expect("present").votes.is_empty());
    }

    #[test]
    fn vote_application_is_idempotent() {
        let mut poll = poll_for(ALICE);
        poll.handle_events(&[new_option(OWNER, 0, "Tacos")]);
        let vote = json!({"type": "vote", "key": "5,0", "vote": 1});
        poll.handle_events(&[inbound(UserId(9), vote.clone())]);
        let once = poll.view(&NoDirectory);
        poll.handle_events(&[inbound(UserId(9), vote)]);
        assert_eq!(poll.view(&NoDirectory), once);
        assert_eq!(once.options[0].count, 1);

        // Retracting a vote that is not there is also a no-op.
        let report = poll.handle_events(&[inbound(
            UserId(3),
            json!({"type": "vote", "key": "5,0", "vote": -1}),
        )]);
        assert!(report.is_clean());
        assert_eq!(poll.view(&NoDirectory), once);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "unknown poll option")]
    fn producing_vote_for_unknown_key_is_a_bug() {
        let poll = poll_for(ALICE);
        let _ = poll.vote_event(&PollKey::new(SenderId::User(OWNER), 0));
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn producing_vote_for_unknown_key_yields_nothing() {
        let poll = poll_for(ALICE);
        let key = PollKey::new(SenderId::User(OWNER), 0);
        assert!(poll.vote_event(&key).is_none());
    }

    #[test]
    fn vote_for_unknown_key_is_rejected() {
        let mut poll = poll_for(ALICE);
        let report = poll.handle_events(&[
            inbound(OWNER, json!({"type": "vote", "key": "5,0", "vote": 1})),
            inbound(OWNER, json!({"type": "vote", "key": "garbage", "vote": 1})),
            inbound(OWNER, json!({"type": "vote", "key": "5,0", "vote": 0})),
        ]);
        let codes: Vec<_> = report.rejected.iter().map(|r| r.code).collect();
        assert_eq!(
            codes,
            vec![
                ErrorCode::UnknownKey,
                ErrorCode::UnknownKey,
                ErrorCode::MalformedPayload
            ]
        );
    }

    #[test]
    fn bad_event_does_not_abort_batch() {
        let mut poll = poll_for(ALICE);
        let zero = json!({"type": "new_option", "idx": "zero", "option": "a"});
        let report = poll.handle_events(&[
            inbound(OWNER, zero),
            inbound(OWNER, json!({"type": "bogus"})),
            new_option(OWNER, 1, "b"),
        ]);
        assert_eq!(report.applied, 1);
        assert_eq!(report.rejected.len(), 2);
        assert!(poll.is_option_present("b"));
    }

    #[test]
    fn view_lists_voter_names_and_current_user() {
        let mut poll = poll_for(ALICE);
        poll.handle_events(&[
            new_option(OWNER, 0, "Tacos"),
            inbound(ALICE, json!({"type": "vote", "key": "5,0", "vote": 1})),
            inbound(OWNER, json!({"type": "vote", "key": "5,0", "vote": 1})),
        ]);
        let people = BTreeMap::from([(OWNER, "Olga".to_string()), (ALICE, "Alice".to_string())]);
        let view = poll.view(&people);
        assert_eq!(view.options.len(), 1);
        let tacos = &view.options[0];
        assert_eq!(tacos.names, "Olga, Alice");
        assert_eq!(tacos.count, 2);
        assert_eq!(tacos.key, "5,0");
        assert!(tacos.current_user_voted);
    }

    #[test]
    fn perform_rejects_todo_actions() {
        let mut poll = poll_for(OWNER);
        let action = crate::widget::TodoAction::SetTitle("x".into());
        let err = poll.perform(&WidgetAction::Todo(action)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ActionMismatch);
    }

    #[test]
    fn perform_set_question_for_non_owner_produces_nothing() {
        let mut poll = poll_for(ALICE);
        let out = poll
            .perform(&PollAction::SetQuestion("Dinner?".into()).into())
            .expect("no error");
        assert!(out.is_none());
    }
}
