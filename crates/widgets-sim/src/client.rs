//! Simulated chat clients.
//!
//! A client is a [`WidgetHost`] plus an outbox. It decides what to do from
//! its own, possibly stale, rendered view, the way a user clicking in a UI
//! would, so concurrent clients race on the same options and tasks.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use widgets_core::{
    ApplyReport, HostingMessage, NullSink, OutboundSubmessage, PollAction, PollKey, ReplayError,
    Submessage, TaskKey, TodoAction, UserDirectory, UserId, WidgetAction, WidgetConfig,
    WidgetError, WidgetHost, WidgetView,
};

use crate::network::ClientId;
use crate::rng::DeterministicRng;

const OPTION_POOL: [&str; 8] = [
    "Pizza", "Tacos", "Sushi", "Soup", "Salad", "Curry", "Ramen", "Falafel",
];
const TASK_POOL: [&str; 8] = [
    "Buy milk",
    "Walk dog",
    "Fix sink",
    "Call mom",
    "Pay rent",
    "Water plants",
    "Book flights",
    "Take out trash",
];

/// What a client did in one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientAction {
    /// A UI action that produced an outbound event.
    Performed { action: String },
    /// A UI action stopped by a local pre-submit check.
    Refused { action: String, code: String },
    /// A UI action that produced nothing (e.g. retitle by a non-owner).
    NoOp { action: String },
    /// A hand-crafted payload bypassing the UI.
    Forged { content: String },
    /// Nothing to act on yet.
    Idle,
}

/// One simulated client (a user on one device).
pub struct SimClient {
    id: ClientId,
    user: UserId,
    message: HostingMessage,
    host: WidgetHost,
    outbox: Rc<RefCell<Vec<OutboundSubmessage>>>,
    forged: Vec<String>,
    rejected: usize,
}

impl SimClient {
    #[must_use]
    pub fn new(
        id: ClientId,
        user: UserId,
        message: HostingMessage,
        config: WidgetConfig,
        users: Rc<dyn UserDirectory>,
    ) -> Self {
        Self {
            id,
            user,
            message,
            host: WidgetHost::new(user, config, users),
            outbox: Rc::new(RefCell::new(Vec::new())),
            forged: Vec::new(),
            rejected: 0,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ClientId {
        self.id
    }

    #[must_use]
    pub const fn user(&self) -> UserId {
        self.user
    }

    #[must_use]
    pub fn is_owner(&self) -> bool {
        self.user == self.message.sender_id
    }

    /// Events rejected by this client's widget so far.
    #[must_use]
    pub const fn rejected(&self) -> usize {
        self.rejected
    }

    /// Activate from the server history.
    ///
    /// # Errors
    ///
    /// Returns the replay error if the history cannot be activated.
    pub fn join(&mut self, history: &[Submessage]) -> Result<ApplyReport, ReplayError> {
        let outbox = Rc::clone(&self.outbox);
        let report = self.host.process_submessages(
            self.message,
            history.iter().cloned(),
            Box::new(NullSink),
            Box::new(move |sub| outbox.borrow_mut().push(sub)),
        )?;
        self.rejected += report.rejected.len();
        Ok(report)
    }

    /// Apply a delivered batch.
    pub fn receive(&mut self, batch: Vec<Submessage>) -> Option<ApplyReport> {
        if batch.is_empty() {
            return None;
        }
        let report = self.host.handle_events(self.message.id, batch)?;
        self.rejected += report.rejected.len();
        Some(report)
    }

    #[must_use]
    pub fn view(&self) -> Option<WidgetView> {
        self.host.view(self.message.id)
    }

    /// Take a turn: pick an action from the current view and perform it.
    pub fn act(&mut self, rng: &mut DeterministicRng, forge_percent: u8) -> ClientAction {
        let Some(view) = self.view() else {
            return ClientAction::Idle;
        };
        if !self.is_owner() && rng.hit_rate_percent(forge_percent) {
            return self.forge(&view, rng);
        }
        let Some(action) = self.choose(&view, rng) else {
            return ClientAction::Idle;
        };
        let name = action.name().to_string();
        match self.host.perform(self.message.id, &action) {
            Some(Ok(Some(_))) => ClientAction::Performed { action: name },
            Some(Ok(None)) => ClientAction::NoOp { action: name },
            Some(Err(err)) => refused(name, &err),
            None => ClientAction::Idle,
        }
    }

    fn choose(&self, view: &WidgetView, rng: &mut DeterministicRng) -> Option<WidgetAction> {
        let roll = rng.next_bounded(10);
        match view {
            WidgetView::Poll(poll) => {
                let keys: Vec<PollKey> = poll
                    .options
                    .iter()
                    .filter_map(|o| o.key.parse().ok())
                    .collect();
                let action = match roll {
                    0..=3 if !keys.is_empty() => PollAction::ToggleVote(*rng.pick(&keys)?),
                    0..=5 => PollAction::AddOption((*rng.pick(&OPTION_POOL)?).to_string()),
                    6 if self.is_owner() => {
                        PollAction::SetQuestion(format!("Question {}", rng.next_bounded(100)))
                    }
                    6 => PollAction::SetQuestion("Can I change this?".to_string()),
                    _ if !keys.is_empty() => PollAction::ToggleVote(*rng.pick(&keys)?),
                    _ => PollAction::AddOption((*rng.pick(&OPTION_POOL)?).to_string()),
                };
                Some(action.into())
            }
            WidgetView::Todo(todo) => {
                let keys: Vec<TaskKey> = todo
                    .tasks
                    .iter()
                    .filter_map(|t| t.key.parse().ok())
                    .collect();
                let action = match roll {
                    0..=3 if !keys.is_empty() => TodoAction::Strike(*rng.pick(&keys)?),
                    0..=5 => TodoAction::AddTask {
                        task: (*rng.pick(&TASK_POOL)?).to_string(),
                        desc: format!("from client {}", self.id),
                    },
                    6 if self.is_owner() => {
                        TodoAction::SetTitle(format!("List {}", rng.next_bounded(100)))
                    }
                    6 => TodoAction::SetTitle("Can I change this?".to_string()),
                    _ if !keys.is_empty() => TodoAction::Strike(*rng.pick(&keys)?),
                    _ => TodoAction::AddTask {
                        task: (*rng.pick(&TASK_POOL)?).to_string(),
                        desc: String::new(),
                    },
                };
                Some(action.into())
            }
        }
    }

    /// Post a payload a correct UI would never produce.
    fn forge(&mut self, view: &WidgetView, rng: &mut DeterministicRng) -> ClientAction {
        let content = match (view, rng.next_bounded(4)) {
            (WidgetView::Poll(_), 0 | 1) => {
                format!(r#"{{"type":"question","question":"forged by {}"}}"#, self.user)
            }
            (WidgetView::Todo(_), 0 | 1) => {
                format!(r#"{{"type":"new_task_list_title","title":"forged by {}"}}"#, self.user)
            }
            (WidgetView::Poll(_), 2) => r#"{"type":"vote","key":"1,1","vote":3}"#.to_string(),
            (WidgetView::Todo(_), 2) => {
                r#"{"type":"new_task","key":-1,"task":"x","desc":"","completed":false}"#
                    .to_string()
            }
            _ => r#"{"type":"launch_missiles"}"#.to_string(),
        };
        self.forged.push(content.clone());
        ClientAction::Forged { content }
    }

    /// Everything this client wants to post, in order.
    pub fn take_outbox(&mut self) -> Vec<String> {
        let mut out: Vec<String> = self
            .outbox
            .borrow_mut()
            .drain(..)
            .map(|sub| sub.content)
            .collect();
        out.append(&mut self.forged);
        out
    }
}

fn refused(action: String, err: &WidgetError) -> ClientAction {
    ClientAction::Refused {
        action,
        code: err.code().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use widgets_core::{MessageId, NoDirectory};

    const OWNER: UserId = UserId(100);

    fn message() -> HostingMessage {
        HostingMessage {
            id: MessageId(1),
            sender_id: OWNER,
        }
    }

    fn client(user: UserId) -> SimClient {
        let config = WidgetConfig::default();
        SimClient::new(0, user, message(), config, Rc::new(NoDirectory))
    }

    fn poll_setup() -> Submessage {
        Submessage::widget(
            1,
            OWNER,
            r#"{"widget_type":"poll","extra_data":{"question":"Lunch?","options":["Pizza"]}}"#,
        )
    }

    #[test]
    fn idle_before_joining() {
        let mut c = client(UserId(101));
        let mut rng = DeterministicRng::new(1);
        assert_eq!(c.act(&mut rng, 0), ClientAction::Idle);
        assert!(c.take_outbox().is_empty());
    }

    #[test]
    fn performed_actions_land_in_the_outbox() {
        let mut c = client(UserId(101));
        c.join(&[poll_setup()]).expect("joins");
        let mut rng = DeterministicRng::new(5);
        let mut performed = 0;
        for _ in 0..50 {
            if matches!(c.act(&mut rng, 0), ClientAction::Performed { .. }) {
                performed += 1;
            }
        }
        assert!(performed > 0);
        assert_eq!(c.take_outbox().len(), performed);
        assert!(c.take_outbox().is_empty());
    }

    #[test]
    fn only_the_message_sender_owns_the_widget() {
        assert!(client(OWNER).is_owner());
        assert!(!client(UserId(101)).is_owner());
    }

    #[test]
    fn owners_never_forge() {
        let mut c = client(OWNER);
        c.join(&[poll_setup()]).expect("joins");
        let mut rng = DeterministicRng::new(2);
        for _ in 0..50 {
            assert!(!matches!(c.act(&mut rng, 100), ClientAction::Forged { .. }));
        }
    }

    #[test]
    fn forged_payloads_are_rejected_on_receipt() {
        let mut c = client(UserId(101));
        c.join(&[poll_setup()]).expect("joins");
        let mut rng = DeterministicRng::new(4);
        let ClientAction::Forged { content } = c.act(&mut rng, 100) else {
            panic!("expected a forged payload");
        };
        let report = c
            .receive(vec![Submessage::widget(2, UserId(101), content)])
            .expect("active");
        assert_eq!(report.applied, 0);
        assert_eq!(c.rejected(), 1);
        let Some(WidgetView::Poll(view)) = c.view() else {
            panic!("expected a poll view");
        };
        assert_eq!(view.question, "Lunch?");
    }
}
