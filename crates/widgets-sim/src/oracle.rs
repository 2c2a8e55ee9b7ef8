use std::rc::Rc;

use serde::Serialize;
use widgets_core::event::validate;
use widgets_core::{
    HostingMessage, NoDirectory, NullSink, PollEvent, Submessage, TodoEvent, UserDirectory, UserId,
    WidgetConfig, WidgetHost, WidgetView,
};

use crate::rng::DeterministicRng;

/// Observer identity for oracle replicas; never a simulated user.
const OBSERVER: UserId = UserId(u64::MAX);

// ── Shared state ─────────────────────────────────────────────────────────────

/// The part of a rendered view every client must agree on.
///
/// Views carry one per-viewer field (`current_user_voted`); it is cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedState(pub WidgetView);

impl SharedState {
    #[must_use]
    pub fn from_view(view: &WidgetView) -> Self {
        let mut view = view.clone();
        if let WidgetView::Poll(poll) = &mut view {
            for option in &mut poll.options {
                option.current_user_voted = false;
            }
        }
        Self(view)
    }

    /// Poll question or todo title.
    #[must_use]
    pub fn headline(&self) -> &str {
        match &self.0 {
            WidgetView::Poll(poll) => &poll.question,
            WidgetView::Todo(todo) => &todo.title,
        }
    }

    /// Number of options or tasks.
    #[must_use]
    pub const fn entries(&self) -> usize {
        match &self.0 {
            WidgetView::Poll(poll) => poll.options.len(),
            WidgetView::Todo(todo) => todo.tasks.len(),
        }
    }
}

/// Final state of one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientState {
    pub client: usize,
    pub user: UserId,
    pub late_joiner: bool,
    /// `None` if the client never activated the widget.
    pub shared: Option<SharedState>,
}

// ── Results ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResult {
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    const fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    #[must_use]
    fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

/// Diagnostic information for a single failed invariant check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A client never activated the widget.
    NotActivated { client: usize },

    /// Two caught-up clients render different shared state.
    Convergence {
        client_a: usize,
        client_b: usize,
        state_a: String,
        state_b: String,
    },

    /// Replaying the full log (in any delivery order) produced a different
    /// state than live delivery.
    ReplayEquivalence {
        /// `None` for the in-order replay, otherwise the shuffle index.
        permutation: Option<usize>,
        expected: String,
        actual: String,
    },

    /// Re-delivering history changed the state.
    Idempotence {
        what: &'static str,
        before: String,
        after: String,
    },

    /// The question or title differs from the owner's last change.
    OwnerOnly { expected: String, actual: String },
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotActivated { client } => write!(f, "NotActivated: client {client}"),
            Self::Convergence {
                client_a,
                client_b,
                state_a,
                state_b,
            } => write!(
                f,
                "Convergence: clients {client_a} and {client_b} diverge ({state_a} vs {state_b})"
            ),
            Self::ReplayEquivalence {
                permutation,
                expected,
                actual,
            } => write!(
                f,
                "ReplayEquivalence: replay {permutation:?} gave {actual}, live clients have {expected}"
            ),
            Self::Idempotence {
                what,
                before,
                after,
            } => write!(f, "Idempotence: {what} changed state ({before} -> {after})"),
            Self::OwnerOnly { expected, actual } => {
                write!(f, "OwnerOnly: expected '{expected}', found '{actual}'")
            }
        }
    }
}

fn render(state: &SharedState) -> String {
    serde_json::to_string(state).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}

// ── Oracle ───────────────────────────────────────────────────────────────────

/// Checks the widget invariants on the outcome of a simulation.
///
/// 1. **Convergence**: all caught-up clients agree on shared state.
/// 2. **Replay equivalence**: a fresh replica built from the server log, in
///    order or shuffled, matches the live clients.
/// 3. **Idempotence**: re-delivering the log, or re-posting every vote
///    under a new id, changes nothing.
/// 4. **Owner-only mutation**: the headline is the owner's last change, no
///    matter what others posted.
pub struct WidgetOracle<'a> {
    message: HostingMessage,
    log: &'a [Submessage],
    config: &'a WidgetConfig,
    users: Rc<dyn UserDirectory>,
}

impl<'a> WidgetOracle<'a> {
    #[must_use]
    pub const fn new(
        message: HostingMessage,
        log: &'a [Submessage],
        config: &'a WidgetConfig,
        users: Rc<dyn UserDirectory>,
    ) -> Self {
        Self {
            message,
            log,
            config,
            users,
        }
    }

    /// An oracle whose replicas know no display names.
    #[must_use]
    pub fn anonymous(
        message: HostingMessage,
        log: &'a [Submessage],
        config: &'a WidgetConfig,
    ) -> Self {
        Self::new(message, log, config, Rc::new(NoDirectory))
    }

    /// Run every check.
    #[must_use]
    pub fn check_all(
        &self,
        states: &[ClientState],
        rng: &mut DeterministicRng,
        permutations: usize,
    ) -> OracleResult {
        let convergence = Self::check_convergence(states);
        let Some(reference) = states.iter().find_map(|s| s.shared.as_ref()) else {
            return convergence;
        };
        convergence
            .merge(self.check_replay_equivalence(reference, rng, permutations))
            .merge(self.check_idempotence())
            .merge(self.check_owner_only(reference))
    }

    #[must_use]
    pub fn check_convergence(states: &[ClientState]) -> OracleResult {
        let mut violations: Vec<InvariantViolation> = states
            .iter()
            .filter(|s| s.shared.is_none())
            .map(|s| InvariantViolation::NotActivated { client: s.client })
            .collect();

        let active: Vec<(usize, &SharedState)> = states
            .iter()
            .filter_map(|s| s.shared.as_ref().map(|shared| (s.client, shared)))
            .collect();
        if let Some((first, reference)) = active.first() {
            for (client, shared) in &active[1..] {
                if shared != reference {
                    violations.push(InvariantViolation::Convergence {
                        client_a: *first,
                        client_b: *client,
                        state_a: render(reference),
                        state_b: render(shared),
                    });
                }
            }
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_replay_equivalence(
        &self,
        expected: &SharedState,
        rng: &mut DeterministicRng,
        permutations: usize,
    ) -> OracleResult {
        let mut violations = Vec::new();
        let mut check = |permutation: Option<usize>, history: Vec<Submessage>| {
            let actual = self.replica(history);
            if actual.as_ref() != Some(expected) {
                violations.push(InvariantViolation::ReplayEquivalence {
                    permutation,
                    expected: render(expected),
                    actual: actual.as_ref().map_or_else(|| "nothing".into(), render),
                });
            }
        };

        check(None, self.log.to_vec());
        for i in 0..permutations {
            let mut shuffled = self.log.to_vec();
            rng.shuffle(&mut shuffled);
            check(Some(i), shuffled);
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_idempotence(&self) -> OracleResult {
        let Some((mut host, before)) = self.replica_host(self.log.to_vec()) else {
            return OracleResult::pass();
        };
        let mut violations = Vec::new();

        host.handle_events(self.message.id, self.log.to_vec());
        let after = self.shared_of(&host);
        if after.as_ref() != Some(&before) {
            violations.push(InvariantViolation::Idempotence {
                what: "re-delivering the log",
                before: render(&before),
                after: after.as_ref().map_or_else(String::new, render),
            });
        }

        let next_id = self
            .log
            .iter()
            .filter_map(Submessage::numeric_id)
            .max()
            .map_or(1, |id| id.saturating_add(1));
        let votes: Vec<Submessage> = self
            .log
            .iter()
            .filter(|sub| is_vote(sub))
            .zip(next_id..)
            .map(|(sub, id)| Submessage::widget(id, sub.sender_id, sub.content.clone()))
            .collect();
        if !votes.is_empty() {
            host.handle_events(self.message.id, votes);
            let after = self.shared_of(&host);
            if after.as_ref() != Some(&before) {
                violations.push(InvariantViolation::Idempotence {
                    what: "re-posting every vote",
                    before: render(&before),
                    after: after.as_ref().map_or_else(String::new, render),
                });
            }
        }
        OracleResult::from_violations(violations)
    }

    /// Compare the headline against the owner's last accepted change.
    #[must_use]
    pub fn check_owner_only(&self, actual: &SharedState) -> OracleResult {
        let Some(seeded) = self.replica(self.log.iter().take(1).cloned().collect()) else {
            return OracleResult::pass();
        };
        let expected = self
            .log
            .iter()
            .skip(1)
            .filter(|sub| sub.sender_id == self.message.sender_id)
            .filter_map(headline_change)
            .last()
            .unwrap_or_else(|| seeded.headline().to_string());

        if actual.headline() == expected {
            OracleResult::pass()
        } else {
            OracleResult::from_violations(vec![InvariantViolation::OwnerOnly {
                expected,
                actual: actual.headline().to_string(),
            }])
        }
    }

    fn replica_host(&self, history: Vec<Submessage>) -> Option<(WidgetHost, SharedState)> {
        let mut host = WidgetHost::new(OBSERVER, self.config.clone(), Rc::clone(&self.users));
        host.process_submessages(self.message, history, Box::new(NullSink), Box::new(|_| {}))
            .ok()?;
        let shared = self.shared_of(&host)?;
        Some((host, shared))
    }

    fn replica(&self, history: Vec<Submessage>) -> Option<SharedState> {
        self.replica_host(history).map(|(_, shared)| shared)
    }

    fn shared_of(&self, host: &WidgetHost) -> Option<SharedState> {
        let view = host.view(self.message.id)?;
        Some(SharedState::from_view(&view))
    }
}

fn parse(sub: &Submessage) -> Option<serde_json::Value> {
    validate::parse_content(&sub.content, usize::MAX).ok()
}

fn is_vote(sub: &Submessage) -> bool {
    parse(sub)
        .and_then(|data| validate::poll_event(&data).ok())
        .is_some_and(|event| matches!(event, PollEvent::Vote { .. }))
}

fn headline_change(sub: &Submessage) -> Option<String> {
    let data = parse(sub)?;
    if let Ok(PollEvent::Question { question }) = validate::poll_event(&data) {
        return Some(question);
    }
    if let Ok(TodoEvent::NewTaskListTitle { title }) = validate::todo_event(&data) {
        return Some(title);
    }
    None
}
