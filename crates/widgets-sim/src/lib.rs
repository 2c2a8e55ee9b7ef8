//! widgets-sim library.
//!
//! Deterministic multi-client simulation of one widget message. A relay
//! server assigns submessage ids; simulated clients act on their own stale
//! views and receive traffic through faulty delivery queues; late joiners
//! replay the server log. After a final drain the oracle checks that everyone
//! agrees.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod campaign;
pub mod client;
pub mod network;
pub mod oracle;
pub mod rng;

use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use widgets_core::{
    HostingMessage, MessageId, Submessage, UserDirectory, UserId, WidgetConfig, WidgetType,
};

use crate::client::{ClientAction, SimClient};
use crate::network::{ClientId, FaultConfig, RelayServer, SimulatedNetwork};
use crate::oracle::{ClientState, SharedState};
use crate::rng::DeterministicRng;

/// First user id handed out; the owner.
const FIRST_USER: u64 = 100;
/// First submessage id; low enough that ids cross a decimal digit boundary.
const FIRST_SUBMESSAGE_ID: u64 = 7;

/// Parameters of one simulated message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub widget: WidgetType,
    /// Distinct users; user 0 authored the message.
    pub user_count: usize,
    /// Clients present from the start. Client `i` belongs to user
    /// `i % user_count`, so extra clients are additional devices.
    pub client_count: usize,
    /// Clients that join mid-simulation by replaying the log.
    pub late_joiners: usize,
    pub rounds: u64,
    /// Chance per round that a client acts.
    pub action_percent: u8,
    /// Chance that a non-owner's action is a forged payload.
    pub forge_percent: u8,
    pub fault: FaultConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            widget: WidgetType::Poll,
            user_count: 3,
            client_count: 4,
            late_joiners: 1,
            rounds: 24,
            action_percent: 40,
            forge_percent: 10,
            fault: FaultConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// # Errors
    ///
    /// Returns an error if a parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.user_count == 0 {
            bail!("user_count must be > 0");
        }
        if self.client_count == 0 {
            bail!("client_count must be > 0");
        }
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        Ok(())
    }

    fn user_of(&self, client: ClientId) -> UserId {
        let index = u64::try_from(client % self.user_count).unwrap_or(0);
        UserId(FIRST_USER + index)
    }
}

/// One step of the simulation trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub round: u64,
    pub kind: TraceEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEventKind {
    /// A client joined and replayed `replayed` submessages.
    Join { client: ClientId, replayed: usize },
    /// A client took a turn.
    Act {
        client: ClientId,
        action: ClientAction,
    },
    /// The server stored a submessage.
    Post {
        client: ClientId,
        submessage_id: u64,
    },
    /// A client applied a delivered batch.
    Deliver {
        client: ClientId,
        count: usize,
        rejected: usize,
    },
    /// A delivery was queued twice.
    Duplicate {
        client: ClientId,
        submessage_id: u64,
    },
    /// A client stopped receiving for a while.
    Stall { client: ClientId, until_round: u64 },
    /// A late joiner's live feed overlaps its snapshot.
    Overlap {
        client: ClientId,
        overlapping: usize,
    },
}

/// Outcome of one simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationResult {
    pub config: SimulationConfig,
    pub message: HostingMessage,
    /// The server log, in id order.
    pub log: Vec<Submessage>,
    pub states: Vec<ClientState>,
    pub trace: Vec<TraceEvent>,
    /// Events rejected across all clients.
    pub rejected: usize,
    /// Whether a duplicate, stall or overlap actually happened.
    pub interesting_state_reached: bool,
}

impl SimulationResult {
    /// Shared state of the first active client.
    #[must_use]
    pub fn reference_state(&self) -> Option<&SharedState> {
        self.states.iter().find_map(|s| s.shared.as_ref())
    }
}

/// Deterministic simulator for one widget message.
pub struct Simulator {
    config: SimulationConfig,
    widget_config: WidgetConfig,
    users: Rc<dyn UserDirectory>,
    rng: DeterministicRng,
    server: RelayServer,
    network: SimulatedNetwork,
    clients: Vec<SimClient>,
    late: Vec<bool>,
    join_rounds: Vec<u64>,
    trace: Vec<TraceEvent>,
    interesting: bool,
}

impl Simulator {
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        Self::with_widget_config(config, WidgetConfig::default())
    }

    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_widget_config(
        config: SimulationConfig,
        widget_config: WidgetConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut rng = DeterministicRng::new(config.seed);
        let message = HostingMessage {
            id: MessageId(1),
            sender_id: UserId(FIRST_USER),
        };

        let directory: BTreeMap<UserId, String> = (0..config.user_count)
            .map(|i| {
                let user = config.user_of(i);
                (user, format!("user-{}", user.0))
            })
            .collect();
        let users: Rc<dyn UserDirectory> = Rc::new(directory);

        let join_rounds = (0..config.late_joiners)
            .map(|_| rng.next_bounded(config.rounds).max(1))
            .collect();

        Ok(Self {
            network: SimulatedNetwork::new(config.fault),
            server: RelayServer::new(message, FIRST_SUBMESSAGE_ID),
            config,
            widget_config,
            users,
            rng,
            clients: Vec::new(),
            late: Vec::new(),
            join_rounds,
            trace: Vec::new(),
            interesting: false,
        })
    }

    /// Run to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the widget cannot be set up or a client fails to
    /// activate from the server log.
    pub fn run(&mut self) -> Result<SimulationResult> {
        let setup = self.setup_content()?;
        let owner = self.server.message().sender_id;
        self.server.post(owner, setup);

        for _ in 0..self.config.client_count {
            self.add_client(0, false)?;
        }

        for round in 0..self.config.rounds {
            self.join_due(round)?;
            self.maybe_stall(round);
            self.deliver(round);
            self.take_turns(round);
        }

        self.drain(self.config.rounds);

        Ok(self.finish())
    }

    fn setup_content(&self) -> Result<String> {
        let setup = match self.config.widget {
            WidgetType::Poll => serde_json::json!({
                "widget_type": "poll",
                "extra_data": {"question": "Where to eat?", "options": ["Pizza", "Tacos"]},
            }),
            WidgetType::Todo => serde_json::json!({
                "widget_type": "todo",
                "extra_data": {"tasks": [{"task": "Buy milk", "desc": "2 litres"}]},
            }),
        };
        serde_json::to_string(&setup).context("encoding widget setup")
    }

    fn add_client(&mut self, round: u64, late: bool) -> Result<()> {
        let id = self.clients.len();
        let user = self.config.user_of(id);
        let mut client = SimClient::new(
            id,
            user,
            self.server.message(),
            self.widget_config.clone(),
            Rc::clone(&self.users),
        );
        let history = self.server.log().to_vec();
        client
            .join(&history)
            .with_context(|| format!("client {id} failed to activate"))?;
        self.network.subscribe(id);

        let rate = self.config.fault.overlap_rate_percent;
        if late && self.rng.hit_rate_percent(rate) {
            let overlap = 1 + self.rng.next_index(history.len().min(3));
            for sub in &history[history.len() - overlap..] {
                self.network.enqueue(id, sub, round, &mut self.rng);
            }
            self.interesting = true;
            let kind = TraceEventKind::Overlap {
                client: id,
                overlapping: overlap,
            };
            self.record(round, kind);
        }

        tracing::debug!(client = id, %user, late, replayed = history.len(), "client joined");
        let kind = TraceEventKind::Join {
            client: id,
            replayed: history.len(),
        };
        self.record(round, kind);
        self.clients.push(client);
        self.late.push(late);
        Ok(())
    }

    fn join_due(&mut self, round: u64) -> Result<()> {
        let due = self.join_rounds.iter().filter(|&&r| r <= round).count();
        self.join_rounds.retain(|&r| r > round);
        for _ in 0..due {
            self.add_client(round, true)?;
        }
        Ok(())
    }

    fn maybe_stall(&mut self, round: u64) {
        let rate = self.config.fault.stall_rate_percent;
        if self.clients.is_empty() || !self.rng.hit_rate_percent(rate) {
            return;
        }
        let client = self.rng.next_index(self.clients.len());
        let until_round = round + u64::from(self.config.fault.stall_duration_rounds);
        self.network.stall(client, until_round);
        self.interesting = true;
        let kind = TraceEventKind::Stall {
            client,
            until_round,
        };
        self.record(round, kind);
    }

    fn deliver(&mut self, round: u64) {
        for id in 0..self.clients.len() {
            let batch = self.network.deliver_ready(id, round);
            self.apply(round, id, batch);
        }
    }

    fn drain(&mut self, round: u64) {
        for id in 0..self.clients.len() {
            let batch = self.network.drain(id);
            self.apply(round, id, batch);
        }
    }

    fn apply(&mut self, round: u64, id: ClientId, batch: Vec<Submessage>) {
        let count = batch.len();
        let Some(client) = self.clients.get_mut(id) else {
            return;
        };
        if let Some(report) = client.receive(batch) {
            let kind = TraceEventKind::Deliver {
                client: id,
                count,
                rejected: report.rejected.len(),
            };
            self.record(round, kind);
        }
    }

    fn take_turns(&mut self, round: u64) {
        for id in 0..self.clients.len() {
            if !self.rng.hit_rate_percent(self.config.action_percent) {
                continue;
            }
            let Some(client) = self.clients.get_mut(id) else {
                continue;
            };
            let action = client.act(&mut self.rng, self.config.forge_percent);
            let user = client.user();
            let outbox = client.take_outbox();
            if action != ClientAction::Idle {
                self.record(round, TraceEventKind::Act { client: id, action });
            }
            for content in outbox {
                self.post(round, id, user, content);
            }
        }
    }

    fn post(&mut self, round: u64, client: ClientId, user: UserId, content: String) {
        let submessage = self.server.post(user, content);
        let submessage_id = submessage.numeric_id().unwrap_or_default();
        let kind = TraceEventKind::Post {
            client,
            submessage_id,
        };
        self.record(round, kind);
        for (to, outcome) in self.network.broadcast(&submessage, round, &mut self.rng) {
            if outcome.duplicated {
                self.interesting = true;
                let kind = TraceEventKind::Duplicate {
                    client: to,
                    submessage_id,
                };
                self.record(round, kind);
            }
        }
    }

    fn record(&mut self, round: u64, kind: TraceEventKind) {
        tracing::trace!(round, ?kind, "sim");
        self.trace.push(TraceEvent { round, kind });
    }

    fn finish(&self) -> SimulationResult {
        let states = self
            .clients
            .iter()
            .zip(&self.late)
            .map(|(client, &late_joiner)| ClientState {
                client: client.id(),
                user: client.user(),
                late_joiner,
                shared: client.view().as_ref().map(SharedState::from_view),
            })
            .collect();
        SimulationResult {
            config: self.config.clone(),
            message: self.server.message(),
            log: self.server.log().to_vec(),
            states,
            trace: self.trace.clone(),
            rejected: self.clients.iter().map(SimClient::rejected).sum(),
            interesting_state_reached: self.interesting,
        }
    }

    /// Users' display names, shared with the oracle.
    #[must_use]
    pub fn users(&self) -> Rc<dyn UserDirectory> {
        Rc::clone(&self.users)
    }

    #[must_use]
    pub const fn widget_config(&self) -> &WidgetConfig {
        &self.widget_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(config: SimulationConfig) -> SimulationResult {
        Simulator::new(config)
            .expect("valid config")
            .run()
            .expect("simulation runs")
    }

    #[test]
    fn invalid_configs_are_rejected() {
        for config in [
            SimulationConfig {
                user_count: 0,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                client_count: 0,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                rounds: 0,
                ..SimulationConfig::default()
            },
        ] {
            assert!(Simulator::new(config).is_err());
        }
    }

    #[test]
    fn log_starts_with_owner_setup() {
        let result = run(SimulationConfig::default());
        let setup = &result.log[0];
        assert_eq!(setup.id, "7");
        assert_eq!(setup.sender_id, UserId(FIRST_USER));
        assert!(setup.content.contains("\"widget_type\":\"poll\""));
        assert!(result.log.len() > 1);
    }

    #[test]
    fn every_client_ends_active_and_converged() {
        for widget in WidgetType::ALL {
            let result = run(SimulationConfig {
                seed: 3,
                widget,
                late_joiners: 2,
                ..SimulationConfig::default()
            });
            assert_eq!(result.states.len(), 6);
            assert_eq!(result.states.iter().filter(|s| s.late_joiner).count(), 2);
            let reference = result.reference_state().expect("active");
            for state in &result.states {
                assert_eq!(state.shared.as_ref(), Some(reference));
            }
        }
    }

    #[test]
    fn same_seed_same_run() {
        let config = SimulationConfig {
            seed: 42,
            widget: WidgetType::Todo,
            ..SimulationConfig::default()
        };
        let a = run(config.clone());
        let b = run(config);
        assert_eq!(a.log, b.log);
        assert_eq!(a.trace, b.trace);
        assert_eq!(a.states, b.states);
    }

    #[test]
    fn devices_of_one_user_share_an_identity() {
        let config = SimulationConfig {
            user_count: 2,
            client_count: 4,
            ..SimulationConfig::default()
        };
        assert_eq!(config.user_of(0), config.user_of(2));
        assert_ne!(config.user_of(0), config.user_of(1));
    }
}
