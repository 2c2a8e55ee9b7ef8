//! Relay server and per-client delivery queues.
//!
//! The server is the single source of submessage ids. Each client receives
//! server traffic through its own queue, which may delay, duplicate, or stall
//! delivery but never reorders first deliveries: a client always sees new ids
//! in increasing order. Nothing is ever dropped.

use serde::{Deserialize, Serialize};
use widgets_core::{HostingMessage, Submessage, UserId};

use crate::rng::DeterministicRng;

/// Stable identifier for a simulated client.
pub type ClientId = usize;

/// Fault injection for simulated delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Maximum delivery delay in rounds.
    pub max_delay_rounds: u8,
    /// Percentage of deliveries repeated later.
    pub duplicate_rate_percent: u8,
    /// Percentage chance per round to stall a random client.
    pub stall_rate_percent: u8,
    /// Number of rounds a stalled client receives nothing.
    pub stall_duration_rounds: u8,
    /// Percentage of late joiners whose live feed overlaps their snapshot.
    pub overlap_rate_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_delay_rounds: 2,
            duplicate_rate_percent: 5,
            stall_rate_percent: 5,
            stall_duration_rounds: 3,
            overlap_rate_percent: 50,
        }
    }
}

/// The chat server: assigns ids and keeps the full submessage log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayServer {
    message: HostingMessage,
    next_id: u64,
    log: Vec<Submessage>,
}

impl RelayServer {
    /// Start a server whose first submessage gets `first_id`.
    #[must_use]
    pub const fn new(message: HostingMessage, first_id: u64) -> Self {
        Self {
            message,
            next_id: first_id,
            log: Vec::new(),
        }
    }

    #[must_use]
    pub const fn message(&self) -> HostingMessage {
        self.message
    }

    /// Store a widget submessage and return it with its assigned id.
    pub fn post(&mut self, sender: UserId, content: String) -> Submessage {
        let submessage = Submessage::widget(self.next_id, sender, content);
        self.next_id = self.next_id.saturating_add(1);
        self.log.push(submessage.clone());
        submessage
    }

    /// Everything posted so far, in id order.
    #[must_use]
    pub fn log(&self) -> &[Submessage] {
        &self.log
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Pending {
    deliver_at_round: u64,
    submessage: Submessage,
}

/// Outcome of enqueueing one submessage for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub delay_rounds: u8,
    pub duplicated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct DeliveryQueue {
    pending: Vec<Pending>,
    /// Latest round assigned to a first delivery; keeps id order.
    horizon: u64,
    stalled_until: u64,
}

/// Fan-out from the server to subscribed clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedNetwork {
    queues: Vec<Option<DeliveryQueue>>,
    fault: FaultConfig,
}

impl SimulatedNetwork {
    #[must_use]
    pub const fn new(fault: FaultConfig) -> Self {
        Self {
            queues: Vec::new(),
            fault,
        }
    }

    #[must_use]
    pub const fn fault_config(&self) -> FaultConfig {
        self.fault
    }

    /// Start delivering to `client`.
    pub fn subscribe(&mut self, client: ClientId) {
        if self.queues.len() <= client {
            self.queues.resize_with(client + 1, || None);
        }
        if let Some(slot) = self.queues.get_mut(client) {
            slot.get_or_insert_with(DeliveryQueue::default);
        }
    }

    #[must_use]
    pub fn is_subscribed(&self, client: ClientId) -> bool {
        matches!(self.queues.get(client), Some(Some(_)))
    }

    /// Stop delivering to `client` until `round`.
    pub fn stall(&mut self, client: ClientId, until_round: u64) {
        if let Some(Some(queue)) = self.queues.get_mut(client) {
            queue.stalled_until = queue.stalled_until.max(until_round);
        }
    }

    #[must_use]
    pub fn is_stalled(&self, client: ClientId, round: u64) -> bool {
        matches!(self.queues.get(client), Some(Some(q)) if q.stalled_until > round)
    }

    /// Number of submessages still in flight.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.queues.iter().flatten().map(|q| q.pending.len()).sum()
    }

    /// Queue `submessage` for one client.
    pub fn enqueue(
        &mut self,
        client: ClientId,
        submessage: &Submessage,
        round: u64,
        rng: &mut DeterministicRng,
    ) -> Option<EnqueueOutcome> {
        let fault = self.fault;
        let Some(Some(queue)) = self.queues.get_mut(client) else {
            return None;
        };

        let delay_bound = u64::from(fault.max_delay_rounds).saturating_add(1);
        let delay = rng.next_bounded(delay_bound);
        let deliver_at_round = round.saturating_add(delay).max(queue.horizon);
        queue.horizon = deliver_at_round;
        queue.pending.push(Pending {
            deliver_at_round,
            submessage: submessage.clone(),
        });

        let duplicated = rng.hit_rate_percent(fault.duplicate_rate_percent);
        if duplicated {
            let extra = rng.next_bounded(delay_bound).saturating_add(1);
            queue.pending.push(Pending {
                deliver_at_round: deliver_at_round.saturating_add(extra),
                submessage: submessage.clone(),
            });
        }

        Some(EnqueueOutcome {
            delay_rounds: u8::try_from(delay).unwrap_or(fault.max_delay_rounds),
            duplicated,
        })
    }

    /// Queue `submessage` for every subscribed client.
    pub fn broadcast(
        &mut self,
        submessage: &Submessage,
        round: u64,
        rng: &mut DeterministicRng,
    ) -> Vec<(ClientId, EnqueueOutcome)> {
        (0..self.queues.len())
            .filter_map(|client| {
                self.enqueue(client, submessage, round, rng)
                    .map(|outcome| (client, outcome))
            })
            .collect()
    }

    /// Take everything due for `client` by `round`, in queue order.
    pub fn deliver_ready(&mut self, client: ClientId, round: u64) -> Vec<Submessage> {
        let Some(Some(queue)) = self.queues.get_mut(client) else {
            return Vec::new();
        };
        if queue.stalled_until > round {
            return Vec::new();
        }
        let (ready, future): (Vec<Pending>, Vec<Pending>) = queue
            .pending
            .drain(..)
            .partition(|p| p.deliver_at_round <= round);
        queue.pending = future;
        ready.into_iter().map(|p| p.submessage).collect()
    }

    /// Take everything still queued for `client`, ignoring delays and stalls.
    pub fn drain(&mut self, client: ClientId) -> Vec<Submessage> {
        let Some(Some(queue)) = self.queues.get_mut(client) else {
            return Vec::new();
        };
        queue.stalled_until = 0;
        queue.pending.drain(..).map(|p| p.submessage).collect()
    }
}
