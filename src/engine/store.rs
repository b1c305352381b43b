use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ulid::Ulid;

use crate::model::*;

use super::SharedAgentState;

/// Agents (working hours + booking ledger) and the booking → agent index.
pub struct InMemoryStore {
    agents: DashMap<Ulid, SharedAgentState>,
    booking_to_agent: DashMap<Ulid, Ulid>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
            booking_to_agent: DashMap::new(),
        }
    }

    // ── Agent CRUD ───────────────────────────────────────────

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn contains_agent(&self, id: &Ulid) -> bool {
        self.agents.contains_key(id)
    }

    pub fn get_agent(&self, id: &Ulid) -> Option<SharedAgentState> {
        self.agents.get(id).map(|e| e.value().clone())
    }

    pub fn insert_agent(&self, id: Ulid, state: SharedAgentState) {
        self.agents.insert(id, state);
    }

    pub fn remove_agent(&self, id: &Ulid) -> Option<(Ulid, SharedAgentState)> {
        self.agents.remove(id)
    }

    pub fn agent_ids(&self) -> Vec<Ulid> {
        self.agents.iter().map(|e| *e.key()).collect()
    }

    // ── Booking index ────────────────────────────────────────

    pub fn agent_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_agent.get(booking_id).map(|e| *e.value())
    }

    pub fn contains_booking(&self, booking_id: &Ulid) -> bool {
        self.booking_to_agent.contains_key(booking_id)
    }

    /// Claim a booking id for `agent_id` before it is logged. `None` if any
    /// agent already holds that id.
    pub(super) fn reserve_booking(
        &self,
        booking_id: Ulid,
        agent_id: Ulid,
    ) -> Option<BookingReservation<'_>> {
        match self.booking_to_agent.entry(booking_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(agent_id);
                Some(BookingReservation {
                    store: self,
                    booking_id,
                    committed: false,
                })
            }
        }
    }

    fn map_booking(&self, booking_id: Ulid, agent_id: Ulid) {
        self.booking_to_agent.insert(booking_id, agent_id);
    }

    fn unmap_booking(&self, booking_id: &Ulid) {
        self.booking_to_agent.remove(booking_id);
    }

    /// Forget every booking of an agent that is going away.
    pub fn unmap_agent_bookings(&self, agent: &AgentState) {
        for booking in agent.bookings.values().flatten() {
            self.unmap_booking(&booking.id);
        }
    }

    // ── Event application ────────────────────────────────────

    /// Apply an agent-scoped event. The caller holds the agent's lock.
    pub fn apply_event(&self, agent: &mut AgentState, event: &Event) {
        match event {
            Event::AgentUpdated {
                name,
                accepting_bookings,
                default_duration,
                ..
            } => {
                agent.name = name.clone();
                agent.accepting_bookings = *accepting_bookings;
                agent.default_duration = *default_duration;
            }
            Event::ScheduleReplaced { entries, .. } => {
                agent.replace_weekly(entries.clone());
            }
            Event::BookingCreated { booking } => {
                agent.insert_booking(booking.clone());
                self.map_booking(booking.id, booking.agent_id);
            }
            Event::BookingStatusChanged { id, status, .. } => {
                if let Some(b) = agent.booking_mut(*id) {
                    b.status = *status;
                }
            }
            Event::BookingSeen { id, .. } => {
                if let Some(b) = agent.booking_mut(*id) {
                    b.seen_by_agent = true;
                }
            }
            Event::BookingDeleted { id, .. } => {
                agent.remove_booking(*id);
                self.unmap_booking(id);
            }
            // AgentCreated/Deleted are handled at the map level, not here
            Event::AgentCreated { .. } | Event::AgentDeleted { .. } => {}
        }
    }
}

/// A claimed booking id. Dropping it without `commit` frees the id again.
pub(super) struct BookingReservation<'a> {
    store: &'a InMemoryStore,
    booking_id: Ulid,
    committed: bool,
}

impl BookingReservation<'_> {
    pub(super) fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for BookingReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.store.unmap_booking(&self.booking_id);
        }
    }
}

/// Agent an event belongs to (for agent-scoped events).
pub(super) fn event_agent_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::AgentUpdated { id, .. } => Some(*id),
        Event::ScheduleReplaced { agent_id, .. }
        | Event::BookingStatusChanged { agent_id, .. }
        | Event::BookingSeen { agent_id, .. }
        | Event::BookingDeleted { agent_id, .. } => Some(*agent_id),
        Event::BookingCreated { booking } => Some(booking.agent_id),
        Event::AgentCreated { .. } | Event::AgentDeleted { .. } => None,
    }
}
