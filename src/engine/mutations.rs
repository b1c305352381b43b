use std::sync::Arc;

use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::auth::{Caller, Role};
use crate::limits::*;
use crate::model::*;
use crate::notify::Notice;

use super::conflict::{
    check_deletable, check_no_conflict, commission_for, validate_request, validate_weekly,
};
use super::{Engine, EngineError, WalCommand};

fn validate_name(name: &Option<String>) -> Result<(), EngineError> {
    if let Some(n) = name
        && n.len() > MAX_NAME_LEN
    {
        return Err(EngineError::LimitExceeded("agent name too long"));
    }
    Ok(())
}

impl Engine {
    pub async fn create_agent(
        &self,
        id: Ulid,
        name: Option<String>,
        default_duration: MeetingDuration,
    ) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        let _creating = self.create_lock.lock().await;
        if self.store.agent_count() >= MAX_AGENTS {
            return Err(EngineError::LimitExceeded("too many agents"));
        }
        validate_name(&name)?;
        if self.store.contains_agent(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::AgentCreated { id, name: name.clone(), default_duration };
        self.wal_append(&event).await?;
        let agent = AgentState::new(id, name, default_duration);
        self.store.insert_agent(id, Arc::new(RwLock::new(agent)));
        tracing::info!("agent {id} created");
        Ok(())
    }

    pub async fn update_agent(&self, id: Ulid, patch: AgentPatch) -> Result<AgentInfo, EngineError> {
        validate_name(&patch.name)?;
        let _gate = self.compaction_gate.read().await;
        let mut guard = self.lock_agent(id).await?;

        let event = Event::AgentUpdated {
            id,
            name: patch.name.or_else(|| guard.name.clone()),
            accepting_bookings: patch.accepting_bookings.unwrap_or(guard.accepting_bookings),
            default_duration: patch.default_duration.unwrap_or(guard.default_duration),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(AgentInfo {
            id,
            name: guard.name.clone(),
            accepting_bookings: guard.accepting_bookings,
            default_duration: guard.default_duration,
            booking_count: guard.booking_count(),
        })
    }

    /// Removes the agent together with its schedule and bookings.
    pub async fn delete_agent(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        let guard = self.lock_agent(id).await?;

        self.wal_append(&Event::AgentDeleted { id }).await?;
        self.store.unmap_agent_bookings(&guard);
        self.store.remove_agent(&id);
        tracing::info!("agent {id} deleted with {} bookings", guard.booking_count());
        Ok(())
    }

    /// Replace the whole weekly schedule in one event.
    pub async fn save_weekly_availability(
        &self,
        agent_id: Ulid,
        entries: Vec<WeeklyEntry>,
    ) -> Result<(), EngineError> {
        validate_weekly(&entries)?;
        let _gate = self.compaction_gate.read().await;
        let mut guard = self.lock_agent(agent_id).await?;
        let event = Event::ScheduleReplaced { agent_id, entries };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn propose_booking(&self, req: BookingRequest) -> Result<Booking, EngineError> {
        let result = self.admit(req).await;
        match &result {
            Ok(_) => metrics::counter!(crate::observability::BOOKINGS_ADMITTED_TOTAL).increment(1),
            Err(e) => {
                metrics::counter!(crate::observability::BOOKINGS_REJECTED_TOTAL, "reason" => e.kind())
                    .increment(1)
            }
        }
        result
    }

    async fn admit(&self, req: BookingRequest) -> Result<Booking, EngineError> {
        validate_request(&req)?;
        if self.store.contains_booking(&req.id) {
            return Err(EngineError::AlreadyExists(req.id));
        }
        let _gate = self.compaction_gate.read().await;
        let mut guard = self.lock_agent(req.agent_id).await?;

        if !guard.accepting_bookings {
            return Err(EngineError::NotAvailable("agent is not accepting bookings".into()));
        }
        let day = day_of_week(req.date);
        if guard.hours_for(day).is_empty() {
            return Err(EngineError::NotAvailable(format!(
                "agent is not available on {}",
                weekday_name(day)
            )));
        }
        if guard.bookings_on(req.date).len() >= MAX_BOOKINGS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many bookings on this day"));
        }
        check_no_conflict(&guard, req.date, &req.span)?;

        let booking = Booking {
            id: req.id,
            agent_id: req.agent_id,
            client_id: req.client_id,
            service_id: req.service_id,
            date: req.date,
            span: req.span,
            status: BookingStatus::Pending,
            total_amount: req.total_amount,
            commission: commission_for(req.total_amount),
            seen_by_agent: false,
            notes: req.notes,
        };
        // Authoritative duplicate check: the early one above can race.
        let reservation = self
            .store
            .reserve_booking(booking.id, booking.agent_id)
            .ok_or(EngineError::AlreadyExists(booking.id))?;
        let event = Event::BookingCreated { booking: booking.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        reservation.commit();
        drop(guard);

        self.publish(Notice::NewBooking {
            booking_id: booking.id,
            agent_id: booking.agent_id,
            client_id: booking.client_id,
            date: booking.date,
            start: format_hhmm(booking.span.start),
            end: format_hhmm(booking.span.end),
        });
        Ok(booking)
    }

    pub async fn update_booking_status(
        &self,
        caller: Caller,
        id: Ulid,
        status: BookingStatus,
    ) -> Result<Booking, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let (agent_id, mut guard) = self.resolve_booking_write(&id).await?;
        let booking = guard.booking(id).ok_or(EngineError::NotFound(id))?;

        let allowed = match caller.role {
            Role::Admin => true,
            Role::Agent => caller.is_agent(booking.agent_id),
            Role::Client => {
                caller.is_client(booking.client_id) && status == BookingStatus::Cancelled
            }
        };
        if !allowed {
            return Err(EngineError::Unauthorized(format!(
                "cannot set booking {id} to {status}"
            )));
        }

        let current = booking.status;
        if current == status {
            return Ok(booking.clone());
        }
        if !current.can_transition_to(status) {
            return Err(EngineError::InvalidTransition { from: current, to: status });
        }

        let event = Event::BookingStatusChanged { id, agent_id, status };
        self.persist_and_apply(&mut guard, &event).await?;
        let updated = guard.booking(id).cloned().ok_or(EngineError::NotFound(id))?;
        drop(guard);

        self.publish(Notice::BookingStatusChanged { booking_id: id, agent_id, status });
        Ok(updated)
    }

    pub async fn mark_booking_seen(&self, caller: Caller, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        let (agent_id, mut guard) = self.resolve_booking_write(&id).await?;
        let booking = guard.booking(id).ok_or(EngineError::NotFound(id))?;
        if !(caller.is_admin() || caller.is_agent(booking.agent_id)) {
            return Err(EngineError::Unauthorized(format!(
                "only the owning agent can mark booking {id} seen"
            )));
        }
        if booking.seen_by_agent {
            return Ok(());
        }
        let event = Event::BookingSeen { id, agent_id };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn delete_booking(&self, caller: Caller, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        let (agent_id, mut guard) = self.resolve_booking_write(&id).await?;
        let booking = guard.booking(id).ok_or(EngineError::NotFound(id))?;
        if !(caller.is_admin()
            || caller.is_agent(booking.agent_id)
            || caller.is_client(booking.client_id))
        {
            return Err(EngineError::Unauthorized(format!("cannot delete booking {id}")));
        }
        check_deletable(booking, self.now())?;

        let event = Event::BookingDeleted { id, agent_id };
        self.persist_and_apply(&mut guard, &event).await?;
        drop(guard);

        self.publish(Notice::BookingDeleted { booking_id: id, agent_id });
        Ok(())
    }

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // No mutation may log between the snapshot and the swap.
        let _gate = self.compaction_gate.write().await;
        let mut events = Vec::new();
        for agent_id in self.store.agent_ids() {
            let Some(agent) = self.get_agent(&agent_id) else {
                continue;
            };
            let guard = agent.read().await;
            events.push(Event::AgentCreated {
                id: guard.id,
                name: guard.name.clone(),
                default_duration: guard.default_duration,
            });
            if !guard.accepting_bookings {
                events.push(Event::AgentUpdated {
                    id: guard.id,
                    name: guard.name.clone(),
                    accepting_bookings: false,
                    default_duration: guard.default_duration,
                });
            }
            if !guard.weekly.is_empty() {
                events.push(Event::ScheduleReplaced {
                    agent_id: guard.id,
                    entries: guard.weekly.clone(),
                });
            }
            for booking in guard.bookings.values().flatten() {
                events.push(Event::BookingCreated { booking: booking.clone() });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
