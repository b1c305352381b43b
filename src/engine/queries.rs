use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::slots::{generate_slots, weekly_view};
use super::{Engine, EngineError};

fn agent_info(agent: &AgentState) -> AgentInfo {
    AgentInfo {
        id: agent.id,
        name: agent.name.clone(),
        accepting_bookings: agent.accepting_bookings,
        default_duration: agent.default_duration,
        booking_count: agent.booking_count(),
    }
}

impl Engine {
    /// Candidate slots for one agent and date.
    ///
    /// `duration` overrides the agent's default meeting length. An agent who
    /// does not work that weekday gets no slots and an explanatory message.
    pub async fn day_slots(
        &self,
        agent_id: Ulid,
        date: NaiveDate,
        duration: Option<Minute>,
    ) -> Result<DaySlots, EngineError> {
        if let Some(d) = duration
            && !(MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&d)
        {
            return Err(EngineError::Validation(format!(
                "slot duration must be between {MIN_SLOT_MINUTES} and {MAX_SLOT_MINUTES} minutes"
            )));
        }
        let agent = self
            .get_agent(&agent_id)
            .ok_or(EngineError::NotFound(agent_id))?;
        let guard = agent.read().await;
        let duration = duration.unwrap_or_else(|| guard.default_duration.minutes());

        let day = day_of_week(date);
        let hours = guard.hours_for(day);
        if hours.is_empty() {
            return Ok(DaySlots {
                date,
                duration,
                slots: Vec::new(),
                message: Some(format!("agent is not available on {}", weekday_name(day))),
            });
        }

        let bookings = guard.live_spans(date);
        let slots = generate_slots(&hours, date, &bookings, duration, self.now(), self.overlap_rule())?;
        Ok(DaySlots { date, duration, slots, message: None })
    }

    pub async fn weekly_availability(&self, agent_id: Ulid) -> Result<Vec<WeeklyDay>, EngineError> {
        let agent = self
            .get_agent(&agent_id)
            .ok_or(EngineError::NotFound(agent_id))?;
        let guard = agent.read().await;
        Ok(weekly_view(&guard.weekly))
    }

    /// All agents, ordered by id.
    pub async fn list_agents(&self) -> Vec<AgentInfo> {
        let mut ids = self.store.agent_ids();
        ids.sort();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(agent) = self.get_agent(&id) {
                out.push(agent_info(&*agent.read().await));
            }
        }
        out
    }

    pub async fn get_agent_info(&self, agent_id: Ulid) -> Result<AgentInfo, EngineError> {
        let agent = self
            .get_agent(&agent_id)
            .ok_or(EngineError::NotFound(agent_id))?;
        let guard = agent.read().await;
        Ok(agent_info(&guard))
    }

    /// An agent's bookings, by date then start time. `date` narrows to one day.
    pub async fn get_bookings(
        &self,
        agent_id: Ulid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Booking>, EngineError> {
        let agent = self
            .get_agent(&agent_id)
            .ok_or(EngineError::NotFound(agent_id))?;
        let guard = agent.read().await;
        let bookings = match date {
            Some(d) => guard.bookings_on(d).to_vec(),
            None => guard.bookings.values().flatten().cloned().collect(),
        };
        Ok(bookings)
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let agent_id = self
            .store
            .agent_for_booking(&id)
            .ok_or(EngineError::NotFound(id))?;
        let agent = self
            .get_agent(&agent_id)
            .ok_or(EngineError::NotFound(agent_id))?;
        let guard = agent.read().await;
        guard.booking(id).cloned().ok_or(EngineError::NotFound(id))
    }
}
