use chrono::{NaiveDate, NaiveDateTime};

use crate::limits::*;
use crate::model::*;

use super::slots::find_overlap;
use super::EngineError;

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(ModelError::EmptySpan { start: span.start, end: span.end }.into());
    }
    if span.end > MINUTES_PER_DAY {
        return Err(EngineError::Validation(format!("{span} runs past midnight")));
    }
    Ok(())
}

pub(crate) fn validate_weekly(entries: &[WeeklyEntry]) -> Result<(), EngineError> {
    if entries.len() > MAX_WEEKLY_ENTRIES {
        return Err(EngineError::LimitExceeded("too many weekly entries"));
    }
    for entry in entries {
        if entry.day > 6 {
            return Err(ModelError::BadDay(i64::from(entry.day)).into());
        }
        validate_span(&entry.span)?;
    }
    for day in 0u8..7 {
        let mut active: Vec<Span> = entries
            .iter()
            .filter(|e| e.day == day && e.active)
            .map(|e| e.span)
            .collect();
        active.sort_by_key(|s| s.start);
        if let Some((a, b)) = find_overlap(&active) {
            return Err(EngineError::Validation(format!(
                "{} hours {a} and {b} overlap",
                weekday_name(day)
            )));
        }
    }
    Ok(())
}

pub(crate) fn validate_request(req: &BookingRequest) -> Result<(), EngineError> {
    validate_span(&req.span)?;
    if let Some(amount) = req.total_amount {
        if amount < 0 {
            return Err(EngineError::Validation("total amount must not be negative".into()));
        }
        if amount > MAX_TOTAL_AMOUNT {
            return Err(EngineError::LimitExceeded("total amount too large"));
        }
    }
    if let Some(ref notes) = req.notes
        && notes.len() > MAX_NOTES_LEN
    {
        return Err(EngineError::LimitExceeded("notes too long"));
    }
    Ok(())
}

/// True interval overlap against live bookings: `start < req.end && end > req.start`.
pub(crate) fn check_no_conflict(
    agent: &AgentState,
    date: NaiveDate,
    span: &Span,
) -> Result<(), EngineError> {
    match agent.overlapping(date, span).next() {
        Some(existing) => Err(EngineError::Conflict(existing.id)),
        None => Ok(()),
    }
}

/// Fixed-percentage commission, rounded half up, in cents.
pub(crate) fn commission_for(total_amount: Option<i64>) -> Option<i64> {
    total_amount.map(|amount| (amount * COMMISSION_PERCENT + 50) / 100)
}

pub(crate) fn check_deletable(booking: &Booking, now: NaiveDateTime) -> Result<(), EngineError> {
    if booking.status == BookingStatus::Completed {
        return Err(EngineError::Validation("completed bookings cannot be deleted".into()));
    }
    let lead = chrono::Duration::minutes(DELETE_LEAD_MINUTES);
    if booking.starts_at() <= now + lead {
        return Err(EngineError::Validation(format!(
            "bookings can only be deleted more than {DELETE_LEAD_MINUTES} minutes before they start"
        )));
    }
    Ok(())
}
