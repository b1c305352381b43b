use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};

use crate::model::*;

use super::EngineError;

/// How a candidate slot is tested against existing bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapRule {
    /// Slot `[t, t + d)` is blocked by any booking it overlaps.
    #[default]
    Interval,
    /// Slot is blocked only if its start label `t` falls inside a booking.
    Point,
}

impl FromStr for OverlapRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interval" => Ok(OverlapRule::Interval),
            "point" => Ok(OverlapRule::Point),
            other => Err(format!("unknown overlap rule {other:?} (expected interval or point)")),
        }
    }
}

// ── Slot Generation ───────────────────────────────────────────────

/// Turn a day's working hours into labelled candidate slots.
///
/// `hours` are the active spans for the weekday of `date`, in configuration
/// order; an empty slice yields an empty result (the agent does not work that
/// day). `bookings` are the live booking spans on `date`, sorted by start.
///
/// A slot is emitted only when it fits entirely inside its span, so trailing
/// partial slots never appear. A slot is unavailable when it collides with a
/// booking under `rule`, or when `date` is today and its label is at or
/// before the current minute.
pub fn generate_slots(
    hours: &[Span],
    date: NaiveDate,
    bookings: &[Span],
    duration: Minute,
    now: NaiveDateTime,
    rule: OverlapRule,
) -> Result<Vec<TimeSlot>, EngineError> {
    if duration == 0 {
        return Err(EngineError::Validation("slot duration must be positive".into()));
    }
    // Keeps `cursor + duration` within u16: cursor never exceeds a day either.
    if duration > MINUTES_PER_DAY {
        return Err(EngineError::Validation(format!(
            "slot duration must be at most {MINUTES_PER_DAY} minutes"
        )));
    }

    let cutoff = (date == now.date()).then(|| minute_of_day(&now));
    let mut slots = Vec::new();

    for span in hours {
        let mut cursor = span.start;
        while cursor + duration <= span.end {
            let booked = collides(bookings, cursor, duration, rule);
            let past = cutoff.is_some_and(|now_min| cursor <= now_min);
            slots.push(TimeSlot {
                time: cursor,
                available: !booked && !past,
            });
            cursor += duration;
        }
    }

    Ok(slots)
}

fn collides(bookings: &[Span], start: Minute, duration: Minute, rule: OverlapRule) -> bool {
    match rule {
        OverlapRule::Interval => {
            let end = start + duration;
            // Bookings at index >= right_bound start at or after the slot end.
            let right_bound = bookings.partition_point(|b| b.start < end);
            bookings[..right_bound].iter().any(|b| b.end > start)
        }
        OverlapRule::Point => {
            let right_bound = bookings.partition_point(|b| b.start <= start);
            bookings[..right_bound].iter().any(|b| b.contains_instant(start))
        }
    }
}

/// First pair of overlapping spans in a start-sorted slice, if any.
pub fn find_overlap(sorted: &[Span]) -> Option<(Span, Span)> {
    let mut reach: Option<Span> = None;
    for &span in sorted {
        if let Some(prev) = reach
            && span.start < prev.end
        {
            return Some((prev, span));
        }
        reach = match reach {
            Some(prev) if prev.end >= span.end => Some(prev),
            _ => Some(span),
        };
    }
    None
}

/// Seven-day editor view, Sunday first.
pub fn weekly_view(entries: &[WeeklyEntry]) -> Vec<WeeklyDay> {
    (0u8..7)
        .map(|day| {
            let mut slots: Vec<Span> = entries
                .iter()
                .filter(|e| e.day == day && e.active)
                .map(|e| e.span)
                .collect();
            slots.sort_by_key(|s| s.start);
            WeeklyDay {
                day,
                unavailable: slots.is_empty(),
                slots,
            }
        })
        .collect()
}
