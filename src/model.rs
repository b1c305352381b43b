use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minutes since local midnight. All time-of-day math uses this.
pub type Minute = u16;

pub const MINUTES_PER_DAY: Minute = 24 * 60;

/// Parse a zero-padded 24-hour `"HH:MM"` string. `"24:00"` is accepted as end of day.
pub fn parse_hhmm(s: &str) -> Result<Minute, ModelError> {
    let b = s.as_bytes();
    if b.len() != 5 || b[2] != b':' {
        return Err(ModelError::BadTime(s.to_string()));
    }
    let digit = |c: u8| -> Result<Minute, ModelError> {
        if c.is_ascii_digit() {
            Ok(Minute::from(c - b'0'))
        } else {
            Err(ModelError::BadTime(s.to_string()))
        }
    };
    let hours = digit(b[0])? * 10 + digit(b[1])?;
    let minutes = digit(b[3])? * 10 + digit(b[4])?;
    if minutes > 59 || hours > 24 || (hours == 24 && minutes != 0) {
        return Err(ModelError::BadTime(s.to_string()));
    }
    Ok(hours * 60 + minutes)
}

pub fn format_hhmm(m: Minute) -> String {
    format!("{:02}:{:02}", m / 60, m % 60)
}

/// Strict `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Result<NaiveDate, ModelError> {
    if s.len() != 10 {
        return Err(ModelError::BadDate(s.to_string()));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| ModelError::BadDate(s.to_string()))
}

/// Minute of day of a wall-clock instant, truncated to the minute.
pub fn minute_of_day(t: &NaiveDateTime) -> Minute {
    (t.hour() * 60 + t.minute()) as Minute
}

/// 0 = Sunday .. 6 = Saturday.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

pub fn weekday_name(day: u8) -> &'static str {
    match day {
        0 => "Sunday",
        1 => "Monday",
        2 => "Tuesday",
        3 => "Wednesday",
        4 => "Thursday",
        5 => "Friday",
        6 => "Saturday",
        _ => "unknown day",
    }
}

/// Half-open interval `[start, end)` within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Minute,
    pub end: Minute,
}

impl Span {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Build a span from two `"HH:MM"` strings, rejecting empty or inverted ranges.
    pub fn parse(start: &str, end: &str) -> Result<Self, ModelError> {
        let s = parse_hhmm(start)?;
        let e = parse_hhmm(end)?;
        if s >= e {
            return Err(ModelError::EmptySpan { start: s, end: e });
        }
        Ok(Self { start: s, end: e })
    }

    pub fn duration(&self) -> Minute {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Minute) -> bool {
        self.start <= t && t < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_hhmm(self.start), format_hhmm(self.end))
    }
}

/// Meeting lengths an agent may pick as their slot granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeetingDuration {
    Fifteen,
    #[default]
    Thirty,
    FortyFive,
    Sixty,
}

impl MeetingDuration {
    pub fn minutes(self) -> Minute {
        match self {
            MeetingDuration::Fifteen => 15,
            MeetingDuration::Thirty => 30,
            MeetingDuration::FortyFive => 45,
            MeetingDuration::Sixty => 60,
        }
    }
}

impl TryFrom<i64> for MeetingDuration {
    type Error = ModelError;

    fn try_from(minutes: i64) -> Result<Self, Self::Error> {
        match minutes {
            15 => Ok(MeetingDuration::Fifteen),
            30 => Ok(MeetingDuration::Thirty),
            45 => Ok(MeetingDuration::FortyFive),
            60 => Ok(MeetingDuration::Sixty),
            other => Err(ModelError::BadDuration(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    /// Live bookings hold their time range; the rest free it.
    pub fn is_live(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, NoShow)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::NoShow => "NO_SHOW",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "COMPLETED" => Ok(BookingStatus::Completed),
            "NO_SHOW" => Ok(BookingStatus::NoShow),
            _ => Err(ModelError::BadStatus(s.to_string())),
        }
    }
}

/// One recurring working-hours interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyEntry {
    /// 0 = Sunday.
    pub day: u8,
    pub span: Span,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub agent_id: Ulid,
    pub client_id: Ulid,
    pub service_id: Option<Ulid>,
    pub date: NaiveDate,
    pub span: Span,
    pub status: BookingStatus,
    /// Integer cents.
    pub total_amount: Option<i64>,
    /// Integer cents.
    pub commission: Option<i64>,
    pub seen_by_agent: bool,
    pub notes: Option<String>,
}

impl Booking {
    pub fn duration(&self) -> Minute {
        self.span.duration()
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(NaiveTime::MIN) + chrono::Duration::minutes(i64::from(self.span.start))
    }
}

#[derive(Debug, Clone)]
pub struct AgentState {
    pub id: Ulid,
    pub name: Option<String>,
    /// Global "accepting bookings" toggle, independent of the schedule.
    pub accepting_bookings: bool,
    pub default_duration: MeetingDuration,
    /// Sorted by `(day, span.start)`.
    pub weekly: Vec<WeeklyEntry>,
    /// Per date, sorted by `span.start`.
    pub bookings: BTreeMap<NaiveDate, Vec<Booking>>,
}

impl AgentState {
    pub fn new(id: Ulid, name: Option<String>, default_duration: MeetingDuration) -> Self {
        Self {
            id,
            name,
            accepting_bookings: true,
            default_duration,
            weekly: Vec::new(),
            bookings: BTreeMap::new(),
        }
    }

    pub fn replace_weekly(&mut self, mut entries: Vec<WeeklyEntry>) {
        entries.sort_by_key(|e| (e.day, e.span.start));
        self.weekly = entries;
    }

    /// Active working-hours spans for a weekday, ascending.
    pub fn hours_for(&self, day: u8) -> Vec<Span> {
        self.weekly
            .iter()
            .filter(|e| e.day == day && e.active)
            .map(|e| e.span)
            .collect()
    }

    /// Insert booking maintaining sort order by span.start within its date.
    pub fn insert_booking(&mut self, booking: Booking) {
        let day = self.bookings.entry(booking.date).or_default();
        let pos = day
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        day.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let (date, pos) = self.bookings.iter().find_map(|(date, day)| {
            day.iter().position(|b| b.id == id).map(|pos| (*date, pos))
        })?;
        let day = self.bookings.get_mut(&date)?;
        let removed = day.remove(pos);
        if day.is_empty() {
            self.bookings.remove(&date);
        }
        Some(removed)
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.values().flatten().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.values_mut().flatten().find(|b| b.id == id)
    }

    pub fn bookings_on(&self, date: NaiveDate) -> &[Booking] {
        self.bookings.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.values().map(Vec::len).sum()
    }

    /// Live bookings on `date` whose span overlaps `query`.
    /// Binary search skips bookings starting at or after `query.end`.
    pub fn overlapping(&self, date: NaiveDate, query: &Span) -> impl Iterator<Item = &Booking> {
        let day = self.bookings_on(date);
        let right_bound = day.partition_point(|b| b.span.start < query.end);
        day[..right_bound]
            .iter()
            .filter(move |b| b.status.is_live() && b.span.end > query.start)
    }

    /// Spans of all live bookings on `date`, ascending by start.
    pub fn live_spans(&self, date: NaiveDate) -> Vec<Span> {
        self.bookings_on(date)
            .iter()
            .filter(|b| b.status.is_live())
            .map(|b| b.span)
            .collect()
    }
}

/// Flat event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AgentCreated {
        id: Ulid,
        name: Option<String>,
        default_duration: MeetingDuration,
    },
    AgentUpdated {
        id: Ulid,
        name: Option<String>,
        accepting_bookings: bool,
        default_duration: MeetingDuration,
    },
    AgentDeleted {
        id: Ulid,
    },
    /// Whole weekly schedule, replacing whatever was there.
    ScheduleReplaced {
        agent_id: Ulid,
        entries: Vec<WeeklyEntry>,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingStatusChanged {
        id: Ulid,
        agent_id: Ulid,
        status: BookingStatus,
    },
    BookingSeen {
        id: Ulid,
        agent_id: Ulid,
    },
    BookingDeleted {
        id: Ulid,
        agent_id: Ulid,
    },
}

// ── Requests ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub id: Ulid,
    pub agent_id: Ulid,
    pub client_id: Ulid,
    pub service_id: Option<Ulid>,
    pub date: NaiveDate,
    pub span: Span,
    pub total_amount: Option<i64>,
    pub notes: Option<String>,
}

/// Partial agent update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentPatch {
    pub name: Option<String>,
    pub accepting_bookings: Option<bool>,
    pub default_duration: Option<MeetingDuration>,
}

// ── Query result types ───────────────────────────────────────────

/// A candidate start time. Derived for display, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    pub time: Minute,
    pub available: bool,
}

impl TimeSlot {
    pub fn label(&self) -> String {
        format_hhmm(self.time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySlots {
    pub date: NaiveDate,
    pub duration: Minute,
    pub slots: Vec<TimeSlot>,
    /// Set when the agent does not work that day.
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyDay {
    pub day: u8,
    pub unavailable: bool,
    pub slots: Vec<Span>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInfo {
    pub id: Ulid,
    pub name: Option<String>,
    pub accepting_bookings: bool,
    pub default_duration: MeetingDuration,
    pub booking_count: usize,
}

// ── Errors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    BadTime(String),
    BadDate(String),
    EmptySpan { start: Minute, end: Minute },
    BadDuration(i64),
    BadDay(i64),
    BadStatus(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::BadTime(s) => write!(f, "invalid time {s:?}: expected zero-padded HH:MM"),
            ModelError::BadDate(s) => write!(f, "invalid date {s:?}: expected YYYY-MM-DD"),
            ModelError::EmptySpan { start, end } => write!(
                f,
                "start {} must be before end {}",
                format_hhmm(*start),
                format_hhmm(*end)
            ),
            ModelError::BadDuration(m) => {
                write!(f, "invalid meeting duration {m}: expected 15, 30, 45 or 60")
            }
            ModelError::BadDay(d) => write!(f, "invalid day of week {d}: expected 0..6"),
            ModelError::BadStatus(s) => write!(f, "invalid booking status {s:?}"),
        }
    }
}

impl std::error::Error for ModelError {}
