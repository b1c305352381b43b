//! Hard caps on user-controlled sizes.

pub const MAX_AGENTS: usize = 100_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_NOTES_LEN: usize = 2_000;

/// Weekly schedule entries per agent (all days together).
pub const MAX_WEEKLY_ENTRIES: usize = 7 * 16;

/// Bookings (any status) held per agent per date.
pub const MAX_BOOKINGS_PER_DAY: usize = 512;

/// Largest accepted booking amount, in cents.
pub const MAX_TOTAL_AMOUNT: i64 = 10_000_000_000;

/// Slot query durations outside the agent default.
pub const MIN_SLOT_MINUTES: u16 = 5;
pub const MAX_SLOT_MINUTES: u16 = 8 * 60;

/// Commission taken on every paid booking.
pub const COMMISSION_PERCENT: i64 = 10;

/// Minimum lead time before a booking start for it to be deleted.
pub const DELETE_LEAD_MINUTES: i64 = 60;

pub const MAX_CHANNEL_NAME_LEN: usize = 64;
pub const MAX_LISTENS_PER_CONNECTION: usize = 64;
