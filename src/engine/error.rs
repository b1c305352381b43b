use ulid::Ulid;

use crate::model::{BookingStatus, ModelError};

#[derive(Debug)]
pub enum EngineError {
    Validation(String),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Agent not accepting bookings, or not working the requested day.
    NotAvailable(String),
    /// Overlaps a live booking (id of the booking in the way).
    Conflict(Ulid),
    Unauthorized(String),
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::NotAvailable(_) => "not_available",
            EngineError::Conflict(_) => "conflict",
            EngineError::Unauthorized(_) => "unauthorized",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "internal",
        }
    }
}

impl From<ModelError> for EngineError {
    fn from(e: ModelError) -> Self {
        EngineError::Validation(e.to_string())
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::NotAvailable(msg) => write!(f, "not available: {msg}"),
            EngineError::Conflict(id) => write!(f, "slot already booked (conflicts with booking {id})"),
            EngineError::Unauthorized(msg) => write!(f, "not authorized: {msg}"),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "cannot move booking from {from} to {to}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
