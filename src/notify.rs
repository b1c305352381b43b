use std::time::{Duration, Instant};

use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::BookingStatus;

const CHANNEL_CAPACITY: usize = 256;

/// What an agent's live channel is told about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    NewBooking {
        booking_id: Ulid,
        agent_id: Ulid,
        client_id: Ulid,
        date: NaiveDate,
        start: String,
        end: String,
    },
    BookingStatusChanged {
        booking_id: Ulid,
        agent_id: Ulid,
        status: BookingStatus,
    },
    BookingDeleted {
        booking_id: Ulid,
        agent_id: Ulid,
    },
}

impl Notice {
    pub fn agent_id(&self) -> Ulid {
        match self {
            Notice::NewBooking { agent_id, .. }
            | Notice::BookingStatusChanged { agent_id, .. }
            | Notice::BookingDeleted { agent_id, .. } => *agent_id,
        }
    }

    pub fn payload(&self) -> Result<String, NotifyError> {
        serde_json::to_string(self).map_err(|e| NotifyError::Encode(e.to_string()))
    }
}

/// Best-effort outbound channel for agent notifications.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notice: &Notice) -> Result<(), NotifyError>;
}

struct Channel {
    sender: broadcast::Sender<Notice>,
    last_active: Instant,
}

/// Broadcast hub, one channel per agent.
pub struct NotifyHub {
    channels: DashMap<Ulid, Channel>,
    max_subscriptions: usize,
}

impl NotifyHub {
    pub fn new(max_subscriptions: usize) -> Self {
        Self {
            channels: DashMap::new(),
            max_subscriptions,
        }
    }

    /// Subscribe to an agent's notices. Creates the channel if needed.
    pub fn subscribe(&self, agent_id: Ulid) -> Result<broadcast::Receiver<Notice>, NotifyError> {
        let active = self.active_subscriptions();
        if active >= self.max_subscriptions {
            return Err(NotifyError::TooManySubscriptions(self.max_subscriptions));
        }
        let mut channel = self.channels.entry(agent_id).or_insert_with(|| Channel {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
            last_active: Instant::now(),
        });
        channel.last_active = Instant::now();
        let rx = channel.sender.subscribe();
        drop(channel);
        metrics::gauge!(crate::observability::SUBSCRIPTIONS_ACTIVE).set((active + 1) as f64);
        Ok(rx)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.channels
            .iter()
            .map(|c| c.value().sender.receiver_count())
            .sum()
    }

    /// Drop an agent's channel; its receivers observe `Closed`.
    pub fn remove(&self, agent_id: &Ulid) {
        self.channels.remove(agent_id);
    }

    /// Drop channels nobody listens to, and channels quiet for longer than `idle`.
    /// Returns the number of channels removed.
    pub fn sweep_idle(&self, idle: Duration) -> usize {
        let before = self.channels.len();
        self.channels.retain(|_, channel| {
            channel.sender.receiver_count() > 0 && channel.last_active.elapsed() < idle
        });
        metrics::gauge!(crate::observability::SUBSCRIPTIONS_ACTIVE)
            .set(self.active_subscriptions() as f64);
        before - self.channels.len()
    }
}

impl NotificationSink for NotifyHub {
    /// No-op if nobody is listening.
    fn publish(&self, notice: &Notice) -> Result<(), NotifyError> {
        if let Some(mut channel) = self.channels.get_mut(&notice.agent_id()) {
            channel.last_active = Instant::now();
            // Err only means every receiver is gone; the sweeper reclaims the channel.
            let _ = channel.sender.send(notice.clone());
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum NotifyError {
    TooManySubscriptions(usize),
    Encode(String),
    Unavailable(String),
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::TooManySubscriptions(max) => {
                write!(f, "subscription limit of {max} reached")
            }
            NotifyError::Encode(e) => write!(f, "cannot encode notice: {e}"),
            NotifyError::Unavailable(e) => write!(f, "notification channel unavailable: {e}"),
        }
    }
}

impl std::error::Error for NotifyError {}
