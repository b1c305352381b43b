mod conflict;
mod error;
mod mutations;
mod queries;
mod slots;
mod store;

pub use error::EngineError;
pub use slots::{OverlapRule, find_overlap, generate_slots, weekly_view};
pub use store::InMemoryStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDateTime;
use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::*;
use crate::notify::{NotificationSink, Notice};
use crate::wal::Wal;

use store::event_agent_id;

pub type SharedAgentState = Arc<RwLock<AgentState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// Blocks for the first append, drains whatever else is already queued,
/// then buffers the batch and fsyncs once for all of it.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    // Commit what we have before compacting or reporting.
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        commit_batch(&mut wal, &mut batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();

    let mut result = Ok(());
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    // Always flush, even after an append error, so half-written bytes
    // never leak into the next batch.
    let flushed = wal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Availability and booking core: agents' working hours, their booking
/// ledgers, slot generation and admission control.
pub struct Engine {
    pub store: InMemoryStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold the read side from lock to apply; compaction takes the
    /// write side so its snapshot and the log swap see no appends in between.
    pub(super) compaction_gate: RwLock<()>,
    /// Serializes agent creation so the existence check and insert agree.
    pub(super) create_lock: Mutex<()>,
    notify: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    overlap: OverlapRule,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer task.
    /// Must be called inside a tokio runtime.
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        overlap: OverlapRule,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: InMemoryStore::new(),
            wal_tx,
            compaction_gate: RwLock::new(()),
            create_lock: Mutex::new(()),
            notify,
            clock,
            overlap,
        };

        // We're the sole owner of these Arcs during replay, so try_write always
        // succeeds. Never use blocking_write here: we run inside a runtime.
        for event in &events {
            match event {
                Event::AgentCreated { id, name, default_duration } => {
                    let agent = AgentState::new(*id, name.clone(), *default_duration);
                    engine.store.insert_agent(*id, Arc::new(RwLock::new(agent)));
                }
                Event::AgentDeleted { id } => {
                    if let Some((_, agent)) = engine.store.remove_agent(id)
                        && let Ok(guard) = agent.try_read()
                    {
                        engine.store.unmap_agent_bookings(&guard);
                    }
                }
                other => {
                    if let Some(agent_id) = event_agent_id(other)
                        && let Some(agent) = engine.store.get_agent(&agent_id)
                        && let Ok(mut guard) = agent.try_write()
                    {
                        engine.store.apply_event(&mut guard, other);
                    }
                }
            }
        }

        tracing::info!(
            "replayed {} events: {} agents",
            events.len(),
            engine.store.agent_count()
        );
        Ok(engine)
    }

    pub fn overlap_rule(&self) -> OverlapRule {
        self.overlap
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_agent(&self, id: &Ulid) -> Option<SharedAgentState> {
        self.store.get_agent(id)
    }

    /// Durably log then apply. Nothing is applied if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        agent: &mut AgentState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_event(agent, event);
        Ok(())
    }

    /// Best-effort: a failed notification is logged and dropped.
    pub(super) fn publish(&self, notice: Notice) {
        if let Err(e) = self.notify.publish(&notice) {
            tracing::warn!("notification for agent {} dropped: {e}", notice.agent_id());
            metrics::counter!(crate::observability::NOTIFICATIONS_DROPPED_TOTAL).increment(1);
        }
    }

    /// Acquire an agent's write lock. Fails with `NotFound` if the agent was
    /// deleted (or replaced) while we waited for the lock.
    pub(super) async fn lock_agent(
        &self,
        agent_id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<AgentState>, EngineError> {
        let agent = self
            .get_agent(&agent_id)
            .ok_or(EngineError::NotFound(agent_id))?;
        let guard = agent.clone().write_owned().await;
        match self.get_agent(&agent_id) {
            Some(current) if Arc::ptr_eq(&current, &agent) => Ok(guard),
            _ => Err(EngineError::NotFound(agent_id)),
        }
    }

    /// Lookup booking → agent, acquire that agent's write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, OwnedRwLockWriteGuard<AgentState>), EngineError> {
        let agent_id = self
            .store
            .agent_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let guard = self.lock_agent(agent_id).await?;
        Ok((agent_id, guard))
    }
}
