//! Audit trail: a background listener that records every published user event.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use pktracker_events::{EventBus, EventEnvelope, Subscription};

/// Entries kept before the oldest are dropped.
pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub event_id: Uuid,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub sequence_number: u64,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl From<EventEnvelope<JsonValue>> for AuditEntry {
    fn from(env: EventEnvelope<JsonValue>) -> Self {
        Self {
            event_id: env.event_id(),
            event_type: env.event_type().to_string(),
            aggregate_type: env.aggregate_type().to_string(),
            aggregate_id: env.aggregate_id(),
            sequence_number: env.sequence_number(),
            occurred_at: env.occurred_at(),
            payload: env.into_payload(),
        }
    }
}

/// Bounded, shared log of audit entries.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    entries: Arc<Mutex<VecDeque<AuditEntry>>>,
    capacity: usize,
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, entry: AuditEntry) {
        tracing::info!(
            target: "audit",
            event_type = %entry.event_type,
            aggregate_id = %entry.aggregate_id,
            sequence = entry.sequence_number,
            "audit event recorded"
        );

        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Latest `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to stop and join the audit worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request shutdown and wait for the worker thread to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

#[derive(Debug)]
pub struct AuditWorker;

impl AuditWorker {
    /// Subscribe to `bus` and record every envelope into `trail` on a
    /// dedicated thread. Only messages published after this call are seen.
    pub fn spawn<B>(bus: &B, trail: AuditTrail) -> std::io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<JsonValue>>,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();

        let join = thread::Builder::new()
            .name("audit-trail".to_string())
            .spawn(move || worker_loop(sub, shutdown_rx, trail))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop(sub: Subscription<EventEnvelope<JsonValue>>, shutdown_rx: mpsc::Receiver<()>, trail: AuditTrail) {
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(env) => trail.record(env.into()),
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::debug!("audit worker stopped");
}
