//! Background journaling of keypress batches.
//!
//! The session tracker hands batches over a channel; a worker thread owning its own store
//! handle writes them in arrival order. If the process dies mid-session the journal holds
//! everything but the last partial batch, and [`recover`] rebuilds the record at next start.

use crate::metrics::KeypressEvent;
use crate::session::SessionRecord;
use crate::store::{encode, load, Store, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use tracing::{debug, warn};

pub const ACTIVE_SESSION_KEY: &str = "session/active";

pub fn batch_key(session_id: &str, seq: usize) -> String {
    format!("session/{session_id}/keypresses/{seq:05}")
}

/// Marker written when a session starts and removed when it finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub session_id: String,
    pub content_id: String,
    pub started_at_ms: i64,
}

enum JournalCommand {
    Begin(ActiveSession),
    Append {
        session_id: String,
        seq: usize,
        batch: Vec<KeypressEvent>,
    },
    Finish {
        session_id: String,
        batches: usize,
    },
    Flush(Sender<usize>),
}

enum Write {
    Put(String, Value),
    Delete(String),
}

impl Write {
    fn apply(&self, store: &dyn Store) -> Result<(), StoreError> {
        match self {
            Write::Put(key, value) => store.put(key, value),
            Write::Delete(key) => store.delete(key),
        }
    }
}

struct Worker {
    store: Box<dyn Store + Send>,
    retry: VecDeque<Write>,
}

impl Worker {
    fn run(mut self, rx: mpsc::Receiver<JournalCommand>) {
        for command in rx {
            self.retry_pending();
            match command {
                JournalCommand::Begin(active) => match encode(ACTIVE_SESSION_KEY, &active) {
                    Ok(value) => self.write(Write::Put(ACTIVE_SESSION_KEY.to_string(), value)),
                    Err(err) => warn!(error = %err, "could not encode active session marker"),
                },
                JournalCommand::Append {
                    session_id,
                    seq,
                    batch,
                } => {
                    let key = batch_key(&session_id, seq);
                    match encode(&key, &batch) {
                        Ok(value) => self.write(Write::Put(key, value)),
                        Err(err) => warn!(error = %err, "could not encode keypress batch"),
                    }
                }
                JournalCommand::Finish {
                    session_id,
                    batches,
                } => {
                    for seq in 0..batches {
                        self.write(Write::Delete(batch_key(&session_id, seq)));
                    }
                    self.write(Write::Delete(ACTIVE_SESSION_KEY.to_string()));
                }
                JournalCommand::Flush(reply) => {
                    let _ = reply.send(self.retry.len());
                }
            }
        }
        debug!(pending = self.retry.len(), "journal worker stopped");
    }

    fn write(&mut self, write: Write) {
        if !self.retry.is_empty() {
            self.retry.push_back(write);
            return;
        }
        if let Err(err) = write.apply(self.store.as_ref()) {
            warn!(error = %err, "journal write failed, will retry");
            self.retry.push_back(write);
        }
    }

    fn retry_pending(&mut self) {
        while let Some(write) = self.retry.front() {
            if write.apply(self.store.as_ref()).is_err() {
                return;
            }
            self.retry.pop_front();
        }
    }
}

/// Handle to the journal worker thread. Dropping it drains the queue and joins the worker.
pub struct BatchJournal {
    tx: Option<Sender<JournalCommand>>,
    worker: Option<JoinHandle<()>>,
}

impl BatchJournal {
    pub fn spawn(store: Box<dyn Store + Send>) -> Self {
        let (tx, rx) = mpsc::channel();
        let worker = Worker {
            store,
            retry: VecDeque::new(),
        };
        let handle = std::thread::spawn(move || worker.run(rx));
        Self {
            tx: Some(tx),
            worker: Some(handle),
        }
    }

    fn send(&self, command: JournalCommand) {
        let delivered = self
            .tx
            .as_ref()
            .map(|tx| tx.send(command).is_ok())
            .unwrap_or(false);
        if !delivered {
            warn!("journal worker is gone, keypresses are only kept in memory");
        }
    }

    pub fn begin(&self, active: ActiveSession) {
        self.send(JournalCommand::Begin(active));
    }

    pub fn append(&self, session_id: &str, seq: usize, batch: Vec<KeypressEvent>) {
        self.send(JournalCommand::Append {
            session_id: session_id.to_string(),
            seq,
            batch,
        });
    }

    pub fn finish(&self, session_id: &str, batches: usize) {
        self.send(JournalCommand::Finish {
            session_id: session_id.to_string(),
            batches,
        });
    }

    /// Block until every command sent so far has been processed. Returns the number of
    /// writes still waiting for a retry.
    pub fn flush(&self) -> usize {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(JournalCommand::Flush(reply_tx));
        reply_rx.recv().unwrap_or_default()
    }
}

impl Drop for BatchJournal {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("journal worker panicked");
            }
        }
    }
}

/// Rebuild a session interrupted before it ended, from the active marker and its batches.
pub fn recover(store: &dyn Store) -> Result<Option<(SessionRecord, usize)>, StoreError> {
    let Some(active) = load::<ActiveSession>(store, ACTIVE_SESSION_KEY)? else {
        return Ok(None);
    };

    let mut keypresses = Vec::new();
    let mut batches = 0;
    while let Some(batch) =
        load::<Vec<KeypressEvent>>(store, &batch_key(&active.session_id, batches))?
    {
        keypresses.extend(batch);
        batches += 1;
    }

    let record = SessionRecord {
        id: active.session_id,
        content_id: active.content_id,
        started_at_ms: active.started_at_ms,
        ended_at_ms: keypresses.last().map(|k| k.timestamp_ms),
        keypresses,
    };
    Ok(Some((record, batches)))
}

/// Remove the journal entries of a recovered session.
pub fn clear(store: &dyn Store, session_id: &str, batches: usize) -> Result<(), StoreError> {
    for seq in 0..batches {
        store.delete(&batch_key(session_id, seq))?;
    }
    store.delete(ACTIVE_SESSION_KEY)
}
