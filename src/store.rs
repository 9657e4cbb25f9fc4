//! # Session Summary Storage Module
//!
//! Persists finished sessions. The engine only ever calls `save`; `query` is
//! for history screens and reports.
//!
//! ## Architecture
//! - **SessionStore**: trait the engine holds as `Arc<dyn SessionStore>`
//! - **MemorySessionStore**: bounded LRU of recent sessions, nothing on disk
//! - **JsonlSessionStore**: one JSON object per line, appended on save
//! - **BackgroundStore**: wraps another store behind a writer thread so a
//!   slow disk never holds up the caller
//!
//! ## File Format
//! ```text
//! sessions.jsonl
//! {"started_at":"2024-05-01T07:00:00Z", ... ,"total_reps":12, ...}
//! {"started_at":"2024-05-02T07:05:10Z", ... ,"total_reps":30, ...}
//! ```

use crate::error::StoreError;
use crate::session::SessionSummary;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use lru::LruCache;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

pub trait SessionStore: Send + Sync {
    fn save(&self, summary: &SessionSummary) -> Result<(), StoreError>;

    /// Up to `limit` stored sessions, newest first
    fn query(&self, limit: usize) -> Result<Vec<SessionSummary>, StoreError>;
}

/// Keeps the most recent sessions in memory
pub struct MemorySessionStore {
    sessions: Mutex<MemoryState>,
}

struct MemoryState {
    cache: LruCache<u64, SessionSummary>,
    next_id: u64,
}

impl MemorySessionStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Mutex::new(MemoryState {
                cache: LruCache::new(capacity),
                next_id: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, summary: &SessionSummary) -> Result<(), StoreError> {
        let mut state = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let id = state.next_id;
        state.next_id += 1;
        if let Some((evicted, _)) = state.cache.push(id, summary.clone()) {
            if evicted != id {
                log::debug!("Session store full, dropped session #{}", evicted);
            }
        }
        Ok(())
    }

    fn query(&self, limit: usize) -> Result<Vec<SessionSummary>, StoreError> {
        let state = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        // Iteration runs most-recently-used first, and entries are never touched after insert.
        Ok(state.cache.iter().take(limit).map(|(_, s)| s.clone()).collect())
    }
}

/// Appends each session as one JSON line
pub struct JsonlSessionStore {
    path: PathBuf,
    file_lock: Mutex<()>,
}

impl JsonlSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let summary = serde_json::from_str(&line).map_err(|source| StoreError::CorruptRecord {
                line: index + 1,
                source,
            })?;
            sessions.push(summary);
        }
        Ok(sessions)
    }
}

impl SessionStore for JsonlSessionStore {
    fn save(&self, summary: &SessionSummary) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(summary)?;
        line.push('\n');

        let _guard = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        log::debug!("Appended session to {}", self.path.display());
        Ok(())
    }

    fn query(&self, limit: usize) -> Result<Vec<SessionSummary>, StoreError> {
        let _guard = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let sessions = self.read_all()?;
        Ok(sessions.into_iter().rev().take(limit).collect())
    }
}

/// Request sent from callers to the writer thread
enum StoreCommand {
    Save(Box<SessionSummary>),
    /// Answered after every save queued before it has been written
    Query {
        limit: usize,
        reply: Sender<Result<Vec<SessionSummary>, StoreError>>,
    },
    Flush(Sender<()>),
    Stop,
}

/// Runs another store on a dedicated writer thread.
///
/// `save` only queues; write failures are logged by the writer thread.
pub struct BackgroundStore {
    command_tx: Sender<StoreCommand>,
    writer_thread: Option<thread::JoinHandle<()>>,
}

impl BackgroundStore {
    pub fn new(inner: Arc<dyn SessionStore>) -> Self {
        let (command_tx, command_rx) = unbounded();

        let writer_thread = thread::Builder::new()
            .name("session-store".into())
            .spawn(move || Self::writer_loop(command_rx, inner));

        let writer_thread = match writer_thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Failed to spawn session store writer: {}", e);
                None
            }
        };

        Self {
            command_tx,
            writer_thread,
        }
    }

    /// Block until everything queued so far has been written
    pub fn flush(&self) -> Result<(), StoreError> {
        let (reply, done) = bounded(1);
        self.command_tx
            .send(StoreCommand::Flush(reply))
            .map_err(|_| StoreError::WriterClosed)?;
        done.recv().map_err(|_| StoreError::WriterClosed)
    }

    fn writer_loop(command_rx: Receiver<StoreCommand>, inner: Arc<dyn SessionStore>) {
        loop {
            match command_rx.recv() {
                Ok(StoreCommand::Save(summary)) => {
                    if let Err(e) = inner.save(&summary) {
                        log::error!("Failed to save session summary: {}", e);
                    }
                }
                Ok(StoreCommand::Query { limit, reply }) => {
                    let _ = reply.send(inner.query(limit));
                }
                Ok(StoreCommand::Flush(reply)) => {
                    let _ = reply.send(());
                }
                Ok(StoreCommand::Stop) => {
                    log::debug!("Session store writer stopped");
                    break;
                }
                Err(_) => {
                    log::debug!("Session store writer: command channel closed");
                    break;
                }
            }
        }
    }
}

impl SessionStore for BackgroundStore {
    fn save(&self, summary: &SessionSummary) -> Result<(), StoreError> {
        if self.writer_thread.is_none() {
            return Err(StoreError::WriterClosed);
        }
        self.command_tx
            .send(StoreCommand::Save(Box::new(summary.clone())))
            .map_err(|_| StoreError::WriterClosed)
    }

    fn query(&self, limit: usize) -> Result<Vec<SessionSummary>, StoreError> {
        if self.writer_thread.is_none() {
            return Err(StoreError::WriterClosed);
        }
        let (reply, response) = bounded(1);
        self.command_tx
            .send(StoreCommand::Query { limit, reply })
            .map_err(|_| StoreError::WriterClosed)?;
        response.recv().map_err(|_| StoreError::WriterClosed)?
    }
}

impl Drop for BackgroundStore {
    fn drop(&mut self) {
        // Pending saves are ahead of Stop in the queue and get written first.
        let _ = self.command_tx.send(StoreCommand::Stop);

        if let Some(handle) = self.writer_thread.take() {
            let _ = handle.join();
        }
    }
}
