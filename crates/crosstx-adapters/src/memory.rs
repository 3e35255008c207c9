//! In-memory backends for tests and local experiments.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use crosstx_core::{Row, StoreError, StoreResult};
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::traits::{AppendOnlyStore, RelationalBackend, RelationalSession};

#[derive(Default)]
struct RelationalState {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    fail_open: AtomicBool,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
    commit_delay: Mutex<Option<Duration>>,
    sessions_opened: AtomicUsize,
}

/// Relational store whose sessions stage writes until commit.
#[derive(Clone, Default)]
pub struct InMemoryRelationalBackend {
    state: Arc<RelationalState>,
}

impl InMemoryRelationalBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_commit(&self, fail: bool) {
        self.state.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_rollback(&self, fail: bool) {
        self.state.fail_rollback.store(fail, Ordering::SeqCst);
    }

    /// Make every later commit take at least `delay`.
    pub fn set_commit_delay(&self, delay: Duration) {
        *self.state.commit_delay.lock() = Some(delay);
    }

    /// Committed rows of `table`.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .tables
            .lock()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn sessions_opened(&self) -> usize {
        self.state.sessions_opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelationalBackend for InMemoryRelationalBackend {
    type Session = InMemoryRelationalSession;

    async fn open_session(&self) -> StoreResult<Self::Session> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(StoreError::Relational("connection refused".to_string()));
        }
        self.state.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(InMemoryRelationalSession {
            state: Arc::clone(&self.state),
            staged: Vec::new(),
            in_transaction: false,
        })
    }
}

pub struct InMemoryRelationalSession {
    state: Arc<RelationalState>,
    staged: Vec<(String, Row)>,
    in_transaction: bool,
}

impl InMemoryRelationalSession {
    /// Stage a row for `table`; visible to readers only after commit.
    pub fn insert(&mut self, table: &str, row: Row) {
        self.staged.push((table.to_string(), row));
    }

    #[must_use]
    pub fn staged_rows(&self) -> usize {
        self.staged.len()
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

#[async_trait]
impl RelationalSession for InMemoryRelationalSession {
    async fn begin(&mut self) -> StoreResult<()> {
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let delay = *self.state.commit_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_commit.load(Ordering::SeqCst) {
            return Err(StoreError::Relational("commit rejected".to_string()));
        }
        let mut tables = self.state.tables.lock();
        for (table, row) in self.staged.drain(..) {
            tables.entry(table).or_default().push(row);
        }
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        if self.state.fail_rollback.load(Ordering::SeqCst) {
            return Err(StoreError::Relational("rollback rejected".to_string()));
        }
        self.staged.clear();
        self.in_transaction = false;
        Ok(())
    }
}

#[derive(Default)]
struct AppendOnlyState {
    streams: Mutex<IndexMap<String, Vec<Row>>>,
    failing_streams: Mutex<HashSet<String>>,
    batches: AtomicUsize,
}

/// Append-only store that keeps every accepted row in memory.
#[derive(Clone, Default)]
pub struct InMemoryAppendOnlyStore {
    state: Arc<AppendOnlyState>,
}

impl InMemoryAppendOnlyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every later write to `stream`.
    pub fn fail_stream(&self, stream: &str) {
        self.state.failing_streams.lock().insert(stream.to_string());
    }

    pub fn heal_stream(&self, stream: &str) {
        self.state.failing_streams.lock().remove(stream);
    }

    #[must_use]
    pub fn rows(&self, stream: &str) -> Vec<Row> {
        self.state
            .streams
            .lock()
            .get(stream)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn stream_names(&self) -> Vec<String> {
        self.state.streams.lock().keys().cloned().collect()
    }

    /// Number of accepted insert batches.
    #[must_use]
    pub fn batches(&self) -> usize {
        self.state.batches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AppendOnlyStore for InMemoryAppendOnlyStore {
    async fn insert(&self, stream: &str, rows: Vec<Row>) -> StoreResult<()> {
        if self.state.failing_streams.lock().contains(stream) {
            return Err(StoreError::AppendOnly {
                stream: stream.to_string(),
                message: "stream unavailable".to_string(),
            });
        }
        self.state
            .streams
            .lock()
            .entry(stream.to_string())
            .or_default()
            .extend(rows);
        self.state.batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
