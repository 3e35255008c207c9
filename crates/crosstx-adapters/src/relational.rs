use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crosstx_core::{StoreResult, TransactionId};
use parking_lot::Mutex;
use tracing::debug;

use crate::traits::{RelationalBackend, RelationalSession};

/// A native session shared between the adapter and the caller issuing writes.
pub type SharedSession<S> = Arc<tokio::sync::Mutex<S>>;

/// Holds at most one open native session per transaction.
///
/// Every relational operation of a transaction runs inside that one native
/// transaction, so commit and rollback are all-or-nothing for them. The map
/// lock is never held while a session talks to the store.
pub struct RelationalStoreAdapter<R: RelationalBackend> {
    backend: R,
    sessions: Mutex<HashMap<TransactionId, SharedSession<R::Session>>>,
}

impl<R: RelationalBackend> RelationalStoreAdapter<R> {
    #[must_use]
    pub fn new(backend: R) -> Self {
        Self {
            backend,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &R {
        &self.backend
    }

    /// Open and begin the transaction's session unless it already has one.
    pub async fn begin_operation(
        &self,
        transaction_id: TransactionId,
    ) -> StoreResult<SharedSession<R::Session>> {
        if let Some(session) = self.session(transaction_id) {
            return Ok(session);
        }

        let mut session = self.backend.open_session().await?;
        session.begin().await?;
        debug!(transaction = %transaction_id, "opened native session");

        Ok(self.insert_session(transaction_id, Arc::new(tokio::sync::Mutex::new(session))))
    }

    fn insert_session(
        &self,
        transaction_id: TransactionId,
        session: SharedSession<R::Session>,
    ) -> SharedSession<R::Session> {
        match self.sessions.lock().entry(transaction_id) {
            Entry::Occupied(existing) => {
                debug!(
                    transaction = %transaction_id,
                    "session opened concurrently, dropping the duplicate"
                );
                Arc::clone(existing.get())
            }
            Entry::Vacant(slot) => Arc::clone(slot.insert(session)),
        }
    }

    #[must_use]
    pub fn session(&self, transaction_id: TransactionId) -> Option<SharedSession<R::Session>> {
        self.sessions.lock().get(&transaction_id).cloned()
    }

    #[must_use]
    pub fn has_session(&self, transaction_id: TransactionId) -> bool {
        self.sessions.lock().contains_key(&transaction_id)
    }

    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.sessions.lock().len()
    }

    fn take_session(&self, transaction_id: TransactionId) -> Option<SharedSession<R::Session>> {
        self.sessions.lock().remove(&transaction_id)
    }

    /// Commit the transaction's native session and close it.
    ///
    /// Returns `false` when the transaction never opened a session. A failed
    /// commit leaves the session open so it can still be rolled back.
    pub async fn commit(&self, transaction_id: TransactionId) -> StoreResult<bool> {
        let Some(session) = self.session(transaction_id) else {
            return Ok(false);
        };

        session.lock().await.commit().await?;
        self.take_session(transaction_id);
        debug!(transaction = %transaction_id, "committed native session");
        Ok(true)
    }

    /// Roll back the transaction's native session and close it.
    ///
    /// Returns `false` when the transaction has no open session. The session
    /// is closed whether or not the rollback succeeds.
    pub async fn rollback(&self, transaction_id: TransactionId) -> StoreResult<bool> {
        let Some(session) = self.take_session(transaction_id) else {
            return Ok(false);
        };

        session.lock().await.rollback().await?;
        debug!(transaction = %transaction_id, "rolled back native session");
        Ok(true)
    }

    /// Close the transaction's session without committing, if one is still open.
    pub fn release(&self, transaction_id: TransactionId) -> bool {
        let released = self.take_session(transaction_id).is_some();
        if released {
            debug!(transaction = %transaction_id, "released native session");
        }
        released
    }
}
