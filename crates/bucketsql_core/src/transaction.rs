//! Transactions.
//!
//! A transaction owns the database connection for its whole lifetime and
//! maps one-to-one onto a backend transaction. Read-write transactions take
//! the write lock up front (`BEGIN IMMEDIATE`), so bucket creation cannot
//! race another writer between probing the catalog and inserting into it.

use crate::bucket::{self, Bucket, TxScope};
use crate::catalog::{Catalog, CatalogEntry, CatalogIssue};
use crate::error::{CoreError, CoreResult, StorageContext};
use bucketsql_codec::BucketId;
use parking_lot::MutexGuard;
use rusqlite::Connection;
use std::cell::RefCell;
use std::fmt;
use tracing::{debug, warn};

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is open and can perform operations.
    Open,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back.
    RolledBack,
}

/// Access mode requested when beginning a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Reads only. Every mutation fails with [`CoreError::InvalidState`].
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

type Callback<'db> = Box<dyn FnOnce() + 'db>;

/// One atomic unit of work.
///
/// Buckets opened on a transaction borrow it, so it cannot be committed or
/// rolled back while any of them is still in use. Dropping a transaction that
/// is still open rolls it back.
pub struct Transaction<'db> {
    conn: MutexGuard<'db, Connection>,
    mode: TxMode,
    state: TransactionState,
    scan_batch_size: usize,
    on_commit: RefCell<Vec<Callback<'db>>>,
}

impl<'db> Transaction<'db> {
    /// Starts a backend transaction on the locked connection.
    pub(crate) fn begin(
        conn: MutexGuard<'db, Connection>,
        mode: TxMode,
        scan_batch_size: usize,
    ) -> CoreResult<Self> {
        let begin = match mode {
            TxMode::ReadOnly => "PRAGMA query_only = ON; BEGIN DEFERRED",
            TxMode::ReadWrite => "BEGIN IMMEDIATE",
        };
        if let Err(err) = conn.execute_batch(begin) {
            if mode == TxMode::ReadOnly {
                if let Err(reset) = conn.execute_batch("PRAGMA query_only = OFF") {
                    warn!(error = %reset, "failed to lift query_only after a failed begin");
                }
            }
            return Err(CoreError::storage("beginning a transaction", err));
        }
        debug!(?mode, "transaction started");

        Ok(Self {
            conn,
            mode,
            state: TransactionState::Open,
            scan_batch_size,
            on_commit: RefCell::new(Vec::new()),
        })
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns the access mode.
    #[must_use]
    pub fn mode(&self) -> TxMode {
        self.mode
    }

    /// Returns true if this transaction may mutate.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.mode == TxMode::ReadWrite
    }

    fn ensure_open(&self) -> CoreResult<()> {
        match self.state {
            TransactionState::Open => Ok(()),
            TransactionState::Committed => {
                Err(CoreError::invalid_state("transaction already committed"))
            }
            TransactionState::RolledBack => {
                Err(CoreError::invalid_state("transaction already rolled back"))
            }
        }
    }

    fn scope(&self) -> CoreResult<TxScope<'_>> {
        self.ensure_open()?;
        Ok(TxScope {
            conn: &self.conn,
            writable: self.is_writable(),
            scan_batch_size: self.scan_batch_size,
        })
    }

    // ------------------------------------------------------------------
    // Top-level buckets
    // ------------------------------------------------------------------

    /// Creates the top-level bucket `key`.
    ///
    /// Fails with [`CoreError::AlreadyExists`] if it is already there.
    pub fn create_top_level_bucket(&self, key: &[u8]) -> CoreResult<Bucket<'_>> {
        bucket::create(self.scope()?, BucketId::root(key))
    }

    /// Opens the top-level bucket `key`, creating it if needed.
    pub fn create_top_level_bucket_if_not_exists(&self, key: &[u8]) -> CoreResult<Bucket<'_>> {
        bucket::create_if_not_exists(self.scope()?, BucketId::root(key))
    }

    /// Deletes the top-level bucket `key` and everything nested below it.
    pub fn delete_top_level_bucket(&self, key: &[u8]) -> CoreResult<()> {
        bucket::destroy(self.scope()?, &BucketId::root(key))
    }

    /// Opens a read-only view of the top-level bucket `key`.
    ///
    /// Returns `None` if it does not exist.
    pub fn read_bucket(&self, key: &[u8]) -> CoreResult<Option<Bucket<'_>>> {
        bucket::open(self.scope()?.read_only(), BucketId::root(key))
    }

    /// Opens the top-level bucket `key` for writing.
    ///
    /// `key` is always a literal bucket name; the empty key names the
    /// zero-length top-level bucket. Returns `None` if it does not exist.
    pub fn read_write_bucket(&self, key: &[u8]) -> CoreResult<Option<Bucket<'_>>> {
        let scope = self.scope()?;
        scope.ensure_writable()?;
        bucket::open(scope, BucketId::root(key))
    }

    /// Returns every catalog entry, ordered by identifier.
    pub fn catalog_entries(&self) -> CoreResult<Vec<CatalogEntry>> {
        Catalog::new(self.scope()?.conn).entries()
    }

    /// Compares the catalog against the tables that actually exist.
    pub fn check_consistency(&self) -> CoreResult<Vec<CatalogIssue>> {
        Catalog::new(self.scope()?.conn).check_consistency()
    }

    // ------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------

    /// Registers `callback` to run once after a successful commit.
    ///
    /// Callbacks run in registration order. They are discarded, never run, if
    /// the transaction is rolled back or dropped.
    pub fn on_commit<F>(&self, callback: F) -> CoreResult<()>
    where
        F: FnOnce() + 'db,
    {
        self.ensure_open()?;
        self.on_commit.borrow_mut().push(Box::new(callback));
        Ok(())
    }

    /// Commits the transaction, then runs the registered callbacks.
    ///
    /// If the backend refuses the commit the transaction stays open and can
    /// still be rolled back.
    pub fn commit(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        self.conn
            .execute_batch("COMMIT")
            .storage_context(|| "committing a transaction")?;
        self.finish(TransactionState::Committed);
        debug!(mode = ?self.mode, "transaction committed");

        let callbacks = std::mem::take(self.on_commit.get_mut());
        for callback in callbacks {
            callback();
        }
        Ok(())
    }

    /// Rolls back every change made in the transaction.
    ///
    /// Buckets created or deleted in it are restored along with their data.
    pub fn rollback(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        self.conn
            .execute_batch("ROLLBACK")
            .storage_context(|| "rolling back a transaction")?;
        self.finish(TransactionState::RolledBack);
        debug!(mode = ?self.mode, "transaction rolled back");
        Ok(())
    }

    fn finish(&mut self, state: TransactionState) {
        self.state = state;
        if state == TransactionState::RolledBack {
            self.on_commit.get_mut().clear();
        }
        if self.mode == TxMode::ReadOnly {
            if let Err(err) = self.conn.execute_batch("PRAGMA query_only = OFF") {
                warn!(error = %err, "failed to lift query_only after a read transaction");
            }
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state != TransactionState::Open {
            return;
        }
        match self.conn.execute_batch("ROLLBACK") {
            Ok(()) => {
                if self.mode == TxMode::ReadWrite {
                    warn!("read-write transaction dropped without commit, rolled back");
                } else {
                    debug!("read transaction dropped, rolled back");
                }
            }
            Err(err) => warn!(error = %err, "implicit rollback failed"),
        }
        self.finish(TransactionState::RolledBack);
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("pending_callbacks", &self.on_commit.borrow().len())
            .finish()
    }
}
