//! Bucket handles.

use crate::catalog::Catalog;
use crate::cursor::BucketCursor;
use crate::error::{CoreError, CoreResult, StorageContext};
use bucketsql_codec::{BucketId, BucketPath, TableName};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::VecDeque;
use std::fmt;
use tracing::warn;

/// What a transaction lends to the handles derived from it.
#[derive(Clone, Copy)]
pub(crate) struct TxScope<'tx> {
    pub(crate) conn: &'tx Connection,
    pub(crate) writable: bool,
    pub(crate) scan_batch_size: usize,
}

impl<'tx> TxScope<'tx> {
    pub(crate) fn catalog(&self) -> Catalog<'tx> {
        Catalog::new(self.conn)
    }

    pub(crate) fn read_only(self) -> Self {
        Self {
            writable: false,
            ..self
        }
    }

    pub(crate) fn ensure_writable(&self) -> CoreResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(CoreError::invalid_state("transaction is read-only"))
        }
    }
}

/// A key/value namespace inside an open transaction.
///
/// A `Bucket` is a view: it owns nothing persistent. Its catalog row and
/// table outlive it; the handle itself cannot outlive the transaction it was
/// opened on. Entries are kept in ascending byte order of their keys.
///
/// Handles opened through a read-only transaction, or through
/// [`Bucket::nested_read_bucket`], reject every mutation with
/// [`CoreError::InvalidState`].
///
/// Deleting a bucket does not invalidate handles already opened on it or on
/// its descendants; using one afterwards fails at the backend.
pub struct Bucket<'tx> {
    scope: TxScope<'tx>,
    id: BucketId,
    table: TableName,
}

impl<'tx> Bucket<'tx> {
    pub(crate) fn new(scope: TxScope<'tx>, id: BucketId, table: TableName) -> Self {
        Self { scope, id, table }
    }

    /// Returns the canonical identifier.
    #[must_use]
    pub fn id(&self) -> &BucketId {
        &self.id
    }

    /// Returns the decoded path from the root.
    #[must_use]
    pub fn path(&self) -> BucketPath {
        self.id.to_path()
    }

    /// Returns the physical table backing this bucket.
    #[must_use]
    pub fn table_name(&self) -> &TableName {
        &self.table
    }

    /// Returns true if this handle may mutate.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.scope.writable
    }

    /// Returns a read-only view of the same bucket.
    #[must_use]
    pub fn read_only(&self) -> Bucket<'tx> {
        Bucket::new(self.scope.read_only(), self.id.clone(), self.table.clone())
    }

    // ------------------------------------------------------------------
    // Key/value access
    // ------------------------------------------------------------------

    /// Returns the value stored under `key`.
    ///
    /// Lookups never fail: a backend error is logged and reported as an
    /// absent key. Use [`Bucket::try_get`] when the difference matters.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.try_get(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(bucket = %self.id, error = %err, "get failed, treating key as absent");
                None
            }
        }
    }

    /// Returns the value stored under `key`, propagating backend errors.
    pub fn try_get(&self, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        self.scope
            .conn
            .prepare_cached(&format!(
                "SELECT val FROM {} WHERE key = ?1",
                self.table.quoted()
            ))
            .and_then(|mut stmt| stmt.query_row(params![key], |row| row.get(0)).optional())
            .storage_context(|| format!("reading from {}", self.id))
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&self, key: &[u8], value: &[u8]) -> CoreResult<()> {
        self.scope.ensure_writable()?;
        self.scope
            .conn
            .prepare_cached(&format!(
                "INSERT INTO {} (key, val) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET val = excluded.val",
                self.table.quoted()
            ))
            .and_then(|mut stmt| stmt.execute(params![key, value]))
            .storage_context(|| format!("writing to {}", self.id))?;
        Ok(())
    }

    /// Removes `key`. Removing an absent key succeeds.
    pub fn delete(&self, key: &[u8]) -> CoreResult<()> {
        self.scope.ensure_writable()?;
        self.scope
            .conn
            .prepare_cached(&format!("DELETE FROM {} WHERE key = ?1", self.table.quoted()))
            .and_then(|mut stmt| stmt.execute(params![key]))
            .storage_context(|| format!("deleting from {}", self.id))?;
        Ok(())
    }

    /// Returns the number of entries.
    pub fn len(&self) -> CoreResult<u64> {
        let count: i64 = self
            .scope
            .conn
            .prepare_cached(&format!("SELECT count(*) FROM {}", self.table.quoted()))
            .and_then(|mut stmt| stmt.query_row([], |row| row.get(0)))
            .storage_context(|| format!("counting entries of {}", self.id))?;
        Ok(count as u64)
    }

    /// Returns true if the bucket holds no entries.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }

    // ------------------------------------------------------------------
    // Nested buckets
    // ------------------------------------------------------------------

    /// Opens the nested bucket `key` with this handle's access mode.
    ///
    /// Never creates; returns `None` if the bucket does not exist.
    pub fn nested_bucket(&self, key: &[u8]) -> CoreResult<Option<Bucket<'tx>>> {
        open(self.scope, self.id.child(key))
    }

    /// Opens a read-only view of the nested bucket `key`.
    pub fn nested_read_bucket(&self, key: &[u8]) -> CoreResult<Option<Bucket<'tx>>> {
        open(self.scope.read_only(), self.id.child(key))
    }

    /// Opens the nested bucket `key` for writing.
    ///
    /// Fails with [`CoreError::InvalidState`] on a read-only handle.
    pub fn nested_read_write_bucket(&self, key: &[u8]) -> CoreResult<Option<Bucket<'tx>>> {
        self.scope.ensure_writable()?;
        open(self.scope, self.id.child(key))
    }

    /// Creates the nested bucket `key`.
    ///
    /// Fails with [`CoreError::AlreadyExists`] if it is already there.
    pub fn create_bucket(&self, key: &[u8]) -> CoreResult<Bucket<'tx>> {
        create(self.scope, self.id.child(key))
    }

    /// Opens the nested bucket `key`, creating it if needed.
    pub fn create_bucket_if_not_exists(&self, key: &[u8]) -> CoreResult<Bucket<'tx>> {
        create_if_not_exists(self.scope, self.id.child(key))
    }

    /// Deletes the nested bucket `key` and everything nested below it.
    ///
    /// Fails with [`CoreError::NotFound`] if it does not exist. Siblings are
    /// untouched.
    pub fn delete_nested_bucket(&self, key: &[u8]) -> CoreResult<()> {
        destroy(self.scope, &self.id.child(key))
    }

    // ------------------------------------------------------------------
    // Sequence
    // ------------------------------------------------------------------

    /// Returns the current sequence value.
    pub fn sequence(&self) -> CoreResult<u64> {
        self.scope.catalog().sequence(&self.id)
    }

    /// Overwrites the sequence value.
    pub fn set_sequence(&self, value: u64) -> CoreResult<()> {
        self.scope.ensure_writable()?;
        self.scope.catalog().set_sequence(&self.id, value)
    }

    /// Increments the sequence and returns the new value.
    pub fn next_sequence(&self) -> CoreResult<u64> {
        self.scope.ensure_writable()?;
        self.scope.catalog().next_sequence(&self.id)
    }

    // ------------------------------------------------------------------
    // Iteration
    // ------------------------------------------------------------------

    /// Returns a lazy iterator over all entries in ascending key order.
    #[must_use]
    pub fn iter(&self) -> BucketIter<'tx> {
        BucketIter::new(self.scope, self.id.clone(), self.table.clone(), None)
    }

    /// Returns a lazy iterator over the entries with keys `>= start`.
    #[must_use]
    pub fn iter_from(&self, start: &[u8]) -> BucketIter<'tx> {
        BucketIter::new(
            self.scope,
            self.id.clone(),
            self.table.clone(),
            Some(start.to_vec()),
        )
    }

    /// Calls `f` with every entry in ascending key order.
    ///
    /// Stops at the first error from `f` and returns it; no further entries
    /// are visited.
    pub fn for_each<E, F>(&self, f: F) -> Result<(), E>
    where
        E: From<CoreError>,
        F: FnMut(&[u8], &[u8]) -> Result<(), E>,
    {
        drive(self.iter(), f)
    }

    /// Like [`Bucket::for_each`], starting at the first key `>= start`.
    ///
    /// An empty `start` visits every entry.
    pub fn for_each_beginning_with<E, F>(&self, start: &[u8], f: F) -> Result<(), E>
    where
        E: From<CoreError>,
        F: FnMut(&[u8], &[u8]) -> Result<(), E>,
    {
        drive(self.iter_from(start), f)
    }

    /// Returns a positioned cursor that cannot modify the bucket.
    #[must_use]
    pub fn read_cursor(&self) -> BucketCursor<'tx> {
        BucketCursor::new(self.scope.read_only(), self.id.clone(), self.table.clone())
    }

    /// Returns a positioned cursor that can delete entries.
    pub fn read_write_cursor(&self) -> CoreResult<BucketCursor<'tx>> {
        self.scope.ensure_writable()?;
        Ok(BucketCursor::new(
            self.scope,
            self.id.clone(),
            self.table.clone(),
        ))
    }
}

impl fmt::Debug for Bucket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("id", &self.id)
            .field("table", &self.table)
            .field("writable", &self.scope.writable)
            .finish()
    }
}

fn drive<E, F>(iter: BucketIter<'_>, mut f: F) -> Result<(), E>
where
    E: From<CoreError>,
    F: FnMut(&[u8], &[u8]) -> Result<(), E>,
{
    for entry in iter {
        let (key, value) = entry?;
        f(&key, &value)?;
    }
    Ok(())
}

pub(crate) fn open(scope: TxScope<'_>, id: BucketId) -> CoreResult<Option<Bucket<'_>>> {
    Ok(scope
        .catalog()
        .lookup(&id)?
        .map(|table| Bucket::new(scope, id, table)))
}

pub(crate) fn create(scope: TxScope<'_>, id: BucketId) -> CoreResult<Bucket<'_>> {
    scope.ensure_writable()?;
    let table = scope.catalog().create(&id)?;
    Ok(Bucket::new(scope, id, table))
}

pub(crate) fn create_if_not_exists(scope: TxScope<'_>, id: BucketId) -> CoreResult<Bucket<'_>> {
    scope.ensure_writable()?;
    let table = scope.catalog().create_if_not_exists(&id)?;
    Ok(Bucket::new(scope, id, table))
}

pub(crate) fn destroy(scope: TxScope<'_>, id: &BucketId) -> CoreResult<()> {
    scope.ensure_writable()?;
    scope.catalog().destroy(id)
}

/// Where the next page of an iteration starts.
enum Lower {
    Unbounded,
    Included(Vec<u8>),
    Excluded(Vec<u8>),
}

/// Forward, one-shot iterator over a bucket's entries.
///
/// Rows are fetched in pages keyed on the last key seen, so no statement is
/// held open between calls to `next` and the bucket may be modified while
/// iterating. Once an error is yielded the iterator is finished.
pub struct BucketIter<'tx> {
    scope: TxScope<'tx>,
    id: BucketId,
    table: TableName,
    lower: Lower,
    buffer: VecDeque<(Vec<u8>, Vec<u8>)>,
    done: bool,
}

impl<'tx> BucketIter<'tx> {
    fn new(scope: TxScope<'tx>, id: BucketId, table: TableName, start: Option<Vec<u8>>) -> Self {
        let lower = match start {
            Some(key) if !key.is_empty() => Lower::Included(key),
            _ => Lower::Unbounded,
        };
        Self {
            scope,
            id,
            table,
            lower,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    fn fetch_page(&mut self) -> CoreResult<()> {
        let (clause, bound) = match &self.lower {
            Lower::Unbounded => ("", None),
            Lower::Included(key) => ("WHERE key >= ?2", Some(key.as_slice())),
            Lower::Excluded(key) => ("WHERE key > ?2", Some(key.as_slice())),
        };
        let sql = format!(
            "SELECT key, val FROM {} {clause} ORDER BY key LIMIT ?1",
            self.table.quoted()
        );
        let limit = self.scope.scan_batch_size as i64;
        let id = &self.id;

        let mut stmt = self
            .scope
            .conn
            .prepare_cached(&sql)
            .storage_context(|| format!("scanning {id}"))?;
        let page = match bound {
            Some(key) => stmt
                .query_map(params![limit, key], read_entry)
                .and_then(|rows| rows.collect::<Result<VecDeque<_>, _>>()),
            None => stmt
                .query_map(params![limit], read_entry)
                .and_then(|rows| rows.collect::<Result<VecDeque<_>, _>>()),
        }
        .storage_context(|| format!("scanning {id}"))?;

        if page.len() < self.scope.scan_batch_size {
            self.done = true;
        }
        if let Some((last, _)) = page.back() {
            self.lower = Lower::Excluded(last.clone());
        }
        self.buffer = page;
        Ok(())
    }
}

pub(crate) fn read_entry(row: &Row<'_>) -> rusqlite::Result<(Vec<u8>, Vec<u8>)> {
    Ok((row.get(0)?, row.get(1)?))
}

impl Iterator for BucketIter<'_> {
    type Item = CoreResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(entry) = self.buffer.pop_front() {
            return Some(Ok(entry));
        }
        if self.done {
            return None;
        }
        if let Err(err) = self.fetch_page() {
            self.done = true;
            return Some(Err(err));
        }
        self.buffer.pop_front().map(Ok)
    }
}

impl std::iter::FusedIterator for BucketIter<'_> {}

impl fmt::Debug for BucketIter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketIter")
            .field("id", &self.id)
            .field("buffered", &self.buffer.len())
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Config, CoreError, Database, InMemoryBackend};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    /// Small pages so iteration crosses page boundaries.
    fn db() -> Database {
        let config = Config::default().scan_batch_size(2);
        Database::open_with_backend(config, Box::new(InMemoryBackend::new())).unwrap()
    }

    #[test]
    fn put_overwrites_and_delete_removes() {
        let db = db();
        let tx = db.begin_read_write_tx().unwrap();
        let bucket = tx.create_top_level_bucket(b"b").unwrap();

        bucket.put(b"k", b"v1").unwrap();
        bucket.put(b"k", b"v2").unwrap();
        assert_eq!(bucket.get(b"k"), Some(b"v2".to_vec()));

        bucket.delete(b"k").unwrap();
        assert_eq!(bucket.get(b"k"), None);
        bucket.delete(b"k").unwrap();
        assert!(bucket.is_empty().unwrap());
    }

    #[test]
    fn empty_key_and_value_are_stored() {
        let db = db();
        let tx = db.begin_read_write_tx().unwrap();
        let bucket = tx.create_top_level_bucket(b"b").unwrap();

        bucket.put(b"", b"").unwrap();
        assert_eq!(bucket.get(b""), Some(Vec::new()));
        assert_eq!(bucket.len().unwrap(), 1);
    }

    #[test]
    fn nested_create_twice_is_already_exists() {
        let db = db();
        let tx = db.begin_read_write_tx().unwrap();
        let parent = tx.create_top_level_bucket(b"p").unwrap();

        parent.create_bucket(b"c").unwrap();
        let err = parent.create_bucket(b"c").unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn create_if_not_exists_shares_table() {
        let db = db();
        let tx = db.begin_read_write_tx().unwrap();
        let parent = tx.create_top_level_bucket(b"p").unwrap();

        let first = parent.create_bucket_if_not_exists(b"c").unwrap();
        let second = parent.create_bucket_if_not_exists(b"c").unwrap();
        assert_eq!(first.table_name(), second.table_name());

        first.put(b"k", b"v").unwrap();
        assert_eq!(second.get(b"k"), Some(b"v".to_vec()));
    }

    #[test]
    fn nested_bucket_never_creates() {
        let db = db();
        let tx = db.begin_read_write_tx().unwrap();
        let parent = tx.create_top_level_bucket(b"p").unwrap();

        assert!(parent.nested_bucket(b"c").unwrap().is_none());
        assert!(parent.nested_read_bucket(b"c").unwrap().is_none());
        assert!(tx.catalog_entries().unwrap().len() == 1);
    }

    #[test]
    fn nested_read_bucket_is_read_only() {
        let db = db();
        let tx = db.begin_read_write_tx().unwrap();
        let parent = tx.create_top_level_bucket(b"p").unwrap();
        parent.create_bucket(b"c").unwrap();

        let child = parent.nested_read_bucket(b"c").unwrap().unwrap();
        assert!(!child.is_writable());
        assert!(matches!(
            child.put(b"k", b"v"),
            Err(CoreError::InvalidState { .. })
        ));
        assert!(child.read_write_cursor().is_err());
        assert!(parent.nested_bucket(b"c").unwrap().unwrap().is_writable());
    }

    #[test]
    fn nested_paths_are_distinct_from_lookalike_top_level() {
        let db = db();
        let tx = db.begin_read_write_tx().unwrap();
        let parent = tx.create_top_level_bucket(b"a").unwrap();
        let child = parent.create_bucket(b"b").unwrap();
        let flat = tx.create_top_level_bucket(b"ab").unwrap();

        child.put(b"k", b"nested").unwrap();
        flat.put(b"k", b"flat").unwrap();
        assert_eq!(child.path().segments().len(), 2);
        assert_eq!(child.get(b"k"), Some(b"nested".to_vec()));
        assert_eq!(flat.get(b"k"), Some(b"flat".to_vec()));
        assert_ne!(child.table_name(), flat.table_name());
    }

    #[test]
    fn delete_nested_bucket_missing_is_not_found() {
        let db = db();
        let tx = db.begin_read_write_tx().unwrap();
        let parent = tx.create_top_level_bucket(b"p").unwrap();
        let sibling = parent.create_bucket(b"s").unwrap();
        sibling.put(b"k", b"v").unwrap();

        let err = parent.delete_nested_bucket(b"missing").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(sibling.get(b"k"), Some(b"v".to_vec()));
        assert_eq!(tx.catalog_entries().unwrap().len(), 2);
    }

    #[test]
    fn delete_nested_bucket_removes_descendants() {
        let db = db();
        let tx = db.begin_read_write_tx().unwrap();
        let parent = tx.create_top_level_bucket(b"p").unwrap();
        let child = parent.create_bucket(b"c").unwrap();
        child.create_bucket(b"g").unwrap();
        parent.create_bucket(b"s").unwrap();

        parent.delete_nested_bucket(b"c").unwrap();
        assert!(parent.nested_bucket(b"c").unwrap().is_none());
        assert!(parent.nested_bucket(b"s").unwrap().is_some());
        assert_eq!(tx.catalog_entries().unwrap().len(), 2);
        assert!(tx.check_consistency().unwrap().is_empty());
    }

    #[test]
    fn next_sequence_is_consecutive() {
        let db = db();
        let tx = db.begin_read_write_tx().unwrap();
        let bucket = tx.create_top_level_bucket(b"b").unwrap();

        assert_eq!(bucket.sequence().unwrap(), 0);
        bucket.set_sequence(100).unwrap();
        let drawn: Vec<u64> = (0..5).map(|_| bucket.next_sequence().unwrap()).collect();
        assert_eq!(drawn, vec![101, 102, 103, 104, 105]);
        assert_eq!(bucket.sequence().unwrap(), 105);
    }

    #[test]
    fn for_each_beginning_with_starts_at_bound() {
        let db = db();
        let tx = db.begin_read_write_tx().unwrap();
        let bucket = tx.create_top_level_bucket(b"b").unwrap();
        for key in [&b"a"[..], b"b", b"ba", b"c", b"d"] {
            bucket.put(key, key).unwrap();
        }

        let mut seen = Vec::new();
        bucket
            .for_each_beginning_with(b"b", |k, _| -> Result<(), CoreError> {
                seen.push(k.to_vec());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![b"b".to_vec(), b"ba".to_vec(), b"c".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn for_each_stops_at_first_error() {
        let db = db();
        let tx = db.begin_read_write_tx().unwrap();
        let bucket = tx.create_top_level_bucket(b"b").unwrap();
        for n in 0u8..10 {
            bucket.put(&[n], &[n]).unwrap();
        }

        let mut visited = 0;
        let result = bucket.for_each(|k, _| {
            visited += 1;
            if k == [3] {
                Err(CoreError::invalid_state("stop"))
            } else {
                Ok(())
            }
        });
        assert!(matches!(result, Err(CoreError::InvalidState { .. })));
        assert_eq!(visited, 4);
    }

    #[test]
    fn for_each_beginning_with_stops_at_first_error() {
        let db = db();
        let tx = db.begin_read_write_tx().unwrap();
        let bucket = tx.create_top_level_bucket(b"b").unwrap();
        for n in 0u8..10 {
            bucket.put(&[n], &[n]).unwrap();
        }

        let mut visited = Vec::new();
        let result = bucket.for_each_beginning_with(&[4], |k, _| {
            visited.push(k.to_vec());
            if k == [6] {
                Err(CoreError::invalid_state("stop"))
            } else {
                Ok(())
            }
        });
        assert!(matches!(result, Err(CoreError::InvalidState { .. })));
        assert_eq!(visited, vec![vec![4], vec![5], vec![6]]);
    }

    #[test]
    fn iterator_tolerates_writes_between_pages() {
        let db = db();
        let tx = db.begin_read_write_tx().unwrap();
        let bucket = tx.create_top_level_bucket(b"b").unwrap();
        for key in [&b"a"[..], b"c", b"e"] {
            bucket.put(key, b"").unwrap();
        }

        let mut iter = bucket.iter();
        assert_eq!(iter.next().unwrap().unwrap().0, b"a");
        bucket.put(b"z", b"").unwrap();
        let rest: Vec<Vec<u8>> = iter.map(|entry| entry.unwrap().0).collect();
        assert_eq!(rest, vec![b"c".to_vec(), b"e".to_vec(), b"z".to_vec()]);
    }

    #[test]
    fn get_on_dropped_table_is_absent() {
        let db = db();
        let tx = db.begin_read_write_tx().unwrap();
        let stale = tx.create_top_level_bucket(b"b").unwrap();
        stale.put(b"k", b"v").unwrap();
        tx.delete_top_level_bucket(b"b").unwrap();

        assert_eq!(stale.get(b"k"), None);
        assert!(stale.try_get(b"k").is_err());
    }

    proptest! {
        #[test]
        fn iteration_is_sorted_and_complete(
            entries in prop::collection::btree_map(
                prop::collection::vec(any::<u8>(), 0..8),
                prop::collection::vec(any::<u8>(), 0..8),
                0..24,
            ),
            start in prop::collection::vec(any::<u8>(), 0..3),
        ) {
            let db = db();
            let tx = db.begin_read_write_tx().unwrap();
            let bucket = tx.create_top_level_bucket(b"prop").unwrap();
            for (k, v) in &entries {
                bucket.put(k, v).unwrap();
            }

            let all: BTreeMap<Vec<u8>, Vec<u8>> =
                bucket.iter().collect::<Result<_, _>>().unwrap();
            prop_assert_eq!(&all, &entries);

            let from: Vec<Vec<u8>> = bucket
                .iter_from(&start)
                .map(|entry| entry.unwrap().0)
                .collect();
            let expected: Vec<Vec<u8>> = entries
                .range(start.clone()..)
                .map(|(k, _)| k.clone())
                .collect();
            prop_assert_eq!(from, expected);
        }
    }
}
