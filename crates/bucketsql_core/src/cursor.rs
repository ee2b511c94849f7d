//! Positioned cursors over a bucket.
//!
//! A cursor remembers the key it is positioned on rather than holding a
//! statement open. Each movement is a single keyset query relative to that
//! key, so entries may be inserted or deleted between movements and the
//! cursor still lands on the correct neighbour.

use crate::bucket::{read_entry, TxScope};
use crate::error::{CoreError, CoreResult, StorageContext};
use bucketsql_codec::{BucketId, TableName};
use rusqlite::{params, OptionalExtension, Params};
use std::fmt;

/// A key/value pair owned by the caller.
pub type Entry = (Vec<u8>, Vec<u8>);

/// Read-only cursor movements.
///
/// Every movement returns the entry the cursor lands on, or `None` when it
/// runs off either end of the bucket. `next` on a fresh cursor behaves like
/// `first`; `prev` on a fresh cursor behaves like `last`.
pub trait ReadCursor {
    /// Moves to the smallest key.
    fn first(&mut self) -> CoreResult<Option<Entry>>;

    /// Moves to the largest key.
    fn last(&mut self) -> CoreResult<Option<Entry>>;

    /// Moves to the smallest key `>= key`.
    fn seek(&mut self, key: &[u8]) -> CoreResult<Option<Entry>>;

    /// Moves to the next larger key.
    fn next(&mut self) -> CoreResult<Option<Entry>>;

    /// Moves to the next smaller key.
    fn prev(&mut self) -> CoreResult<Option<Entry>>;

    /// Returns the entry under the cursor without moving.
    fn current(&self) -> CoreResult<Option<Entry>>;
}

/// A cursor that can also remove the entry it is positioned on.
pub trait ReadWriteCursor: ReadCursor {
    /// Deletes the entry under the cursor.
    ///
    /// The cursor keeps its position, so `next` and `prev` continue from the
    /// deleted key.
    fn delete(&mut self) -> CoreResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    Unset,
    At(Vec<u8>),
    PastEnd,
    BeforeStart,
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

/// Cursor implementation for [`crate::Bucket`].
pub struct BucketCursor<'tx> {
    scope: TxScope<'tx>,
    id: BucketId,
    table: TableName,
    position: Position,
}

impl<'tx> BucketCursor<'tx> {
    pub(crate) fn new(scope: TxScope<'tx>, id: BucketId, table: TableName) -> Self {
        Self {
            scope,
            id,
            table,
            position: Position::Unset,
        }
    }

    /// Returns the key the cursor is positioned on, if any.
    #[must_use]
    pub fn key(&self) -> Option<&[u8]> {
        match &self.position {
            Position::At(key) => Some(key),
            _ => None,
        }
    }

    fn fetch<P: Params>(&self, filter: &str, order: &str, params: P) -> CoreResult<Option<Entry>> {
        let sql = format!(
            "SELECT key, val FROM {} {filter} ORDER BY key {order} LIMIT 1",
            self.table.quoted()
        );
        self.scope
            .conn
            .prepare_cached(&sql)
            .and_then(|mut stmt| stmt.query_row(params, read_entry).optional())
            .storage_context(|| format!("moving cursor over {}", self.id))
    }

    /// Records where a movement landed. Running off the end leaves the cursor
    /// beyond that end.
    fn land(&mut self, found: Option<Entry>, direction: Direction) -> Option<Entry> {
        self.position = match (&found, direction) {
            (Some((key, _)), _) => Position::At(key.clone()),
            (None, Direction::Forward) => Position::PastEnd,
            (None, Direction::Backward) => Position::BeforeStart,
        };
        found
    }
}

impl ReadCursor for BucketCursor<'_> {
    fn first(&mut self) -> CoreResult<Option<Entry>> {
        let found = self.fetch("", "ASC", [])?;
        Ok(self.land(found, Direction::Forward))
    }

    fn last(&mut self) -> CoreResult<Option<Entry>> {
        let found = self.fetch("", "DESC", [])?;
        Ok(self.land(found, Direction::Backward))
    }

    fn seek(&mut self, key: &[u8]) -> CoreResult<Option<Entry>> {
        let found = self.fetch("WHERE key >= ?1", "ASC", params![key])?;
        Ok(self.land(found, Direction::Forward))
    }

    fn next(&mut self) -> CoreResult<Option<Entry>> {
        match &self.position {
            Position::Unset | Position::BeforeStart => self.first(),
            Position::PastEnd => Ok(None),
            Position::At(key) => {
                let found = self.fetch("WHERE key > ?1", "ASC", params![key])?;
                Ok(self.land(found, Direction::Forward))
            }
        }
    }

    fn prev(&mut self) -> CoreResult<Option<Entry>> {
        match &self.position {
            Position::Unset | Position::PastEnd => self.last(),
            Position::BeforeStart => Ok(None),
            Position::At(key) => {
                let found = self.fetch("WHERE key < ?1", "DESC", params![key])?;
                Ok(self.land(found, Direction::Backward))
            }
        }
    }

    fn current(&self) -> CoreResult<Option<Entry>> {
        match &self.position {
            Position::At(key) => self.fetch("WHERE key = ?1", "ASC", params![key]),
            _ => Ok(None),
        }
    }
}

impl ReadWriteCursor for BucketCursor<'_> {
    fn delete(&mut self) -> CoreResult<()> {
        self.scope.ensure_writable()?;
        let Position::At(key) = &self.position else {
            return Err(CoreError::invalid_state(
                "cursor is not positioned on an entry",
            ));
        };
        self.scope
            .conn
            .prepare_cached(&format!("DELETE FROM {} WHERE key = ?1", self.table.quoted()))
            .and_then(|mut stmt| stmt.execute(params![key]))
            .storage_context(|| format!("deleting through cursor on {}", self.id))?;
        Ok(())
    }
}

impl fmt::Debug for BucketCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketCursor")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("writable", &self.scope.writable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn keys(entry: CoreResult<Option<Entry>>) -> Option<Vec<u8>> {
        entry.unwrap().map(|(key, _)| key)
    }

    fn seeded(db: &Database) -> crate::Transaction<'_> {
        let tx = db.begin_read_write_tx().unwrap();
        {
            let bucket = tx.create_top_level_bucket(b"c").unwrap();
            for key in [&b"b"[..], b"d", b"f"] {
                bucket.put(key, &[key[0].to_ascii_uppercase()]).unwrap();
            }
        }
        tx
    }

    #[test]
    fn walks_both_directions() {
        let db = Database::open_in_memory().unwrap();
        let tx = seeded(&db);
        let bucket = tx.read_bucket(b"c").unwrap().unwrap();
        let mut cursor = bucket.read_cursor();

        assert_eq!(cursor.first().unwrap(), Some((b"b".to_vec(), b"B".to_vec())));
        assert_eq!(keys(cursor.next()), Some(b"d".to_vec()));
        assert_eq!(keys(cursor.next()), Some(b"f".to_vec()));
        assert_eq!(keys(cursor.next()), None);
        assert_eq!(keys(cursor.next()), None);
        assert_eq!(keys(cursor.prev()), Some(b"f".to_vec()));
        assert_eq!(keys(cursor.prev()), Some(b"d".to_vec()));
        assert_eq!(keys(cursor.prev()), Some(b"b".to_vec()));
        assert_eq!(keys(cursor.prev()), None);
        assert_eq!(keys(cursor.next()), Some(b"b".to_vec()));
    }

    #[test]
    fn fresh_cursor_next_and_prev() {
        let db = Database::open_in_memory().unwrap();
        let tx = seeded(&db);
        let bucket = tx.read_bucket(b"c").unwrap().unwrap();

        let mut forward = bucket.read_cursor();
        assert!(forward.current().unwrap().is_none());
        assert_eq!(keys(forward.next()), Some(b"b".to_vec()));

        let mut backward = bucket.read_cursor();
        assert_eq!(keys(backward.prev()), Some(b"f".to_vec()));
        assert_eq!(keys(backward.last()), Some(b"f".to_vec()));
    }

    #[test]
    fn seek_lands_on_next_key() {
        let db = Database::open_in_memory().unwrap();
        let tx = seeded(&db);
        let bucket = tx.read_bucket(b"c").unwrap().unwrap();
        let mut cursor = bucket.read_cursor();

        assert_eq!(keys(cursor.seek(b"d")), Some(b"d".to_vec()));
        assert_eq!(keys(cursor.seek(b"c")), Some(b"d".to_vec()));
        assert_eq!(cursor.key(), Some(&b"d"[..]));
        assert_eq!(keys(cursor.seek(b"g")), None);
        assert_eq!(keys(cursor.prev()), Some(b"f".to_vec()));
    }

    #[test]
    fn empty_bucket() {
        let db = Database::open_in_memory().unwrap();
        let tx = db.begin_read_write_tx().unwrap();
        let bucket = tx.create_top_level_bucket(b"empty").unwrap();
        let mut cursor = bucket.read_cursor();

        assert_eq!(keys(cursor.first()), None);
        assert_eq!(keys(cursor.last()), None);
        assert_eq!(keys(cursor.next()), None);
    }

    #[test]
    fn delete_keeps_position() {
        let db = Database::open_in_memory().unwrap();
        let tx = seeded(&db);
        let bucket = tx.read_write_bucket(b"c").unwrap().unwrap();
        let mut cursor = bucket.read_write_cursor().unwrap();

        assert!(matches!(
            cursor.delete(),
            Err(CoreError::InvalidState { .. })
        ));
        cursor.seek(b"d").unwrap();
        cursor.delete().unwrap();
        assert!(cursor.current().unwrap().is_none());
        assert_eq!(keys(cursor.next()), Some(b"f".to_vec()));
        assert_eq!(keys(cursor.prev()), Some(b"b".to_vec()));
        assert_eq!(bucket.get(b"d"), None);
    }

    #[test]
    fn read_cursor_cannot_delete() {
        let db = Database::open_in_memory().unwrap();
        let tx = seeded(&db);
        let bucket = tx.read_write_bucket(b"c").unwrap().unwrap();
        let mut cursor = bucket.read_cursor();

        cursor.first().unwrap();
        assert!(cursor.delete().is_err());
        assert_eq!(bucket.len().unwrap(), 3);
    }
}
