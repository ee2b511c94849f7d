//! The bucket catalog.
//!
//! One row per live bucket in `bucketindex`, keyed by the canonical
//! [`BucketId`]. Each row names the physical table holding the bucket's
//! entries and carries the bucket's sequence counter.
//!
//! Every mutation here runs on the caller's transaction, so a table and its
//! catalog row are created or dropped together. SQLite runs DDL inside
//! transactions, so a rollback restores both.

use crate::error::{CoreError, CoreResult, StorageContext};
use bucketsql_codec::{candidate_name, BucketId, TableName, TABLE_PREFIX};
use bucketsql_storage::StorageError;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

/// Name of the catalog table.
pub const CATALOG_TABLE: &str = "bucketindex";

const CREATE_CATALOG: &str = "CREATE TABLE IF NOT EXISTS bucketindex (\
     path     BLOB PRIMARY KEY NOT NULL, \
     \"table\" TEXT UNIQUE NOT NULL COLLATE NOCASE, \
     sequence INTEGER NOT NULL DEFAULT 0\
     )";

/// A decoded catalog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// The bucket's canonical identifier.
    pub id: BucketId,
    /// The physical table holding the bucket's entries.
    pub table: TableName,
    /// The bucket's sequence counter.
    pub sequence: u64,
}

/// A disagreement between the catalog and the physical schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogIssue {
    /// A catalog row whose path or table name does not decode.
    MalformedEntry {
        /// Raw `path` column.
        path: Vec<u8>,
        /// Raw `table` column.
        table: String,
        /// Why decoding failed.
        message: String,
    },
    /// A catalog row whose table does not exist.
    MissingTable {
        /// The bucket.
        id: BucketId,
        /// The expected table.
        table: TableName,
    },
    /// A bucket table without the `key`/`val` columns.
    WrongColumns {
        /// The table.
        table: TableName,
        /// Columns actually present.
        columns: Vec<String>,
    },
    /// A generated-looking table that no catalog row references.
    OrphanTable {
        /// The table.
        table: String,
    },
}

/// Sequence counters are u64 at the API and stored as the same 64 bits.
#[inline]
fn sequence_to_sql(value: u64) -> i64 {
    value as i64
}

#[inline]
fn sequence_from_sql(value: i64) -> u64 {
    value as u64
}

/// Catalog operations on one connection inside an open transaction.
#[derive(Clone, Copy)]
pub(crate) struct Catalog<'c> {
    conn: &'c Connection,
}

impl<'c> Catalog<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Creates the catalog table if it does not exist.
    pub(crate) fn initialize(conn: &Connection) -> CoreResult<()> {
        conn.execute_batch(CREATE_CATALOG)
            .storage_context(|| "creating the bucket catalog")
    }

    /// Returns true if the catalog table exists.
    pub(crate) fn is_initialized(conn: &'c Connection) -> CoreResult<bool> {
        Self::new(conn).relation_exists(CATALOG_TABLE)
    }

    /// SQLite compares identifiers without regard to ASCII case.
    fn relation_exists(&self, name: &str) -> CoreResult<bool> {
        self.conn
            .prepare_cached(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            )
            .and_then(|mut stmt| stmt.exists(params![name]))
            .storage_context(|| format!("probing for table {name}"))
    }

    /// Tables, indexes and views share one namespace.
    fn name_in_use(&self, name: &str) -> CoreResult<bool> {
        self.conn
            .prepare_cached("SELECT 1 FROM sqlite_master WHERE name = ?1 COLLATE NOCASE")
            .and_then(|mut stmt| stmt.exists(params![name]))
            .storage_context(|| format!("probing for name {name}"))
    }

    /// Returns the table of `id`, or `None` if the bucket does not exist.
    pub(crate) fn lookup(&self, id: &BucketId) -> CoreResult<Option<TableName>> {
        let table: Option<String> = self
            .conn
            .prepare_cached("SELECT \"table\" FROM bucketindex WHERE path = ?1")
            .and_then(|mut stmt| {
                stmt.query_row(params![id.as_bytes()], |row| row.get(0))
                    .optional()
            })
            .storage_context(|| format!("looking up bucket {id}"))?;
        table.map(TableName::parse).transpose().map_err(Into::into)
    }

    /// Registers `id` and creates its table.
    ///
    /// Candidate names are tried with disambiguator 0, 1, 2, ... until one is
    /// accepted by the `UNIQUE` constraint on the table column. The row and
    /// the table are written under a savepoint, so a failure leaves neither.
    pub(crate) fn create(&self, id: &BucketId) -> CoreResult<TableName> {
        if self.lookup(id)?.is_some() {
            return Err(CoreError::already_exists(id));
        }

        self.conn
            .execute_batch("SAVEPOINT create_bucket")
            .storage_context(|| format!("creating bucket {id}"))?;
        let created = self.register(id);
        let finish = match created {
            Ok(_) => "RELEASE create_bucket",
            Err(_) => "ROLLBACK TO create_bucket; RELEASE create_bucket",
        };
        if let Err(err) = self.conn.execute_batch(finish) {
            if created.is_ok() {
                return Err(CoreError::storage(format!("creating bucket {id}"), err));
            }
            warn!(bucket = %id, error = %err, "failed to undo a partial bucket create");
        }
        created
    }

    fn register(&self, id: &BucketId) -> CoreResult<TableName> {
        let mut disambiguator = 0u64;
        let table = loop {
            let candidate = candidate_name(id, disambiguator);
            // Schema objects the catalog does not know about block the name too.
            if self.name_in_use(candidate.as_str())? {
                disambiguator += 1;
                continue;
            }
            match self.insert_entry(id, &candidate) {
                Ok(()) => break candidate,
                Err(err) if err.is_unique_violation() => {
                    debug!(bucket = %id, table = %candidate, "table name taken, retrying");
                    disambiguator += 1;
                }
                Err(err) if err.is_primary_key_violation() => {
                    return Err(CoreError::already_exists(id));
                }
                Err(err) => {
                    return Err(CoreError::storage(format!("registering bucket {id}"), err));
                }
            }
        };

        self.conn
            .execute_batch(&format!(
                "CREATE TABLE {} (key BLOB PRIMARY KEY NOT NULL, val BLOB NOT NULL) WITHOUT ROWID",
                table.quoted()
            ))
            .storage_context(|| format!("creating table {table}"))?;

        debug!(bucket = %id, table = %table, "created bucket");
        Ok(table)
    }

    fn insert_entry(&self, id: &BucketId, table: &TableName) -> Result<(), StorageError> {
        self.conn
            .prepare_cached(
                "INSERT INTO bucketindex (path, \"table\", sequence) VALUES (?1, ?2, 0)",
            )?
            .execute(params![id.as_bytes(), table.as_str()])?;
        Ok(())
    }

    /// Returns the existing table of `id`, creating the bucket if needed.
    pub(crate) fn create_if_not_exists(&self, id: &BucketId) -> CoreResult<TableName> {
        match self.lookup(id)? {
            Some(table) => Ok(table),
            None => self.create(id),
        }
    }

    /// Drops `id` and every bucket nested under it.
    ///
    /// Tables are dropped before their catalog rows are removed.
    pub(crate) fn destroy(&self, id: &BucketId) -> CoreResult<()> {
        if self.lookup(id)?.is_none() {
            return Err(CoreError::not_found(id));
        }

        let doomed = self.subtree(id)?;
        for (_, table) in &doomed {
            self.conn
                .execute_batch(&format!("DROP TABLE {}", table.quoted()))
                .storage_context(|| format!("dropping table {table}"))?;
        }
        let mut delete = self
            .conn
            .prepare_cached("DELETE FROM bucketindex WHERE path = ?1")
            .storage_context(|| "preparing catalog delete")?;
        for (member, _) in &doomed {
            delete
                .execute(params![member.as_bytes()])
                .storage_context(|| format!("removing bucket {member} from the catalog"))?;
        }

        debug!(bucket = %id, dropped = doomed.len(), "destroyed bucket");
        Ok(())
    }

    /// Returns `id` and its descendants with their tables.
    ///
    /// Descendant identifiers extend `id` byte-wise, so they sort directly
    /// after it in the primary key index.
    fn subtree(&self, id: &BucketId) -> CoreResult<Vec<(BucketId, TableName)>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT path, \"table\" FROM bucketindex WHERE path >= ?1 ORDER BY path",
            )
            .storage_context(|| format!("listing buckets under {id}"))?;
        let mut rows = stmt
            .query(params![id.as_bytes()])
            .storage_context(|| format!("listing buckets under {id}"))?;

        let mut members = Vec::new();
        while let Some(row) = rows
            .next()
            .storage_context(|| format!("listing buckets under {id}"))?
        {
            let path: Vec<u8> = row.get(0).storage_context(|| "reading catalog path")?;
            if !path.starts_with(id.as_bytes()) {
                break;
            }
            let table: String = row.get(1).storage_context(|| "reading catalog table")?;
            members.push((BucketId::from_bytes(path)?, TableName::parse(table)?));
        }
        Ok(members)
    }

    /// Returns every catalog row, ordered by identifier.
    pub(crate) fn entries(&self) -> CoreResult<Vec<CatalogEntry>> {
        self.raw_entries()?
            .into_iter()
            .map(|(path, table, sequence)| -> CoreResult<CatalogEntry> {
                Ok(CatalogEntry {
                    id: BucketId::from_bytes(path)?,
                    table: TableName::parse(table)?,
                    sequence: sequence_from_sql(sequence),
                })
            })
            .collect()
    }

    fn raw_entries(&self) -> CoreResult<Vec<(Vec<u8>, String, i64)>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT path, \"table\", sequence FROM bucketindex ORDER BY path")
            .storage_context(|| "listing the catalog")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, Vec<u8>>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .storage_context(|| "listing the catalog")?;
        rows.collect::<Result<Vec<_>, _>>()
            .storage_context(|| "listing the catalog")
    }

    /// Compares the catalog with the tables that actually exist.
    pub(crate) fn check_consistency(&self) -> CoreResult<Vec<CatalogIssue>> {
        let mut issues = Vec::new();
        let mut referenced = std::collections::HashSet::new();

        for (path, table, _) in self.raw_entries()? {
            let decoded = BucketId::from_bytes(path.clone())
                .and_then(|id| TableName::parse(table.clone()).map(|name| (id, name)));
            let (id, name) = match decoded {
                Ok(pair) => pair,
                Err(err) => {
                    issues.push(CatalogIssue::MalformedEntry {
                        path,
                        table,
                        message: err.to_string(),
                    });
                    continue;
                }
            };
            referenced.insert(name.as_str().to_string());

            if !self.relation_exists(name.as_str())? {
                issues.push(CatalogIssue::MissingTable { id, table: name });
                continue;
            }
            let columns = self.columns(&name)?;
            if columns != ["key", "val"] {
                issues.push(CatalogIssue::WrongColumns {
                    table: name,
                    columns,
                });
            }
        }

        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE ?1 ORDER BY name")
            .storage_context(|| "listing tables")?;
        let names = stmt
            .query_map(params![format!("{TABLE_PREFIX}%")], |row| row.get::<_, String>(0))
            .storage_context(|| "listing tables")?
            .collect::<Result<Vec<_>, _>>()
            .storage_context(|| "listing tables")?;
        for table in names {
            if !referenced.contains(&table) {
                issues.push(CatalogIssue::OrphanTable { table });
            }
        }

        Ok(issues)
    }

    fn columns(&self, table: &TableName) -> CoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", table.quoted()))
            .storage_context(|| format!("describing table {table}"))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .storage_context(|| format!("describing table {table}"))?
            .collect::<Result<Vec<_>, _>>();
        columns.storage_context(|| format!("describing table {table}"))
    }

    /// Reads the sequence counter of `id`.
    pub(crate) fn sequence(&self, id: &BucketId) -> CoreResult<u64> {
        self.conn
            .prepare_cached("SELECT sequence FROM bucketindex WHERE path = ?1")
            .and_then(|mut stmt| {
                stmt.query_row(params![id.as_bytes()], |row| row.get::<_, i64>(0))
                    .optional()
            })
            .storage_context(|| format!("reading sequence of {id}"))?
            .map(sequence_from_sql)
            .ok_or_else(|| CoreError::not_found(id))
    }

    /// Overwrites the sequence counter of `id`.
    pub(crate) fn set_sequence(&self, id: &BucketId, value: u64) -> CoreResult<()> {
        let changed = self
            .conn
            .prepare_cached("UPDATE bucketindex SET sequence = ?1 WHERE path = ?2")
            .and_then(|mut stmt| stmt.execute(params![sequence_to_sql(value), id.as_bytes()]))
            .storage_context(|| format!("setting sequence of {id}"))?;
        if changed == 0 {
            return Err(CoreError::not_found(id));
        }
        Ok(())
    }

    /// Increments the sequence counter of `id` and returns the new value.
    ///
    /// One `UPDATE ... RETURNING` statement, so the read and the write cannot
    /// be separated. Wraps from `u64::MAX` to zero.
    pub(crate) fn next_sequence(&self, id: &BucketId) -> CoreResult<u64> {
        self.conn
            .prepare_cached(
                "UPDATE bucketindex \
                 SET sequence = CASE WHEN sequence = ?2 THEN ?3 ELSE sequence + 1 END \
                 WHERE path = ?1 RETURNING sequence",
            )
            .and_then(|mut stmt| {
                stmt.query_row(params![id.as_bytes(), i64::MAX, i64::MIN], |row| {
                    row.get::<_, i64>(0)
                })
                .optional()
            })
            .storage_context(|| format!("advancing sequence of {id}"))?
            .map(sequence_from_sql)
            .ok_or_else(|| CoreError::not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        Catalog::initialize(&conn).unwrap();
        conn
    }

    #[test]
    fn create_then_lookup() {
        let conn = conn();
        let catalog = Catalog::new(&conn);
        let id = BucketId::root(b"acct");

        assert!(catalog.lookup(&id).unwrap().is_none());
        let table = catalog.create(&id).unwrap();
        assert_eq!(table.as_str(), "bkt-acct");
        assert_eq!(catalog.lookup(&id).unwrap(), Some(table));
    }

    #[test]
    fn create_twice_is_already_exists() {
        let conn = conn();
        let catalog = Catalog::new(&conn);
        let id = BucketId::root(b"acct");

        catalog.create(&id).unwrap();
        let err = catalog.create(&id).unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn colliding_candidates_get_suffixes() {
        let conn = conn();
        let catalog = Catalog::new(&conn);

        let first = catalog.create(&BucketId::root(b"a.b")).unwrap();
        let second = catalog.create(&BucketId::root(b"a/b")).unwrap();
        let third = catalog.create(&BucketId::root(b"a b")).unwrap();

        assert_eq!(first.as_str(), "bkt-a_b");
        assert_eq!(second.as_str(), "bkt-a_b-u1");
        assert_eq!(third.as_str(), "bkt-a_b-u2");
    }

    #[test]
    fn names_differing_in_case_get_suffixes() {
        let conn = conn();
        let catalog = Catalog::new(&conn);

        let upper = catalog.create(&BucketId::root(b"Acct")).unwrap();
        let lower = catalog.create(&BucketId::root(b"acct")).unwrap();

        assert_eq!(upper.as_str(), "bkt-Acct");
        assert_eq!(lower.as_str(), "bkt-acct-u1");
        assert!(catalog.check_consistency().unwrap().is_empty());
    }

    #[test]
    fn catalog_rejects_table_names_differing_in_case() {
        let conn = conn();
        conn.execute("INSERT INTO bucketindex (path, \"table\") VALUES (x'0161', 'bkt-a')", [])
            .unwrap();
        let err: StorageError = conn
            .execute("INSERT INTO bucketindex (path, \"table\") VALUES (x'0141', 'BKT-A')", [])
            .unwrap_err()
            .into();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn leftover_index_blocks_candidate() {
        let conn = conn();
        conn.execute_batch("CREATE INDEX \"bkt-y\" ON bucketindex (sequence)")
            .unwrap();
        let catalog = Catalog::new(&conn);

        let table = catalog.create(&BucketId::root(b"y")).unwrap();
        assert_eq!(table.as_str(), "bkt-y-u1");
    }

    #[test]
    fn failed_create_leaves_no_catalog_row() {
        let conn = conn();
        let catalog = Catalog::new(&conn);
        let id = BucketId::root(b"full");

        // Cap the file at its current size so the new table's root page cannot be allocated.
        let pages: i64 = conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap();
        conn.query_row(&format!("PRAGMA max_page_count = {pages}"), [], |row| {
            row.get::<_, i64>(0)
        })
        .unwrap();

        assert!(catalog.create(&id).is_err());
        assert!(catalog.lookup(&id).unwrap().is_none());
        assert!(catalog.entries().unwrap().is_empty());
        assert!(catalog.check_consistency().unwrap().is_empty());

        conn.query_row("PRAGMA max_page_count = 100000", [], |row| {
            row.get::<_, i64>(0)
        })
        .unwrap();
        let table = catalog.create(&id).unwrap();
        assert_eq!(table.as_str(), "bkt-full");
        assert_eq!(catalog.lookup(&id).unwrap(), Some(table));
    }

    #[test]
    fn leftover_table_blocks_candidate() {
        let conn = conn();
        conn.execute_batch("CREATE TABLE \"bkt-x\" (key BLOB)").unwrap();
        let catalog = Catalog::new(&conn);

        let table = catalog.create(&BucketId::root(b"x")).unwrap();
        assert_eq!(table.as_str(), "bkt-x-u1");
    }

    #[test]
    fn create_if_not_exists_reuses_table() {
        let conn = conn();
        let catalog = Catalog::new(&conn);
        let id = BucketId::root(b"acct");

        let first = catalog.create_if_not_exists(&id).unwrap();
        let second = catalog.create_if_not_exists(&id).unwrap();
        assert_eq!(first, second);
        assert_eq!(catalog.entries().unwrap().len(), 1);
    }

    #[test]
    fn destroy_missing_is_not_found() {
        let conn = conn();
        let err = Catalog::new(&conn)
            .destroy(&BucketId::root(b"nope"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn destroy_removes_subtree_only() {
        let conn = conn();
        let catalog = Catalog::new(&conn);
        let parent = BucketId::root(b"p");
        let child = parent.child(b"c");
        let grandchild = child.child(b"g");
        let sibling = parent.child(b"s");
        // Sorts right after the subtree of `child`.
        let lookalike = parent.child(b"d");

        for id in [&parent, &child, &grandchild, &sibling, &lookalike] {
            catalog.create(id).unwrap();
        }
        catalog.destroy(&child).unwrap();

        let remaining: Vec<BucketId> = catalog
            .entries()
            .unwrap()
            .into_iter()
            .map(|entry| entry.id)
            .collect();
        assert!(remaining.contains(&parent));
        assert!(remaining.contains(&sibling));
        assert!(remaining.contains(&lookalike));
        assert!(!remaining.contains(&child));
        assert!(!remaining.contains(&grandchild));
        assert!(catalog.check_consistency().unwrap().is_empty());
    }

    #[test]
    fn sequence_starts_at_zero_and_increments() {
        let conn = conn();
        let catalog = Catalog::new(&conn);
        let id = BucketId::root(b"seq");
        catalog.create(&id).unwrap();

        assert_eq!(catalog.sequence(&id).unwrap(), 0);
        assert_eq!(catalog.next_sequence(&id).unwrap(), 1);
        assert_eq!(catalog.next_sequence(&id).unwrap(), 2);
        catalog.set_sequence(&id, 40).unwrap();
        assert_eq!(catalog.next_sequence(&id).unwrap(), 41);
    }

    #[test]
    fn sequence_uses_full_u64_range() {
        let conn = conn();
        let catalog = Catalog::new(&conn);
        let id = BucketId::root(b"seq");
        catalog.create(&id).unwrap();

        catalog.set_sequence(&id, u64::MAX - 1).unwrap();
        assert_eq!(catalog.sequence(&id).unwrap(), u64::MAX - 1);
        assert_eq!(catalog.next_sequence(&id).unwrap(), u64::MAX);
        assert_eq!(catalog.next_sequence(&id).unwrap(), 0);

        catalog.set_sequence(&id, i64::MAX as u64).unwrap();
        assert_eq!(catalog.next_sequence(&id).unwrap(), i64::MAX as u64 + 1);
    }

    #[test]
    fn sequence_of_missing_bucket_is_not_found() {
        let conn = conn();
        let catalog = Catalog::new(&conn);
        let id = BucketId::root(b"ghost");
        assert!(catalog.sequence(&id).unwrap_err().is_not_found());
        assert!(catalog.set_sequence(&id, 1).unwrap_err().is_not_found());
        assert!(catalog.next_sequence(&id).unwrap_err().is_not_found());
    }

    #[test]
    fn consistency_reports_orphans_and_missing_tables() {
        let conn = conn();
        let catalog = Catalog::new(&conn);
        let kept = BucketId::root(b"kept");
        let table = catalog.create(&kept).unwrap();
        conn.execute_batch(&format!("DROP TABLE {}", table.quoted()))
            .unwrap();
        conn.execute_batch("CREATE TABLE \"bkt-stray\" (key BLOB PRIMARY KEY, val BLOB)")
            .unwrap();

        let issues = catalog.check_consistency().unwrap();
        assert!(issues.contains(&CatalogIssue::MissingTable { id: kept, table }));
        assert!(issues.contains(&CatalogIssue::OrphanTable {
            table: "bkt-stray".to_string()
        }));
    }
}
