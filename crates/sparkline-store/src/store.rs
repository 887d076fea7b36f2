//! Main store implementation.
//!
//! [`Store`] owns a single SQLite connection behind a mutex. Every operation
//! runs inside a transaction obtained from [`Store::read`] or
//! [`Store::write`], so the mutex and SQLite's own locking are the only
//! synchronization needed; a `Store` can be shared between tasks with `Arc`.
//!
//! Handles ([`Partition`], [`Child`]) borrow the transaction that produced
//! them and cannot outlive it.

use std::marker::PhantomData;
use std::ops::Deref;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::schema;

/// SQLite-based hierarchical store.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        // NORMAL sync stays crash-safe under WAL
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` against a consistent snapshot.
    ///
    /// The transaction is always rolled back afterwards. An error returned by
    /// `f` becomes the result of the call.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ReadTxn<'_>) -> Result<T>,
    {
        let mut conn = self.lock();
        let txn = ReadTxn {
            tx: conn.transaction_with_behavior(TransactionBehavior::Deferred)?,
        };

        let result = f(&txn);
        let finished = txn.tx.rollback();

        let value = result?;
        finished?;
        Ok(value)
    }

    /// Run `f` with exclusive write access.
    ///
    /// Everything `f` writes is committed if it returns `Ok`, and nothing is
    /// if it returns `Err`.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&WriteTxn<'_>) -> Result<T>,
    {
        let mut conn = self.lock();
        let txn = WriteTxn {
            inner: ReadTxn {
                tx: conn.transaction_with_behavior(TransactionBehavior::Immediate)?,
            },
        };

        match f(&txn) {
            Ok(value) => {
                txn.inner.tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                // Dropping the transaction rolls it back
                debug!("Write transaction aborted: {}", e);
                Err(e)
            }
        }
    }

    /// A panic inside a transaction closure drops (and so rolls back) the
    /// transaction before the guard is released, leaving the connection usable.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A top-level partition (one per device).
#[derive(Debug, Clone)]
pub struct Partition<'txn> {
    id: i64,
    name: String,
    _txn: PhantomData<&'txn ()>,
}

impl Partition<'_> {
    fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            _txn: PhantomData,
        }
    }

    /// Partition name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A sub-partition of a [`Partition`] (one per timestamp).
#[derive(Debug, Clone)]
pub struct Child<'txn> {
    id: i64,
    key: String,
    _txn: PhantomData<&'txn ()>,
}

impl Child<'_> {
    fn new(id: i64, key: String) -> Self {
        Self {
            id,
            key,
            _txn: PhantomData,
        }
    }

    /// Key of this child within its partition.
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Read access within a transaction.
pub struct ReadTxn<'conn> {
    tx: Transaction<'conn>,
}

impl ReadTxn<'_> {
    /// Look up a partition by name.
    pub fn open_partition(&self, name: &str) -> Result<Option<Partition<'_>>> {
        let id: Option<i64> = self
            .tx
            .query_row("SELECT id FROM partitions WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?;

        Ok(id.map(|id| Partition::new(id, name)))
    }

    /// Names of all partitions, in creation order.
    pub fn partitions(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .tx
            .prepare_cached("SELECT name FROM partitions ORDER BY id")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Call `visitor` once per child of `partition`, in creation order.
    ///
    /// Stops at and returns the first error `visitor` returns.
    pub fn for_each_child<F>(&self, partition: &Partition<'_>, mut visitor: F) -> Result<()>
    where
        F: FnMut(&Child<'_>) -> Result<()>,
    {
        let mut stmt = self
            .tx
            .prepare_cached("SELECT id, key FROM children WHERE partition_id = ?1 ORDER BY id")?;
        let mut rows = stmt.query([partition.id])?;

        while let Some(row) = rows.next()? {
            let child = Child::new(row.get(0)?, row.get(1)?);
            visitor(&child)?;
        }

        Ok(())
    }

    /// Call `visitor` once per key/value pair stored in `child`.
    ///
    /// Stops at and returns the first error `visitor` returns.
    pub fn for_each_entry<F>(&self, child: &Child<'_>, mut visitor: F) -> Result<()>
    where
        F: FnMut(&str, &str) -> Result<()>,
    {
        let mut stmt = self
            .tx
            .prepare_cached("SELECT key, value FROM entries WHERE child_id = ?1 ORDER BY key")?;
        let mut rows = stmt.query([child.id])?;

        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let value: String = row.get(1)?;
            visitor(&key, &value)?;
        }

        Ok(())
    }
}

/// Write access within a transaction.
///
/// Dereferences to [`ReadTxn`], so every read operation is available too.
pub struct WriteTxn<'conn> {
    inner: ReadTxn<'conn>,
}

impl<'conn> Deref for WriteTxn<'conn> {
    type Target = ReadTxn<'conn>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl WriteTxn<'_> {
    /// Create a partition unless it already exists.
    pub fn ensure_partition(&self, name: &str) -> Result<Partition<'_>> {
        let id: i64 = self.inner.tx.query_row(
            "INSERT INTO partitions (name) VALUES (?1)
             ON CONFLICT(name) DO UPDATE SET name = excluded.name
             RETURNING id",
            [name],
            |row| row.get(0),
        )?;

        Ok(Partition::new(id, name))
    }

    /// Create a child under `partition`.
    ///
    /// Fails with [`Error::KeyExists`] if the key is already taken.
    pub fn create_child(&self, partition: &Partition<'_>, key: &str) -> Result<Child<'_>> {
        let inserted = self.inner.tx.execute(
            "INSERT INTO children (partition_id, key) VALUES (?1, ?2)
             ON CONFLICT(partition_id, key) DO NOTHING",
            params![partition.id, key],
        )?;

        if inserted == 0 {
            return Err(Error::KeyExists {
                partition: partition.name.clone(),
                key: key.to_string(),
            });
        }

        Ok(Child::new(self.inner.tx.last_insert_rowid(), key.to_string()))
    }

    /// Store a key/value pair in `child`, replacing any previous value.
    pub fn put(&self, child: &Child<'_>, key: &str, value: &str) -> Result<()> {
        self.inner.tx.execute(
            "INSERT INTO entries (child_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(child_id, key) DO UPDATE SET value = excluded.value",
            params![child.id, key, value],
        )?;
        Ok(())
    }
}
