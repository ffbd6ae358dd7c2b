//! Process-wide store handle and observable collections.
//!
//! `Store` is created once at startup and cloned into every consumer.
//! Writes run inside a transaction and, once committed, announce the tables
//! they touched on a broadcast channel. `LiveQuery` listens on that channel
//! and re-runs its query whenever a watched table changes.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use rusqlite::Connection;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::config::MigrationPolicy;
use crate::db::{self, ConsistencyReport, DatabaseError};
use crate::models::{Consultation, Medication, MedicationHistory};

/// Change-notification buffer. Slow subscribers that fall behind re-query once.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A persisted table, as seen by change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Consultations,
    Medications,
    MedicationHistory,
}

impl Table {
    pub const ALL: [Table; 3] = [
        Table::Consultations,
        Table::Medications,
        Table::MedicationHistory,
    ];
}

struct StoreInner {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<Table>,
}

impl StoreInner {
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }
}

/// Shared handle to the medication database.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Open (or create) the database file, creating its directory if needed.
    pub fn open(path: &Path, policy: MigrationPolicy) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::MigrationFailed {
                version: 0,
                reason: format!("cannot create {}: {e}", parent.display()),
            })?;
        }
        tracing::info!(path = %path.display(), "Opening medication database");
        Ok(Self::from_connection(db::open_database(path, policy)?))
    }

    /// Fresh in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(db::open_memory_database()?))
    }

    fn from_connection(conn: Connection) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                conn: Mutex::new(conn),
                changes,
            }),
        }
    }

    /// Run a read against the connection.
    pub fn read<R>(
        &self,
        f: impl FnOnce(&Connection) -> Result<R, DatabaseError>,
    ) -> Result<R, DatabaseError> {
        let conn = self.inner.lock()?;
        f(&conn)
    }

    /// Run `f` in a transaction and, after commit, notify subscribers of
    /// every table in `tables`. Nothing is announced if `f` fails.
    pub fn write<R>(
        &self,
        tables: &[Table],
        f: impl FnOnce(&Connection) -> Result<R, DatabaseError>,
    ) -> Result<R, DatabaseError> {
        let result = {
            let conn = self.inner.lock()?;
            let tx = conn.unchecked_transaction()?;
            let result = f(&tx)?;
            tx.commit()?;
            result
        };
        for table in tables {
            // No receivers is fine.
            let _ = self.inner.changes.send(*table);
        }
        Ok(result)
    }

    /// Subscribe to "rows produced by `query`", re-evaluated whenever one of
    /// `tables` is written.
    pub fn observe<T, Q>(&self, tables: &[Table], query: Q) -> LiveQuery<T>
    where
        T: Send + 'static,
        Q: Fn(&Connection) -> Result<Vec<T>, DatabaseError> + Send + Sync + 'static,
    {
        LiveQuery {
            store: Arc::downgrade(&self.inner),
            rx: self.inner.changes.subscribe(),
            tables: tables.to_vec(),
            query: Arc::new(query),
            primed: false,
        }
    }

    // ── Consultations ───────────────────────────────────────

    pub fn insert_consultation(&self, c: &Consultation) -> Result<i64, DatabaseError> {
        self.write(&[Table::Consultations], |conn| db::insert_consultation(conn, c))
    }

    pub fn update_consultation(&self, c: &Consultation) -> Result<bool, DatabaseError> {
        self.write(&[Table::Consultations], |conn| db::update_consultation(conn, c))
    }

    /// Cascades to medications and their history, so all tables are announced.
    pub fn delete_consultation(&self, id: i64) -> Result<bool, DatabaseError> {
        self.write(&Table::ALL, |conn| db::delete_consultation(conn, id))
    }

    /// Delete a consultation and return, from the same transaction, the ids
    /// of the medications the cascade removed.
    pub fn delete_consultation_with_medications(
        &self,
        id: i64,
    ) -> Result<(bool, Vec<i64>), DatabaseError> {
        self.write(&Table::ALL, |conn| {
            let medication_ids = db::medication_ids_for_consultation(conn, id)?;
            let found = db::delete_consultation(conn, id)?;
            Ok((found, medication_ids))
        })
    }

    pub fn get_consultation(&self, id: i64) -> Result<Option<Consultation>, DatabaseError> {
        self.read(|conn| db::get_consultation(conn, id))
    }

    pub fn list_consultations(&self) -> Result<Vec<Consultation>, DatabaseError> {
        self.read(db::list_consultations)
    }

    pub fn observe_consultations(&self) -> LiveQuery<Consultation> {
        self.observe(&[Table::Consultations], db::list_consultations)
    }

    // ── Medications ─────────────────────────────────────────

    pub fn insert_medication(&self, med: &Medication) -> Result<i64, DatabaseError> {
        self.write(&[Table::Medications], |conn| db::insert_medication(conn, med))
    }

    pub fn update_medication(&self, med: &Medication) -> Result<bool, DatabaseError> {
        self.write(&[Table::Medications], |conn| db::update_medication(conn, med))
    }

    pub fn delete_medication(&self, id: i64) -> Result<bool, DatabaseError> {
        self.write(&[Table::Medications, Table::MedicationHistory], |conn| {
            db::delete_medication(conn, id)
        })
    }

    pub fn get_medication(&self, id: i64) -> Result<Option<Medication>, DatabaseError> {
        self.read(|conn| db::get_medication(conn, id))
    }

    pub fn list_medications(&self) -> Result<Vec<Medication>, DatabaseError> {
        self.read(db::list_medications)
    }

    pub fn list_medications_for_consultation(
        &self,
        consultation_id: i64,
    ) -> Result<Vec<Medication>, DatabaseError> {
        self.read(|conn| db::list_medications_for_consultation(conn, consultation_id))
    }

    pub fn observe_medications(&self) -> LiveQuery<Medication> {
        self.observe(&[Table::Medications], db::list_medications)
    }

    pub fn observe_medications_for_consultation(
        &self,
        consultation_id: i64,
    ) -> LiveQuery<Medication> {
        self.observe(&[Table::Medications], move |conn| {
            db::list_medications_for_consultation(conn, consultation_id)
        })
    }

    // ── History ─────────────────────────────────────────────

    pub fn insert_history(&self, entry: &MedicationHistory) -> Result<i64, DatabaseError> {
        self.write(&[Table::MedicationHistory], |conn| db::insert_history(conn, entry))
    }

    pub fn delete_history(&self, id: i64) -> Result<bool, DatabaseError> {
        self.write(&[Table::MedicationHistory], |conn| db::delete_history(conn, id))
    }

    pub fn list_history(&self, medication_id: i64) -> Result<Vec<MedicationHistory>, DatabaseError> {
        self.read(|conn| db::list_history(conn, medication_id))
    }

    pub fn observe_history(&self, medication_id: i64) -> LiveQuery<MedicationHistory> {
        self.observe(&[Table::MedicationHistory], move |conn| {
            db::list_history(conn, medication_id)
        })
    }

    // ── Maintenance ─────────────────────────────────────────

    pub fn check_consistency(&self) -> Result<ConsistencyReport, DatabaseError> {
        self.read(db::check_consistency)
    }

    pub fn repair_consistency(&self) -> Result<usize, DatabaseError> {
        self.write(&Table::ALL, db::repair_consistency)
    }
}

type QueryFn<T> = dyn Fn(&Connection) -> Result<Vec<T>, DatabaseError> + Send + Sync;

/// A live, re-evaluating query over the store.
///
/// The first `next()` yields the current snapshot; every later call waits
/// for a committed write to a watched table and yields a fresh one.
/// Holds only a weak reference: once the store is gone `next()` yields `None`.
pub struct LiveQuery<T> {
    store: Weak<StoreInner>,
    rx: broadcast::Receiver<Table>,
    tables: Vec<Table>,
    query: Arc<QueryFn<T>>,
    primed: bool,
}

impl<T: Send + 'static> LiveQuery<T> {
    pub async fn next(&mut self) -> Option<Result<Vec<T>, DatabaseError>> {
        if self.primed {
            loop {
                match self.rx.recv().await {
                    Ok(table) if self.tables.contains(&table) => break,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Live query lagged, re-querying");
                        break;
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
            // Coalesce a burst of notifications into one snapshot.
            loop {
                match self.rx.try_recv() {
                    Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
        }
        self.primed = true;

        let inner = self.store.upgrade()?;
        let query = Arc::clone(&self.query);
        let snapshot = tokio::task::spawn_blocking(move || {
            let conn = inner.lock()?;
            query(&conn)
        })
        .await
        .map_err(|e| DatabaseError::Task(e.to_string()));

        Some(snapshot.and_then(|r| r))
    }

    /// Stop listening. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}
