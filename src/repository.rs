//! Async façade over [`Store`] for the state controllers.
//!
//! Every call hops onto the blocking pool so no SQLite work runs on the
//! caller's executor thread. No validation, retries or transformation.

use crate::db::{ConsistencyReport, DatabaseError};
use crate::models::{Consultation, Medication, MedicationHistory};
use crate::store::{LiveQuery, Store};

#[derive(Clone)]
pub struct Repository {
    store: Store,
}

impl Repository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    async fn blocking<R, F>(&self, f: F) -> Result<R, DatabaseError>
    where
        R: Send + 'static,
        F: FnOnce(&Store) -> Result<R, DatabaseError> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| DatabaseError::Task(e.to_string()))?
    }

    // ── Consultations ───────────────────────────────────────

    pub async fn insert_consultation(&self, c: Consultation) -> Result<i64, DatabaseError> {
        self.blocking(move |s| s.insert_consultation(&c)).await
    }

    pub async fn update_consultation(&self, c: Consultation) -> Result<bool, DatabaseError> {
        self.blocking(move |s| s.update_consultation(&c)).await
    }

    pub async fn delete_consultation(&self, id: i64) -> Result<bool, DatabaseError> {
        self.blocking(move |s| s.delete_consultation(id)).await
    }

    /// Delete a consultation. Also returns the ids of the medications the
    /// cascade removed, read in the same transaction.
    pub async fn delete_consultation_with_medications(
        &self,
        id: i64,
    ) -> Result<(bool, Vec<i64>), DatabaseError> {
        self.blocking(move |s| s.delete_consultation_with_medications(id))
            .await
    }

    pub async fn get_consultation(&self, id: i64) -> Result<Option<Consultation>, DatabaseError> {
        self.blocking(move |s| s.get_consultation(id)).await
    }

    pub fn all_consultations(&self) -> LiveQuery<Consultation> {
        self.store.observe_consultations()
    }

    // ── Medications ─────────────────────────────────────────

    pub async fn insert_medication(&self, med: Medication) -> Result<i64, DatabaseError> {
        self.blocking(move |s| s.insert_medication(&med)).await
    }

    pub async fn update_medication(&self, med: Medication) -> Result<bool, DatabaseError> {
        self.blocking(move |s| s.update_medication(&med)).await
    }

    pub async fn delete_medication(&self, id: i64) -> Result<bool, DatabaseError> {
        self.blocking(move |s| s.delete_medication(id)).await
    }

    pub async fn get_medication(&self, id: i64) -> Result<Option<Medication>, DatabaseError> {
        self.blocking(move |s| s.get_medication(id)).await
    }

    pub async fn list_medications(&self) -> Result<Vec<Medication>, DatabaseError> {
        self.blocking(|s| s.list_medications()).await
    }


    pub fn all_medications(&self) -> LiveQuery<Medication> {
        self.store.observe_medications()
    }

    pub fn medications_for_consultation(&self, consultation_id: i64) -> LiveQuery<Medication> {
        self.store.observe_medications_for_consultation(consultation_id)
    }

    // ── History ─────────────────────────────────────────────

    pub async fn insert_history(&self, entry: MedicationHistory) -> Result<i64, DatabaseError> {
        self.blocking(move |s| s.insert_history(&entry)).await
    }

    pub async fn delete_history(&self, id: i64) -> Result<bool, DatabaseError> {
        self.blocking(move |s| s.delete_history(id)).await
    }

    pub fn medication_history(&self, medication_id: i64) -> LiveQuery<MedicationHistory> {
        self.store.observe_history(medication_id)
    }

    // ── Maintenance ─────────────────────────────────────────

    pub async fn check_consistency(&self) -> Result<ConsistencyReport, DatabaseError> {
        self.blocking(|s| s.check_consistency()).await
    }

    pub async fn repair_consistency(&self) -> Result<usize, DatabaseError> {
        self.blocking(|s| s.repair_consistency()).await
    }
}
