use rusqlite::Connection;
use serde::Serialize;

use crate::db::DatabaseError;

/// A single consistency issue detected by the checker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyIssue {
    pub category: String,
    pub severity: String,
    pub description: String,
    pub medication_id: Option<i64>,
}

/// Result of a consistency check across the medication tables.
#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    pub issues: Vec<ConsistencyIssue>,
    pub medications_checked: i64,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Run a full consistency check across the database.
///
/// Detects:
/// - Medications pointing at a consultation that no longer exists
/// - History rows pointing at a medication that no longer exists
/// - Medications with a zero frequency or treatment duration
///
/// Orphans can only appear in databases written with foreign keys
/// disabled, e.g. by older builds or external tools.
pub fn check_consistency(conn: &Connection) -> Result<ConsistencyReport, DatabaseError> {
    let mut issues = Vec::new();

    // 1. Medications whose owning consultation is gone
    let mut stmt = conn.prepare(
        "SELECT m.id, m.consultation_id FROM medications m
         WHERE m.consultation_id IS NOT NULL
         AND NOT EXISTS (SELECT 1 FROM consultations c WHERE c.id = m.consultation_id)",
    )?;
    let orphans: Vec<(i64, i64)> = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<_, _>>()?;
    drop(stmt);
    for (id, consultation_id) in orphans {
        issues.push(ConsistencyIssue {
            category: "orphaned_medication".into(),
            severity: "high".into(),
            description: format!("Medication references missing consultation {consultation_id}"),
            medication_id: Some(id),
        });
    }

    // 2. History rows whose medication is gone
    let mut stmt = conn.prepare(
        "SELECT h.id, h.medication_id FROM medication_history h
         WHERE NOT EXISTS (SELECT 1 FROM medications m WHERE m.id = h.medication_id)",
    )?;
    let orphans: Vec<(i64, i64)> = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<_, _>>()?;
    drop(stmt);
    for (id, medication_id) in orphans {
        issues.push(ConsistencyIssue {
            category: "orphaned_history".into(),
            severity: "medium".into(),
            description: format!("History entry {id} references missing medication"),
            medication_id: Some(medication_id),
        });
    }

    // 3. Schedules that can never produce a dose
    let mut stmt = conn.prepare(
        "SELECT id, frequency_hours, treatment_duration_days FROM medications
         WHERE frequency_hours <= 0 OR treatment_duration_days <= 0",
    )?;
    let invalid: Vec<(i64, i64, i64)> = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
        })?
        .collect::<Result<_, _>>()?;
    drop(stmt);
    for (id, frequency, duration) in invalid {
        issues.push(ConsistencyIssue {
            category: "invalid_schedule".into(),
            severity: "low".into(),
            description: format!("Every {frequency}h for {duration} days"),
            medication_id: Some(id),
        });
    }

    let medications_checked: i64 =
        conn.query_row("SELECT COUNT(*) FROM medications", [], |row| row.get(0))?;

    Ok(ConsistencyReport {
        issues,
        medications_checked,
    })
}

/// Delete orphaned rows. Invalid schedules are left for the user to fix.
/// Returns the number of rows removed. Run inside the caller's transaction.
pub fn repair_consistency(conn: &Connection) -> Result<usize, DatabaseError> {
    let history = conn.execute(
        "DELETE FROM medication_history
         WHERE NOT EXISTS (SELECT 1 FROM medications m WHERE m.id = medication_history.medication_id)",
        [],
    )?;
    let medications = conn.execute(
        "DELETE FROM medications
         WHERE consultation_id IS NOT NULL
         AND NOT EXISTS (SELECT 1 FROM consultations c WHERE c.id = medications.consultation_id)",
        [],
    )?;

    if history + medications > 0 {
        tracing::info!(history, medications, "Removed orphaned rows");
    }
    Ok(history + medications)
}
