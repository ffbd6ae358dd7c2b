use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_history(conn: &Connection, entry: &MedicationHistory) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO medication_history (medication_id, timestamp, notes) VALUES (?1, ?2, ?3)",
        params![entry.medication_id, to_millis(&entry.timestamp), entry.notes],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(conn.last_insert_rowid())
}

pub fn delete_history(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let changed = conn
        .execute("DELETE FROM medication_history WHERE id = ?1", params![id])
        .map_err(DatabaseError::from_write)?;
    Ok(changed > 0)
}

/// Dose history for one medication, newest first.
pub fn list_history(
    conn: &Connection,
    medication_id: i64,
) -> Result<Vec<MedicationHistory>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, medication_id, timestamp, notes FROM medication_history
         WHERE medication_id = ?1 ORDER BY timestamp DESC, id DESC",
    )?;

    let rows = stmt.query_map(params![medication_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, medication_id, timestamp, notes) = row?;
        entries.push(MedicationHistory {
            id,
            medication_id,
            timestamp: from_millis(timestamp).ok_or(DatabaseError::InvalidTimestamp {
                field: "medication_history.timestamp".into(),
                value: timestamp,
            })?,
            notes,
        });
    }
    Ok(entries)
}
