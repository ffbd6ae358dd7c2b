use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::*;

const MEDICATION_COLUMNS: &str = "id, consultation_id, name, dose, frequency_hours,
     treatment_duration_days, purpose, additional_notes, start_time";

/// Insert a medication and return its new id. `med.id` is ignored.
///
/// Fails with `ConstraintViolation` if `consultation_id` names a
/// consultation that does not exist.
pub fn insert_medication(conn: &Connection, med: &Medication) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO medications (consultation_id, name, dose, frequency_hours,
         treatment_duration_days, purpose, additional_notes, start_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            med.consultation_id,
            med.name,
            med.dose,
            med.frequency_hours,
            med.treatment_duration_days,
            med.purpose,
            med.additional_notes,
            to_millis(&med.start_time),
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(conn.last_insert_rowid())
}

/// Replace a medication by id. Returns `false` when no row matched.
pub fn update_medication(conn: &Connection, med: &Medication) -> Result<bool, DatabaseError> {
    let changed = conn
        .execute(
            "UPDATE medications SET consultation_id = ?1, name = ?2, dose = ?3,
             frequency_hours = ?4, treatment_duration_days = ?5, purpose = ?6,
             additional_notes = ?7, start_time = ?8
             WHERE id = ?9",
            params![
                med.consultation_id,
                med.name,
                med.dose,
                med.frequency_hours,
                med.treatment_duration_days,
                med.purpose,
                med.additional_notes,
                to_millis(&med.start_time),
                med.id,
            ],
        )
        .map_err(DatabaseError::from_write)?;
    Ok(changed > 0)
}

/// Delete a medication and its dose history.
pub fn delete_medication(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let changed = conn
        .execute("DELETE FROM medications WHERE id = ?1", params![id])
        .map_err(DatabaseError::from_write)?;
    Ok(changed > 0)
}

pub fn get_medication(conn: &Connection, id: i64) -> Result<Option<Medication>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {MEDICATION_COLUMNS} FROM medications WHERE id = ?1"),
            params![id],
            medication_row_from_rusqlite,
        )
        .optional()?;
    row.map(medication_from_row).transpose()
}

/// All medications in insertion order.
pub fn list_medications(conn: &Connection) -> Result<Vec<Medication>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEDICATION_COLUMNS} FROM medications ORDER BY id"
    ))?;

    let rows = stmt.query_map([], medication_row_from_rusqlite)?;

    let mut meds = Vec::new();
    for row in rows {
        meds.push(medication_from_row(row?)?);
    }
    Ok(meds)
}

pub fn list_medications_for_consultation(
    conn: &Connection,
    consultation_id: i64,
) -> Result<Vec<Medication>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEDICATION_COLUMNS} FROM medications WHERE consultation_id = ?1 ORDER BY id"
    ))?;

    let rows = stmt.query_map(params![consultation_id], medication_row_from_rusqlite)?;

    let mut meds = Vec::new();
    for row in rows {
        meds.push(medication_from_row(row?)?);
    }
    Ok(meds)
}

/// Ids of the medications a consultation owns (what a cascade delete removes).
pub fn medication_ids_for_consultation(
    conn: &Connection,
    consultation_id: i64,
) -> Result<Vec<i64>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT id FROM medications WHERE consultation_id = ?1 ORDER BY id")?;
    let rows = stmt.query_map(params![consultation_id], |row| row.get::<_, i64>(0))?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

// Internal row type for Medication mapping
struct MedicationRow {
    id: i64,
    consultation_id: Option<i64>,
    name: String,
    dose: String,
    frequency_hours: i64,
    treatment_duration_days: i64,
    purpose: String,
    additional_notes: String,
    start_time: i64,
}

fn medication_row_from_rusqlite(row: &rusqlite::Row<'_>) -> rusqlite::Result<MedicationRow> {
    Ok(MedicationRow {
        id: row.get(0)?,
        consultation_id: row.get(1)?,
        name: row.get(2)?,
        dose: row.get(3)?,
        frequency_hours: row.get(4)?,
        treatment_duration_days: row.get(5)?,
        purpose: row.get(6)?,
        additional_notes: row.get(7)?,
        start_time: row.get(8)?,
    })
}

fn medication_from_row(row: MedicationRow) -> Result<Medication, DatabaseError> {
    Ok(Medication {
        id: row.id,
        consultation_id: row.consultation_id,
        name: row.name,
        dose: row.dose,
        frequency_hours: schedule_value(row.frequency_hours),
        treatment_duration_days: schedule_value(row.treatment_duration_days),
        purpose: row.purpose,
        additional_notes: row.additional_notes,
        start_time: from_millis(row.start_time).ok_or(DatabaseError::InvalidTimestamp {
            field: "medications.start_time".into(),
            value: row.start_time,
        })?,
    })
}

/// Rows written outside this crate may hold negative or oversized schedule
/// values. Negatives read as 0, which `check_consistency` reports as an
/// invalid schedule and the scheduler refuses to arm.
fn schedule_value(raw: i64) -> u32 {
    u32::try_from(raw.max(0)).unwrap_or(u32::MAX)
}
