use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_consultation(conn: &Connection, c: &Consultation) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO consultations (doctor_name, diagnosis, date, notes)
         VALUES (?1, ?2, ?3, ?4)",
        params![c.doctor_name, c.diagnosis, to_millis(&c.date), c.notes],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(conn.last_insert_rowid())
}

/// Replace a consultation by id. Returns `false` when no row matched.
pub fn update_consultation(conn: &Connection, c: &Consultation) -> Result<bool, DatabaseError> {
    let changed = conn
        .execute(
            "UPDATE consultations SET doctor_name = ?1, diagnosis = ?2, date = ?3, notes = ?4
             WHERE id = ?5",
            params![c.doctor_name, c.diagnosis, to_millis(&c.date), c.notes, c.id],
        )
        .map_err(DatabaseError::from_write)?;
    Ok(changed > 0)
}

/// Delete a consultation; its medications and their history go with it.
pub fn delete_consultation(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let changed = conn
        .execute("DELETE FROM consultations WHERE id = ?1", params![id])
        .map_err(DatabaseError::from_write)?;
    Ok(changed > 0)
}

pub fn get_consultation(conn: &Connection, id: i64) -> Result<Option<Consultation>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, doctor_name, diagnosis, date, notes FROM consultations WHERE id = ?1",
            params![id],
            consultation_row_from_rusqlite,
        )
        .optional()?;
    row.map(consultation_from_row).transpose()
}

/// All consultations, most recent visit first.
pub fn list_consultations(conn: &Connection) -> Result<Vec<Consultation>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, doctor_name, diagnosis, date, notes
         FROM consultations ORDER BY date DESC, id DESC",
    )?;

    let rows = stmt.query_map([], consultation_row_from_rusqlite)?;

    let mut consultations = Vec::new();
    for row in rows {
        consultations.push(consultation_from_row(row?)?);
    }
    Ok(consultations)
}

// Internal row type for Consultation mapping
struct ConsultationRow {
    id: i64,
    doctor_name: String,
    diagnosis: String,
    date: i64,
    notes: String,
}

fn consultation_row_from_rusqlite(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConsultationRow> {
    Ok(ConsultationRow {
        id: row.get(0)?,
        doctor_name: row.get(1)?,
        diagnosis: row.get(2)?,
        date: row.get(3)?,
        notes: row.get(4)?,
    })
}

fn consultation_from_row(row: ConsultationRow) -> Result<Consultation, DatabaseError> {
    Ok(Consultation {
        id: row.id,
        doctor_name: row.doctor_name,
        diagnosis: row.diagnosis,
        date: from_millis(row.date).ok_or(DatabaseError::InvalidTimestamp {
            field: "consultations.date".into(),
            value: row.date,
        })?,
        notes: row.notes,
    })
}
