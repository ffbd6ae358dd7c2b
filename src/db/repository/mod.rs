//! Repository layer: entity-scoped database operations.
//!
//! Plain functions over a borrowed `Connection`. Updates and deletes report
//! whether a row matched instead of failing on a missing id.

mod consistency;
mod consultation;
mod history;
mod medication;

pub use consistency::*;
pub use consultation::*;
pub use history::*;
pub use medication::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::db::DatabaseError;
    use crate::models::*;
    use chrono::{TimeZone, Utc};
    use rusqlite::Connection;

    fn test_db() -> Connection {
        open_memory_database().unwrap()
    }

    fn consultation(doctor: &str, date_ms: i64) -> Consultation {
        Consultation {
            id: 0,
            doctor_name: doctor.into(),
            diagnosis: "Flu".into(),
            date: Utc.timestamp_millis_opt(date_ms).unwrap(),
            notes: String::new(),
        }
    }

    fn medication(consultation_id: Option<i64>, name: &str) -> Medication {
        Medication {
            id: 0,
            consultation_id,
            name: name.into(),
            dose: "500mg".into(),
            frequency_hours: 8,
            treatment_duration_days: 7,
            purpose: "Infection".into(),
            additional_notes: String::new(),
            start_time: Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
        }
    }

    fn history(medication_id: i64, ts_ms: i64) -> MedicationHistory {
        MedicationHistory {
            id: 0,
            medication_id,
            timestamp: Utc.timestamp_millis_opt(ts_ms).unwrap(),
            notes: "taken".into(),
        }
    }

    // ── Consultations ───────────────────────────────────────

    #[test]
    fn consultation_ids_are_monotonic() {
        let conn = test_db();
        let a = insert_consultation(&conn, &consultation("Dr. Lee", 1_000)).unwrap();
        let b = insert_consultation(&conn, &consultation("Dr. Kim", 2_000)).unwrap();
        assert_eq!(a, 1);
        assert!(b > a);
    }

    #[test]
    fn deleted_consultation_id_is_not_reused() {
        let conn = test_db();
        let a = insert_consultation(&conn, &consultation("Dr. Lee", 1_000)).unwrap();
        delete_consultation(&conn, a).unwrap();
        let b = insert_consultation(&conn, &consultation("Dr. Kim", 2_000)).unwrap();
        assert!(b > a);
    }

    #[test]
    fn consultations_list_newest_first() {
        let conn = test_db();
        insert_consultation(&conn, &consultation("Old", 1_000)).unwrap();
        insert_consultation(&conn, &consultation("New", 3_000)).unwrap();
        insert_consultation(&conn, &consultation("Mid", 2_000)).unwrap();

        let names: Vec<_> = list_consultations(&conn)
            .unwrap()
            .into_iter()
            .map(|c| c.doctor_name)
            .collect();
        assert_eq!(names, vec!["New", "Mid", "Old"]);
    }

    #[test]
    fn consultation_update_replaces_fields() {
        let conn = test_db();
        let id = insert_consultation(&conn, &consultation("Dr. Lee", 1_000)).unwrap();
        let mut edited = get_consultation(&conn, id).unwrap().unwrap();
        edited.diagnosis = "Cold".into();
        edited.notes = "Rest".into();

        assert!(update_consultation(&conn, &edited).unwrap());
        assert_eq!(get_consultation(&conn, id).unwrap().unwrap(), edited);
    }

    #[test]
    fn update_missing_consultation_is_noop() {
        let conn = test_db();
        let mut ghost = consultation("Dr. Nobody", 1_000);
        ghost.id = 42;
        assert!(!update_consultation(&conn, &ghost).unwrap());
        assert!(list_consultations(&conn).unwrap().is_empty());
    }

    #[test]
    fn delete_missing_consultation_is_noop() {
        let conn = test_db();
        assert!(!delete_consultation(&conn, 42).unwrap());
    }

    #[test]
    fn get_missing_consultation_is_none() {
        let conn = test_db();
        assert!(get_consultation(&conn, 7).unwrap().is_none());
    }

    // ── Medications ─────────────────────────────────────────

    #[test]
    fn medication_roundtrip_preserves_fields() {
        let conn = test_db();
        let cid = insert_consultation(&conn, &consultation("Dr. Lee", 1_000)).unwrap();
        let med = medication(Some(cid), "Amoxicillin");
        let id = insert_medication(&conn, &med).unwrap();

        let stored = get_medication(&conn, id).unwrap().unwrap();
        assert_eq!(stored, Medication { id, ..med });
    }

    #[test]
    fn medication_without_consultation_is_allowed() {
        let conn = test_db();
        let id = insert_medication(&conn, &medication(None, "Vitamin D")).unwrap();
        assert_eq!(get_medication(&conn, id).unwrap().unwrap().consultation_id, None);
    }

    #[test]
    fn medication_for_missing_consultation_violates_constraint() {
        let conn = test_db();
        let err = insert_medication(&conn, &medication(Some(99), "Amoxicillin")).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)), "got {err:?}");
        assert!(list_medications(&conn).unwrap().is_empty());
    }

    #[test]
    fn medications_filtered_by_consultation_in_insertion_order() {
        let conn = test_db();
        let a = insert_consultation(&conn, &consultation("A", 1_000)).unwrap();
        let b = insert_consultation(&conn, &consultation("B", 2_000)).unwrap();
        insert_medication(&conn, &medication(Some(a), "First")).unwrap();
        insert_medication(&conn, &medication(Some(b), "Other")).unwrap();
        insert_medication(&conn, &medication(Some(a), "Second")).unwrap();

        let names: Vec<_> = list_medications_for_consultation(&conn, a)
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["First", "Second"]);
        assert_eq!(list_medications(&conn).unwrap().len(), 3);
        assert_eq!(medication_ids_for_consultation(&conn, a).unwrap(), vec![1, 3]);
    }

    #[test]
    fn medication_update_keeps_id() {
        let conn = test_db();
        let id = insert_medication(&conn, &medication(None, "Amoxicillin")).unwrap();
        let mut edited = get_medication(&conn, id).unwrap().unwrap();
        edited.dose = "250mg".into();

        assert!(update_medication(&conn, &edited).unwrap());
        let all = list_medications(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].dose, "250mg");
    }

    #[test]
    fn negative_schedule_values_read_as_zero() {
        let conn = test_db();
        let id = insert_medication(&conn, &medication(None, "Legacy")).unwrap();
        conn.execute(
            "UPDATE medications SET frequency_hours = -1, treatment_duration_days = -7 WHERE id = ?1",
            [id],
        )
        .unwrap();

        let med = get_medication(&conn, id).unwrap().unwrap();
        assert_eq!(med.frequency_hours, 0);
        assert_eq!(med.treatment_duration_days, 0);
        assert_eq!(list_medications(&conn).unwrap().len(), 1);

        let report = check_consistency(&conn).unwrap();
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].category, "invalid_schedule");
    }

    // ── Cascades ────────────────────────────────────────────

    #[test]
    fn deleting_consultation_cascades_two_levels() {
        let conn = test_db();
        let cid = insert_consultation(&conn, &consultation("Dr. Lee", 1_000)).unwrap();
        let keep = insert_consultation(&conn, &consultation("Dr. Kim", 2_000)).unwrap();
        let m1 = insert_medication(&conn, &medication(Some(cid), "A")).unwrap();
        let m2 = insert_medication(&conn, &medication(Some(cid), "B")).unwrap();
        let other = insert_medication(&conn, &medication(Some(keep), "C")).unwrap();
        insert_history(&conn, &history(m1, 10)).unwrap();
        insert_history(&conn, &history(m2, 20)).unwrap();
        insert_history(&conn, &history(other, 30)).unwrap();

        assert!(delete_consultation(&conn, cid).unwrap());

        assert!(list_medications_for_consultation(&conn, cid).unwrap().is_empty());
        assert!(list_history(&conn, m1).unwrap().is_empty());
        assert!(list_history(&conn, m2).unwrap().is_empty());
        assert_eq!(list_history(&conn, other).unwrap().len(), 1);
        assert_eq!(list_medications(&conn).unwrap().len(), 1);
    }

    #[test]
    fn deleting_medication_cascades_history() {
        let conn = test_db();
        let id = insert_medication(&conn, &medication(None, "A")).unwrap();
        insert_history(&conn, &history(id, 10)).unwrap();
        assert!(delete_medication(&conn, id).unwrap());
        assert!(list_history(&conn, id).unwrap().is_empty());
    }

    // ── History ─────────────────────────────────────────────

    #[test]
    fn history_newest_first() {
        let conn = test_db();
        let id = insert_medication(&conn, &medication(None, "A")).unwrap();
        insert_history(&conn, &history(id, 10)).unwrap();
        insert_history(&conn, &history(id, 30)).unwrap();
        insert_history(&conn, &history(id, 20)).unwrap();

        let stamps: Vec<_> = list_history(&conn, id)
            .unwrap()
            .into_iter()
            .map(|h| h.timestamp.timestamp_millis())
            .collect();
        assert_eq!(stamps, vec![30, 20, 10]);
    }

    #[test]
    fn history_for_missing_medication_violates_constraint() {
        let conn = test_db();
        let err = insert_history(&conn, &history(5, 10)).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    // ── Consistency ─────────────────────────────────────────

    #[test]
    fn clean_database_reports_no_issues() {
        let conn = test_db();
        let cid = insert_consultation(&conn, &consultation("Dr. Lee", 1_000)).unwrap();
        insert_medication(&conn, &medication(Some(cid), "A")).unwrap();

        let report = check_consistency(&conn).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.medications_checked, 1);
    }

    #[test]
    fn orphans_are_reported_and_repaired() {
        let conn = test_db();
        conn.execute_batch("PRAGMA foreign_keys=OFF;").unwrap();
        let orphan = insert_medication(&conn, &medication(Some(77), "Orphan")).unwrap();
        insert_history(&conn, &history(555, 10)).unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        let mut bad = medication(None, "Zero");
        bad.frequency_hours = 0;
        let zero = insert_medication(&conn, &bad).unwrap();

        let report = check_consistency(&conn).unwrap();
        let categories: Vec<_> = report.issues.iter().map(|i| i.category.as_str()).collect();
        assert_eq!(
            categories,
            vec!["orphaned_medication", "orphaned_history", "invalid_schedule"]
        );
        assert_eq!(report.issues[0].medication_id, Some(orphan));
        assert_eq!(report.issues[2].medication_id, Some(zero));

        assert_eq!(repair_consistency(&conn).unwrap(), 2);
        let after = check_consistency(&conn).unwrap();
        assert_eq!(after.issues.len(), 1);
        assert_eq!(after.issues[0].category, "invalid_schedule");
    }
}
