// ✍️ Upsert Engine - atomic read-modify-write of a monthly tithe log
//
// One IMMEDIATE transaction per call: the write lock is taken before the
// existence read, so two concurrent category edits on the same
// (year, month, family) serialize instead of both seeding zeros.
//
// The engine does not consult the archival gate. Callers do.

use crate::db;
use crate::entities::tithe::validate_month;
use crate::entities::{TitheLog, TithePatch};
use crate::error::{LedgerError, Result};
use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    /// True when no log existed and one was created
    pub created: bool,

    /// The log as stored after the write
    pub log: TitheLog,
}

pub fn update_tithe(
    conn: &mut Connection,
    year: i32,
    month: u32,
    upa_bial: &str,
    family_id: &str,
    patch: &TithePatch,
) -> Result<UpsertOutcome> {
    validate_month(month)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if db::get_family(&tx, family_id)?.is_none() {
        return Err(LedgerError::not_found("family", family_id));
    }

    let outcome = match db::get_log(&tx, year, month, family_id)? {
        Some(mut log) => {
            // Existing attribution is preserved for both patch shapes
            log.tithe = patch.apply(Some(log.tithe));
            log.last_updated = Utc::now();
            db::update_log_tithe(&tx, year, month, family_id, &log.tithe, log.last_updated)?;
            UpsertOutcome { created: false, log }
        }
        None => {
            let log = TitheLog::new(year, month, family_id, upa_bial, patch.apply(None));
            db::insert_log(&tx, &log)?;
            UpsertOutcome { created: true, log }
        }
    };

    tx.commit()?;
    Ok(outcome)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Category, Family, Tithe};

    fn setup() -> (Connection, Family) {
        let conn = db::open_in_memory().unwrap();
        let family = Family::new("Lal", "Bial 1");
        db::insert_family(&conn, &family).unwrap();
        (conn, family)
    }

    #[test]
    fn test_first_delta_creates_zero_seeded_log() {
        let (mut conn, family) = setup();

        let outcome = update_tithe(
            &mut conn,
            2024,
            2,
            "Bial 1",
            &family.id,
            &TithePatch::category(Category::Ramthar, 50.0),
        )
        .unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.log.upa_bial, "Bial 1");
        assert_eq!(outcome.log.tithe, Tithe::new(0.0, 50.0, 0.0));
    }

    #[test]
    fn test_same_delta_twice_is_not_doubled() {
        let (mut conn, family) = setup();
        let patch = TithePatch::category(Category::PathianRam, 100.0);

        update_tithe(&mut conn, 2024, 1, "Bial 1", &family.id, &patch).unwrap();
        let second = update_tithe(&mut conn, 2024, 1, "Bial 1", &family.id, &patch).unwrap();

        assert!(!second.created);
        let stored = db::get_log(&conn, 2024, 1, &family.id).unwrap().unwrap();
        assert_eq!(stored.tithe.pathian_ram, 100.0);
    }

    #[test]
    fn test_deltas_on_different_categories_merge() {
        let (mut conn, family) = setup();

        update_tithe(&mut conn, 2024, 1, "Bial 1", &family.id, &TithePatch::category(Category::PathianRam, 100.0)).unwrap();
        update_tithe(&mut conn, 2024, 1, "Bial 1", &family.id, &TithePatch::category(Category::Ramthar, 30.0)).unwrap();
        update_tithe(&mut conn, 2024, 1, "Bial 1", &family.id, &TithePatch::category(Category::Tualchhung, 5.0)).unwrap();

        let stored = db::get_log(&conn, 2024, 1, &family.id).unwrap().unwrap();
        assert_eq!(stored.tithe, Tithe::new(100.0, 30.0, 5.0));
        assert_eq!(stored.total(), 135.0);
    }

    #[test]
    fn test_existing_upa_bial_is_preserved() {
        let (mut conn, family) = setup();

        update_tithe(&mut conn, 2024, 1, "Bial 1", &family.id, &TithePatch::FullReplace(Tithe::new(10.0, 0.0, 0.0))).unwrap();

        // Caller now passes a different unit; attribution stays with the first write
        let outcome = update_tithe(&mut conn, 2024, 1, "Bial 2", &family.id, &TithePatch::FullReplace(Tithe::new(20.0, 1.0, 0.0))).unwrap();

        assert_eq!(outcome.log.upa_bial, "Bial 1");
        assert_eq!(outcome.log.tithe, Tithe::new(20.0, 1.0, 0.0));
    }

    #[test]
    fn test_unknown_family_is_not_found() {
        let (mut conn, _family) = setup();

        let result = update_tithe(
            &mut conn,
            2024,
            1,
            "Bial 1",
            "missing",
            &TithePatch::category(Category::Ramthar, 1.0),
        );

        assert!(matches!(result, Err(LedgerError::NotFound { .. })));
    }

    #[test]
    fn test_invalid_month_rejected() {
        let (mut conn, family) = setup();

        let result = update_tithe(
            &mut conn,
            2024,
            13,
            "Bial 1",
            &family.id,
            &TithePatch::category(Category::Ramthar, 1.0),
        );

        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }
}
