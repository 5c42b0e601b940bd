// 🔀 Membership & Transfer Manager - who belongs to which Upa Bial
//
// Transfer is the one sanctioned rewrite of history: every log of the
// family follows it to the destination unit. Unassign and delete leave
// other families' logs alone.
//
// Lock state is not checked here; the service gates every call.

use crate::db;
use crate::deduplication::same_name;
use crate::entities::bial::validate_bial_name;
use crate::entities::family::sort_roster;
use crate::entities::Family;
use crate::error::{LedgerError, Result};
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub family: Family,
    pub from_bial: Option<String>,
    pub logs_moved: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRemoveOutcome {
    pub removed: Vec<String>,
    /// Ids that did not match any family
    pub skipped: Vec<String>,
}

/// Name/serial edit. `ip_serial_no: None` leaves the serial alone unless
/// `clear_serial` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ip_serial_no: Option<i64>,
    #[serde(default)]
    pub clear_serial: bool,
}

// ============================================================================
// ROSTER
// ============================================================================

/// Current roster of a unit, in display order
pub fn roster(conn: &Connection, bial: &str) -> Result<Vec<Family>> {
    let mut families = db::families_in_bial(conn, bial)?;
    sort_roster(&mut families);
    Ok(families)
}

fn find_by_name_in_roster<'a>(roster: &'a [Family], name: &str) -> Option<&'a Family> {
    roster.iter().find(|f| same_name(&f.name, name))
}

fn require_family(conn: &Connection, family_id: &str) -> Result<Family> {
    db::get_family(conn, family_id)?.ok_or_else(|| LedgerError::not_found("family", family_id))
}

// ============================================================================
// OPERATIONS
// ============================================================================

pub fn add_family(conn: &Connection, bial: &str, name: &str) -> Result<Family> {
    validate_bial_name(bial)?;
    if name.trim().is_empty() {
        return Err(LedgerError::validation("family name must not be empty"));
    }

    let current = db::families_in_bial(conn, bial)?;
    if find_by_name_in_roster(&current, name).is_some() {
        return Err(LedgerError::DuplicateFamily {
            name: name.trim().to_string(),
            bial: bial.to_string(),
        });
    }

    let family = Family::new(name, bial);
    db::insert_family(conn, &family)?;
    Ok(family)
}

/// Move a family and all of its logs (every year) to `destination`
pub fn transfer_family(
    conn: &mut Connection,
    family_id: &str,
    destination: &str,
) -> Result<TransferOutcome> {
    validate_bial_name(destination)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut family = require_family(&tx, family_id)?;
    let from_bial = family.current_bial.clone();

    db::set_family_bial(&tx, family_id, Some(destination))?;
    let logs_moved = db::reassign_family_logs(&tx, family_id, destination)?;

    tx.commit()?;

    family.current_bial = Some(destination.to_string());
    Ok(TransferOutcome {
        family,
        from_bial,
        logs_moved,
    })
}

pub fn unassign_family(conn: &Connection, family_id: &str) -> Result<Family> {
    let mut family = require_family(conn, family_id)?;
    db::set_family_bial(conn, family_id, None)?;
    family.current_bial = None;
    Ok(family)
}

/// Hard delete of the family and every one of its logs
pub fn remove_family(conn: &mut Connection, family_id: &str) -> Result<Family> {
    let tx = conn.transaction()?;
    let family = require_family(&tx, family_id)?;
    db::delete_family(&tx, family_id)?;
    tx.commit()?;
    Ok(family)
}

/// Same cascade as remove_family for many ids, committed together.
/// Unknown ids are skipped rather than failing the batch.
pub fn bulk_remove_families(conn: &mut Connection, family_ids: &[String]) -> Result<BulkRemoveOutcome> {
    let tx = conn.transaction()?;
    let mut outcome = BulkRemoveOutcome::default();

    for id in family_ids {
        if db::delete_family(&tx, id)? > 0 {
            outcome.removed.push(id.clone());
        } else {
            outcome.skipped.push(id.clone());
        }
    }

    tx.commit()?;
    Ok(outcome)
}

pub fn update_family_details(
    conn: &Connection,
    family_id: &str,
    update: &FamilyUpdate,
) -> Result<Family> {
    let mut family = require_family(conn, family_id)?;

    if let Some(name) = &update.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::validation("family name must not be empty"));
        }

        if let Some(bial) = &family.current_bial {
            let current = db::families_in_bial(conn, bial)?;
            let clash = current
                .iter()
                .any(|f| f.id != family.id && same_name(&f.name, name));
            if clash {
                return Err(LedgerError::DuplicateFamily {
                    name: name.to_string(),
                    bial: bial.clone(),
                });
            }
        }
        family.name = name.to_string();
    }

    if update.clear_serial {
        family.ip_serial_no = None;
    } else if update.ip_serial_no.is_some() {
        family.ip_serial_no = update.ip_serial_no;
    }

    db::update_family_fields(conn, family_id, &family.name, family.ip_serial_no)?;
    Ok(family)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Tithe, TitheLog};

    fn conn() -> Connection {
        db::open_in_memory().unwrap()
    }

    #[test]
    fn test_add_family_rejects_duplicate_in_same_bial() {
        let conn = conn();
        add_family(&conn, "Bial 1", "Lal").unwrap();

        let dup = add_family(&conn, "Bial 1", "  lal ");
        assert!(matches!(dup, Err(LedgerError::DuplicateFamily { .. })));

        // Same name in another unit is fine
        assert!(add_family(&conn, "Bial 2", "Lal").is_ok());
    }

    #[test]
    fn test_add_family_rejects_blank_name() {
        let conn = conn();
        assert!(matches!(
            add_family(&conn, "Bial 1", "   "),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_transfer_moves_family_and_history() {
        let mut conn = conn();
        let family = add_family(&conn, "Bial 1", "Lal").unwrap();
        for (year, month) in [(2023, 12), (2024, 1), (2024, 2)] {
            let log = TitheLog::new(year, month, &family.id, "Bial 1", Tithe::new(10.0, 0.0, 0.0));
            db::insert_log(&conn, &log).unwrap();
        }

        let outcome = transfer_family(&mut conn, &family.id, "Bial 2").unwrap();

        assert_eq!(outcome.from_bial.as_deref(), Some("Bial 1"));
        assert_eq!(outcome.logs_moved, 3);
        assert!(roster(&conn, "Bial 1").unwrap().is_empty());
        assert_eq!(roster(&conn, "Bial 2").unwrap().len(), 1);
        for year in [2023, 2024] {
            for log in db::logs_for_family(&conn, year, &family.id).unwrap() {
                assert_eq!(log.upa_bial, "Bial 2");
            }
        }
    }

    #[test]
    fn test_transfer_unknown_family() {
        let mut conn = conn();
        assert!(matches!(
            transfer_family(&mut conn, "nope", "Bial 2"),
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_unassign_keeps_family_and_logs() {
        let conn = conn();
        let family = add_family(&conn, "Bial 1", "Lal").unwrap();
        let log = TitheLog::new(2024, 1, &family.id, "Bial 1", Tithe::new(10.0, 0.0, 0.0));
        db::insert_log(&conn, &log).unwrap();

        let unassigned = unassign_family(&conn, &family.id).unwrap();

        assert!(!unassigned.is_assigned());
        assert!(roster(&conn, "Bial 1").unwrap().is_empty());
        assert_eq!(db::unassigned_families(&conn).unwrap().len(), 1);
        let logs = db::logs_for_family(&conn, 2024, &family.id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].upa_bial, "Bial 1");
    }

    #[test]
    fn test_bulk_remove_skips_unknown_ids() {
        let mut conn = conn();
        let a = add_family(&conn, "Bial 1", "A").unwrap();
        let b = add_family(&conn, "Bial 1", "B").unwrap();
        db::insert_log(&conn, &TitheLog::new(2024, 1, &a.id, "Bial 1", Tithe::zero())).unwrap();

        let outcome = bulk_remove_families(
            &mut conn,
            &[a.id.clone(), "ghost".to_string(), b.id.clone()],
        )
        .unwrap();

        assert_eq!(outcome.removed, vec![a.id.clone(), b.id.clone()]);
        assert_eq!(outcome.skipped, vec!["ghost".to_string()]);
        assert!(roster(&conn, "Bial 1").unwrap().is_empty());
        assert!(db::logs_for_family(&conn, 2024, &a.id).unwrap().is_empty());
    }

    #[test]
    fn test_remove_family_not_found() {
        let mut conn = conn();
        assert!(matches!(
            remove_family(&mut conn, "ghost"),
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_update_family_details() {
        let conn = conn();
        let lal = add_family(&conn, "Bial 1", "Lal").unwrap();
        add_family(&conn, "Bial 1", "Mawia").unwrap();

        let updated = update_family_details(
            &conn,
            &lal.id,
            &FamilyUpdate { name: Some(" Lalpuia ".into()), ip_serial_no: Some(7), clear_serial: false },
        )
        .unwrap();
        assert_eq!(updated.name, "Lalpuia");
        assert_eq!(updated.ip_serial_no, Some(7));

        let clash = update_family_details(
            &conn,
            &lal.id,
            &FamilyUpdate { name: Some("mawia".into()), ..Default::default() },
        );
        assert!(matches!(clash, Err(LedgerError::DuplicateFamily { .. })));

        let cleared = update_family_details(
            &conn,
            &lal.id,
            &FamilyUpdate { clear_serial: true, ..Default::default() },
        )
        .unwrap();
        assert_eq!(cleared.ip_serial_no, None);
        assert_eq!(cleared.name, "Lalpuia");
    }
}
