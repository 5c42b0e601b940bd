// ⚖️ Import Reconciler - merge external sheets into rosters and monthly logs
//
// Two modes:
//   1. Name-only import grows a unit roster (added / skipped / reactivated)
//   2. Contribution import writes one month of tithes (updated / skipped)
//
// A bad row never aborts the batch: it is classified as skipped and the
// rest of the sheet continues. The writes of one batch commit together.

use crate::db;
use crate::deduplication::{collapse_by_name, name_key, same_name};
use crate::entities::bial::validate_bial_name;
use crate::entities::family::sort_roster;
use crate::entities::tithe::validate_month;
use crate::entities::{Family, TitheLog};
use crate::error::Result;
use crate::parser::{ContributionRow, FamilyRow, NumericPolicy};
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

pub const REASON_NOT_FOUND: &str = "Family not found in this Upa Bial";
pub const REASON_DUPLICATE_IN_FILE: &str = "Duplicate name in file";
pub const REASON_ALREADY_UPDATED: &str = "Family already updated by an earlier row";

// ============================================================================
// IMPORT REPORTS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyImportReport {
    pub added: usize,
    pub skipped: usize,
    /// Previously unassigned families re-attached to the unit
    pub reactivated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRow {
    /// 1-based position in the input
    pub row: usize,
    pub name: String,
    pub ip_serial_no: Option<i64>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionImportReport {
    pub updated: usize,
    pub skipped: usize,
    pub skipped_info: Vec<SkippedRow>,
}

impl ContributionImportReport {
    fn skip(&mut self, row: usize, source: &ContributionRow, reason: &str) {
        self.skipped += 1;
        self.skipped_info.push(SkippedRow {
            row,
            name: source.name.clone(),
            ip_serial_no: source.ip_serial_no,
            reason: reason.to_string(),
        });
    }

    pub fn summary(&self) -> String {
        format!("{} updated, {} skipped", self.updated, self.skipped)
    }
}

// ============================================================================
// IMPORT RECONCILER
// ============================================================================

pub struct ImportReconciler {
    /// How unreadable numeric cells are treated (default: permissive)
    pub policy: NumericPolicy,
}

impl ImportReconciler {
    pub fn new() -> Self {
        ImportReconciler {
            policy: NumericPolicy::Permissive,
        }
    }

    pub fn with_policy(policy: NumericPolicy) -> Self {
        ImportReconciler { policy }
    }

    /// Grow the roster of `bial` from a name list.
    ///
    /// Input names are collapsed by normalized key (first occurrence wins).
    /// A name already on the roster is skipped; a name matching an
    /// unassigned family re-attaches that family; anything else is created.
    pub fn import_families(
        &self,
        conn: &mut Connection,
        bial: &str,
        rows: Vec<FamilyRow>,
    ) -> Result<FamilyImportReport> {
        validate_bial_name(bial)?;

        let collapsed = collapse_by_name(rows, |r| r.name.as_str());
        let mut report = FamilyImportReport {
            skipped: collapsed.duplicates.len() + collapsed.blank.len(),
            ..Default::default()
        };

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let roster_keys: HashSet<String> = db::families_in_bial(&tx, bial)?
            .iter()
            .map(Family::name_key)
            .collect();
        let mut unassigned = db::unassigned_families(&tx)?;

        for row in collapsed.unique {
            let key = name_key(&row.name);

            if roster_keys.contains(&key) {
                report.skipped += 1;
                continue;
            }

            if let Some(pos) = unassigned.iter().position(|f| f.name_key() == key) {
                let family = unassigned.remove(pos);
                db::set_family_bial(&tx, &family.id, Some(bial))?;
                if row.ip_serial_no.is_some() {
                    db::update_family_fields(&tx, &family.id, &family.name, row.ip_serial_no)?;
                }
                debug!(family_id = %family.id, bial, "reactivated unassigned family");
                report.reactivated += 1;
                continue;
            }

            let family = Family::new(&row.name, bial).with_serial(row.ip_serial_no);
            db::insert_family(&tx, &family)?;
            report.added += 1;
        }

        tx.commit()?;
        Ok(report)
    }

    /// Write one month of contributions for `bial`.
    ///
    /// Each row is matched to a roster family by serial number first, then
    /// by normalized name. Matched rows overwrite the month's log (full
    /// replace) attributed to `bial`. Unmatched rows are skipped; families
    /// are never created here.
    pub fn import_contributions(
        &self,
        conn: &mut Connection,
        year: i32,
        month: u32,
        bial: &str,
        rows: Vec<ContributionRow>,
    ) -> Result<ContributionImportReport> {
        validate_month(month)?;
        validate_bial_name(bial)?;

        let mut report = ContributionImportReport::default();

        // Duplicate names are dropped before any matching happens
        let indexed: Vec<(usize, ContributionRow)> =
            rows.into_iter().enumerate().map(|(i, r)| (i + 1, r)).collect();
        let collapsed = collapse_by_name(indexed, |(_, r)| r.name.as_str());
        for (row_no, row) in &collapsed.duplicates {
            report.skip(*row_no, row, REASON_DUPLICATE_IN_FILE);
        }

        // Blank names can still match by serial
        let mut candidates = collapsed.unique;
        candidates.extend(collapsed.blank);
        candidates.sort_by_key(|(row_no, _)| *row_no);

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut roster = db::families_in_bial(&tx, bial)?;
        sort_roster(&mut roster);
        let mut written: HashSet<String> = HashSet::new();

        for (row_no, row) in candidates {
            if !row.invalid_columns.is_empty() {
                match self.policy {
                    NumericPolicy::Strict => {
                        let reason = format!("Invalid number in column {}", row.invalid_columns.join(", "));
                        report.skip(row_no, &row, &reason);
                        continue;
                    }
                    NumericPolicy::Permissive => {
                        debug!(row = row_no, columns = ?row.invalid_columns, "coerced unreadable cells to 0");
                    }
                }
            }

            let family = match match_family(&roster, &row) {
                Some(family) => family,
                None => {
                    report.skip(row_no, &row, REASON_NOT_FOUND);
                    continue;
                }
            };

            if !written.insert(family.id.clone()) {
                report.skip(row_no, &row, REASON_ALREADY_UPDATED);
                continue;
            }

            let log = TitheLog::new(year, month, &family.id, bial, row.tithe.sanitized());
            db::replace_log(&tx, &log)?;
            report.updated += 1;
        }

        tx.commit()?;

        report.skipped_info.sort_by_key(|s| s.row);
        Ok(report)
    }
}

impl Default for ImportReconciler {
    fn default() -> Self {
        Self::new()
    }
}

/// Serial number first, then normalized name
fn match_family<'a>(roster: &'a [Family], row: &ContributionRow) -> Option<&'a Family> {
    if let Some(serial) = row.ip_serial_no {
        if let Some(family) = roster.iter().find(|f| f.ip_serial_no == Some(serial)) {
            return Some(family);
        }
    }

    if row.name.trim().is_empty() {
        return None;
    }

    roster.iter().find(|f| same_name(&f.name, &row.name))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Tithe;
    use crate::membership;

    fn conn() -> Connection {
        db::open_in_memory().unwrap()
    }

    #[test]
    fn test_name_import_dedup_into_empty_bial() {
        let mut conn = conn();
        let engine = ImportReconciler::new();

        let rows = vec![
            FamilyRow::new("A", None),
            FamilyRow::new("a ", None),
            FamilyRow::new("B", None),
        ];

        let report = engine.import_families(&mut conn, "Bial 1", rows).unwrap();

        assert_eq!(report.added, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.reactivated, 0);
        assert_eq!(membership::roster(&conn, "Bial 1").unwrap().len(), 2);
    }

    #[test]
    fn test_name_import_skips_existing_roster_names() {
        let mut conn = conn();
        membership::add_family(&conn, "Bial 1", "Lal").unwrap();
        let engine = ImportReconciler::new();

        let report = engine
            .import_families(&mut conn, "Bial 1", vec![FamilyRow::new(" LAL", Some(4)), FamilyRow::new("Mawia", Some(5))])
            .unwrap();

        assert_eq!(report, FamilyImportReport { added: 1, skipped: 1, reactivated: 0 });

        let roster = membership::roster(&conn, "Bial 1").unwrap();
        let mawia = roster.iter().find(|f| f.name == "Mawia").unwrap();
        assert_eq!(mawia.ip_serial_no, Some(5));
    }

    #[test]
    fn test_name_import_reactivates_unassigned_family() {
        let mut conn = conn();
        let lal = membership::add_family(&conn, "Bial 1", "Lal").unwrap();
        membership::unassign_family(&conn, &lal.id).unwrap();
        let engine = ImportReconciler::new();

        let report = engine
            .import_families(&mut conn, "Bial 2", vec![FamilyRow::new("lal", Some(9))])
            .unwrap();

        assert_eq!(report.reactivated, 1);
        assert_eq!(report.added, 0);
        let family = db::get_family(&conn, &lal.id).unwrap().unwrap();
        assert!(family.is_in("Bial 2"));
        assert_eq!(family.ip_serial_no, Some(9));
    }

    #[test]
    fn test_contribution_import_serial_has_priority() {
        let mut conn = conn();
        let rows = vec![FamilyRow::new("Lal", Some(5)), FamilyRow::new("Mismatched", Some(6))];
        let engine = ImportReconciler::new();
        engine.import_families(&mut conn, "Bial 1", rows).unwrap();

        let report = engine
            .import_contributions(
                &mut conn,
                2024,
                3,
                "Bial 1",
                vec![ContributionRow::new("Mismatched", Some(5), Tithe::new(100.0, 0.0, 0.0))],
            )
            .unwrap();

        assert_eq!(report.updated, 1);
        let roster = membership::roster(&conn, "Bial 1").unwrap();
        let lal = roster.iter().find(|f| f.name == "Lal").unwrap();
        let mismatched = roster.iter().find(|f| f.name == "Mismatched").unwrap();

        let log = db::get_log(&conn, 2024, 3, &lal.id).unwrap().unwrap();
        assert_eq!(log.tithe.pathian_ram, 100.0);
        assert_eq!(log.upa_bial, "Bial 1");
        assert!(db::get_log(&conn, 2024, 3, &mismatched.id).unwrap().is_none());
    }

    #[test]
    fn test_contribution_import_falls_back_to_name() {
        let mut conn = conn();
        let lal = membership::add_family(&conn, "Bial 1", "Lal").unwrap();
        let engine = ImportReconciler::new();

        let report = engine
            .import_contributions(
                &mut conn,
                2024,
                1,
                "Bial 1",
                vec![ContributionRow::new(" lal ", Some(99), Tithe::new(1.0, 2.0, 3.0))],
            )
            .unwrap();

        assert_eq!(report.updated, 1);
        let log = db::get_log(&conn, 2024, 1, &lal.id).unwrap().unwrap();
        assert_eq!(log.tithe, Tithe::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_contribution_import_skips_unknown_and_duplicates() {
        let mut conn = conn();
        membership::add_family(&conn, "Bial 1", "Lal").unwrap();
        membership::add_family(&conn, "Bial 2", "Stranger").unwrap();
        let engine = ImportReconciler::new();

        let report = engine
            .import_contributions(
                &mut conn,
                2024,
                1,
                "Bial 1",
                vec![
                    ContributionRow::new("Lal", None, Tithe::new(10.0, 0.0, 0.0)),
                    ContributionRow::new("LAL", None, Tithe::new(99.0, 0.0, 0.0)),
                    ContributionRow::new("Stranger", None, Tithe::new(5.0, 0.0, 0.0)),
                ],
            )
            .unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.skipped_info[0].row, 2);
        assert_eq!(report.skipped_info[0].reason, REASON_DUPLICATE_IN_FILE);
        assert_eq!(report.skipped_info[1].row, 3);
        assert_eq!(report.skipped_info[1].reason, REASON_NOT_FOUND);
    }

    #[test]
    fn test_contribution_import_full_replace_overwrites() {
        let mut conn = conn();
        let lal = membership::add_family(&conn, "Bial 1", "Lal").unwrap();
        db::insert_log(&conn, &TitheLog::new(2024, 1, &lal.id, "Bial 1", Tithe::new(10.0, 20.0, 30.0))).unwrap();
        let engine = ImportReconciler::new();

        engine
            .import_contributions(&mut conn, 2024, 1, "Bial 1", vec![ContributionRow::new("Lal", None, Tithe::new(0.0, 5.0, 0.0))])
            .unwrap();

        let log = db::get_log(&conn, 2024, 1, &lal.id).unwrap().unwrap();
        assert_eq!(log.tithe, Tithe::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn test_strict_policy_skips_invalid_cells() {
        let mut conn = conn();
        let lal = membership::add_family(&conn, "Bial 1", "Lal").unwrap();

        let mut row = ContributionRow::new("Lal", None, Tithe::new(0.0, 5.0, 0.0));
        row.invalid_columns = vec!["pathian_ram".to_string()];

        let strict = ImportReconciler::with_policy(NumericPolicy::Strict);
        let report = strict
            .import_contributions(&mut conn, 2024, 1, "Bial 1", vec![row.clone()])
            .unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.skipped_info[0].reason, "Invalid number in column pathian_ram");
        assert!(db::get_log(&conn, 2024, 1, &lal.id).unwrap().is_none());

        let permissive = ImportReconciler::new();
        let report = permissive
            .import_contributions(&mut conn, 2024, 1, "Bial 1", vec![row])
            .unwrap();
        assert_eq!(report.updated, 1);
    }
}
