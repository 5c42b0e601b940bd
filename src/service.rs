// 🛡️ Tithe Service - the operation surface used by the CLI and the server
//
// Every call takes the caller's Session. Mutations go through three checks
// in order: permission, archival gate, then the engine. Successful
// mutations append an audit event.

use crate::aggregation::{self, AggregateReportData, FamilyYearlyData, ReportScope, YearlyFamilyTotal};
use crate::archive::{ensure_unlocked, Clock, SystemClock};
use crate::config::Config;
use crate::db::{self, Event};
use crate::deduplication::name_key;
use crate::entities::bial::{normalize_bial_list, normalize_vawngtu, validate_bial_name};
use crate::entities::tithe::validate_month;
use crate::entities::{BialInfo, Family, FamilyWithTithe, Session, TitheLog, TithePatch, UserRole, Vawngtu};
use crate::error::{LedgerError, Result};
use crate::membership::{self, BulkRemoveOutcome, FamilyUpdate, TransferOutcome};
use crate::parser::{ContributionRow, FamilyRow, NumericPolicy};
use crate::reconciliation::{ContributionImportReport, FamilyImportReport, ImportReconciler};
use crate::upsert;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub struct TitheService {
    conn: Connection,
    clock: Box<dyn Clock>,
    reconciler: ImportReconciler,
}

impl TitheService {
    pub fn new(conn: Connection) -> Self {
        TitheService {
            conn,
            clock: Box::new(SystemClock),
            reconciler: ImportReconciler::new(),
        }
    }

    /// Open the configured database file (schema is created on first use)
    pub fn open(config: &Config) -> Result<Self> {
        let conn = db::open_database(&config.db_path, config.busy_timeout())?;
        info!(db = %config.db_path.display(), policy = ?config.numeric_policy, "ledger opened");
        Ok(TitheService::new(conn).with_policy(config.numeric_policy))
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_policy(mut self, policy: NumericPolicy) -> Self {
        self.reconciler = ImportReconciler::with_policy(policy);
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn current_year(&self) -> i32 {
        self.clock.current_year()
    }

    /// Build a session for a stored user. Unknown users are refused.
    pub fn resolve_session(&self, uid: &str) -> Result<Session> {
        match db::get_user_role(&self.conn, uid)? {
            Some(role) => Ok(Session::new(role)),
            None => Err(LedgerError::permission(format!("unknown user {}", uid))),
        }
    }

    // ========================================================================
    // GUARDS
    // ========================================================================

    fn ensure_writable(&self, year: i32) -> Result<()> {
        let archived = db::get_archive_flag(&self.conn, year)?;
        let current_year = self.clock.current_year();
        ensure_unlocked(year, archived, current_year).map_err(|e| {
            warn!(year, archived, current_year, "refused write to locked year");
            e
        })
    }

    /// The family must exist and, for non-admins, sit in the caller's unit
    fn family_in_scope(&self, session: &Session, family_id: &str) -> Result<Family> {
        let family = db::get_family(&self.conn, family_id)?
            .ok_or_else(|| LedgerError::not_found("family", family_id))?;

        if !session.is_admin() {
            match &family.current_bial {
                Some(bial) => session.require_bial(bial)?,
                None => return Err(LedgerError::permission("only an admin can act on an unassigned family")),
            }
        }

        Ok(family)
    }

    /// Append an audit event for a mutation that has already committed.
    /// A failed append is logged and does not fail the mutation.
    fn record<T: Serialize>(&self, session: &Session, event_type: &str, entity_type: &str, entity_id: &str, data: T) {
        let result = serde_json::to_value(data)
            .map_err(LedgerError::from)
            .and_then(|data| {
                let event = Event::new(event_type, entity_type, entity_id, data, session.actor());
                db::insert_event(&self.conn, &event)
            });

        if let Err(e) = result {
            warn!(event_type, entity_type, entity_id, error = %e, "audit event not recorded");
        }
    }

    // ========================================================================
    // FAMILIES
    // ========================================================================

    /// Roster of `bial` with each family's tithe for the month
    pub fn fetch_families(
        &self,
        session: &Session,
        year: i32,
        month: u32,
        bial: &str,
    ) -> Result<Vec<FamilyWithTithe>> {
        session.require_bial(bial)?;
        validate_month(month)?;

        let roster = membership::roster(&self.conn, bial)?;
        let logs: HashMap<String, TitheLog> = db::logs_for_period(&self.conn, year, Some(month))?
            .into_iter()
            .map(|log| (log.family_id.clone(), log))
            .collect();

        Ok(roster
            .into_iter()
            .map(|family| {
                let log = logs.get(&family.id);
                let tithe = log.map(|l| l.tithe).unwrap_or_default();
                FamilyWithTithe {
                    family,
                    tithe,
                    total: tithe.total(),
                    has_log: log.is_some(),
                }
            })
            .collect())
    }

    /// Admin only: unassigned families sit outside every unit
    pub fn fetch_unassigned_families(&self, session: &Session) -> Result<Vec<Family>> {
        session.require_admin()?;
        db::unassigned_families(&self.conn)
    }

    pub fn add_family(&self, session: &Session, year: i32, bial: &str, name: &str) -> Result<Family> {
        session.require_bial(bial)?;
        self.ensure_writable(year)?;

        let family = membership::add_family(&self.conn, bial, name)?;

        info!(family_id = %family.id, bial, "family added");
        self.record(session, "family_added", "family", &family.id, json!({ "name": family.name, "bial": bial }));
        Ok(family)
    }

    pub fn update_family_details(
        &self,
        session: &Session,
        year: i32,
        family_id: &str,
        update: &FamilyUpdate,
    ) -> Result<Family> {
        self.family_in_scope(session, family_id)?;
        self.ensure_writable(year)?;

        let family = membership::update_family_details(&self.conn, family_id, update)?;

        info!(family_id, "family details updated");
        self.record(session, "family_updated", "family", family_id, update);
        Ok(family)
    }

    pub fn transfer_family(
        &mut self,
        session: &Session,
        family_id: &str,
        destination: &str,
        year: i32,
    ) -> Result<TransferOutcome> {
        self.family_in_scope(session, family_id)?;
        self.ensure_writable(year)?;

        let outcome = membership::transfer_family(&mut self.conn, family_id, destination)?;

        info!(
            family_id,
            from = ?outcome.from_bial,
            to = destination,
            logs_moved = outcome.logs_moved,
            "family transferred"
        );
        self.record(
            session,
            "family_transferred",
            "family",
            family_id,
            json!({ "from": outcome.from_bial, "to": destination, "logsMoved": outcome.logs_moved }),
        );
        Ok(outcome)
    }

    pub fn unassign_family_from_bial(&self, session: &Session, family_id: &str, year: i32) -> Result<Family> {
        let before = self.family_in_scope(session, family_id)?;
        self.ensure_writable(year)?;

        let family = membership::unassign_family(&self.conn, family_id)?;

        info!(family_id, from = ?before.current_bial, "family unassigned");
        self.record(session, "family_unassigned", "family", family_id, json!({ "from": before.current_bial }));
        Ok(family)
    }

    pub fn remove_family(&mut self, session: &Session, family_id: &str, year: i32) -> Result<Family> {
        self.family_in_scope(session, family_id)?;
        self.ensure_writable(year)?;

        let family = membership::remove_family(&mut self.conn, family_id)?;

        info!(family_id, "family removed");
        self.record(session, "family_removed", "family", family_id, json!({ "name": family.name }));
        Ok(family)
    }

    /// Ids that do not exist are reported as skipped. Any existing family
    /// outside the caller's scope refuses the whole batch.
    pub fn bulk_remove_families(
        &mut self,
        session: &Session,
        family_ids: &[String],
        year: i32,
    ) -> Result<BulkRemoveOutcome> {
        for id in family_ids {
            match self.family_in_scope(session, id) {
                Ok(_) | Err(LedgerError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        self.ensure_writable(year)?;

        let outcome = membership::bulk_remove_families(&mut self.conn, family_ids)?;

        info!(removed = outcome.removed.len(), skipped = outcome.skipped.len(), "bulk family removal");
        for id in &outcome.removed {
            self.record(session, "family_removed", "family", id, json!({ "bulk": true }));
        }
        Ok(outcome)
    }

    // ========================================================================
    // TITHES
    // ========================================================================

    pub fn update_tithe(
        &mut self,
        session: &Session,
        year: i32,
        month: u32,
        bial: &str,
        family_id: &str,
        patch: &TithePatch,
    ) -> Result<TitheLog> {
        session.require_bial(bial)?;
        let family = self.family_in_scope(session, family_id)?;
        if !session.is_admin() && !family.is_in(bial) {
            return Err(LedgerError::permission(format!(
                "family {} is not in {}",
                family_id, bial
            )));
        }
        self.ensure_writable(year)?;

        let outcome = upsert::update_tithe(&mut self.conn, year, month, bial, family_id, patch)?;

        info!(year, month, bial, family_id, created = outcome.created, total = outcome.log.total(), "tithe updated");
        self.record(session, "tithe_updated", "tithe_log", &outcome.log.id, patch);
        Ok(outcome.log)
    }

    // ========================================================================
    // IMPORTS
    // ========================================================================

    pub fn import_families(
        &mut self,
        session: &Session,
        year: i32,
        bial: &str,
        rows: Vec<FamilyRow>,
    ) -> Result<FamilyImportReport> {
        session.require_bial(bial)?;
        self.ensure_writable(year)?;

        let total_rows = rows.len();
        let report = self.reconciler.import_families(&mut self.conn, bial, rows)?;

        info!(
            bial,
            rows = total_rows,
            added = report.added,
            skipped = report.skipped,
            reactivated = report.reactivated,
            "family import finished"
        );
        self.record(session, "families_imported", "upa_bial", bial, &report);
        Ok(report)
    }

    pub fn import_contributions(
        &mut self,
        session: &Session,
        year: i32,
        month: u32,
        bial: &str,
        rows: Vec<ContributionRow>,
    ) -> Result<ContributionImportReport> {
        session.require_bial(bial)?;
        self.ensure_writable(year)?;

        let report = self
            .reconciler
            .import_contributions(&mut self.conn, year, month, bial, rows)?;

        info!(year, month, bial, updated = report.updated, skipped = report.skipped, "contribution import finished");
        for skipped in &report.skipped_info {
            debug!(row = skipped.row, name = %skipped.name, reason = %skipped.reason, "row skipped");
        }
        self.record(
            session,
            "contributions_imported",
            "upa_bial",
            bial,
            json!({ "year": year, "month": month, "updated": report.updated, "skipped": report.skipped }),
        );
        Ok(report)
    }

    // ========================================================================
    // REPORTS
    // ========================================================================

    pub fn fetch_monthly_report(&self, _session: &Session, year: i32, month: u32) -> Result<AggregateReportData> {
        aggregation::fetch_report(&self.conn, ReportScope::Month { year, month })
    }

    pub fn fetch_yearly_report(&self, _session: &Session, year: i32) -> Result<AggregateReportData> {
        aggregation::fetch_report(&self.conn, ReportScope::Year(year))
    }

    pub fn fetch_family_yearly_data(
        &self,
        session: &Session,
        year: i32,
        family_id: &str,
    ) -> Result<FamilyYearlyData> {
        match self.family_in_scope(session, family_id) {
            Ok(_) | Err(LedgerError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        aggregation::fetch_family_yearly(&self.conn, year, family_id)
    }

    pub fn fetch_bial_yearly_family_data(
        &self,
        session: &Session,
        year: i32,
        bial: &str,
    ) -> Result<Vec<YearlyFamilyTotal>> {
        session.require_bial(bial)?;
        aggregation::fetch_bial_yearly(&self.conn, year, bial)
    }

    // ========================================================================
    // ARCHIVE STATUS
    // ========================================================================

    pub fn fetch_archive_status(&self, _session: &Session, year: i32) -> Result<bool> {
        db::get_archive_flag(&self.conn, year)
    }

    /// Not gated: this is how an archived year is re-opened
    pub fn update_archive_status(&self, session: &Session, year: i32, archived: bool) -> Result<()> {
        session.require_admin()?;

        db::set_archive_flag(&self.conn, year, archived)?;

        info!(year, archived, "archive status changed");
        self.record(session, "archive_status_changed", "year", &year.to_string(), json!({ "archived": archived }));
        Ok(())
    }

    // ========================================================================
    // UPA BIAL LIST & INFO
    // ========================================================================

    pub fn fetch_upa_bials(&self, _session: &Session, year: i32) -> Result<Vec<String>> {
        db::get_upa_bials(&self.conn, year)
    }

    /// Replace the year's unit list. Dropping a unit that is still in use
    /// is refused.
    pub fn update_upa_bials_list(&self, session: &Session, year: i32, names: &[String]) -> Result<Vec<String>> {
        session.require_admin()?;
        self.ensure_writable(year)?;

        let names = normalize_bial_list(names);
        let current = db::get_upa_bials(&self.conn, year)?;
        for dropped in current.iter().filter(|c| !names.iter().any(|n| name_key(n) == name_key(c))) {
            if db::bial_in_use(&self.conn, year, dropped)? {
                return Err(LedgerError::validation(format!(
                    "{} is still in use and cannot be removed from the {} list",
                    dropped, year
                )));
            }
        }

        db::replace_upa_bials(&self.conn, year, &names)?;

        info!(year, count = names.len(), "upa bial list replaced");
        self.record(session, "upa_bials_updated", "year", &year.to_string(), json!({ "names": names }));
        Ok(names)
    }

    pub fn is_bial_in_use(&self, _session: &Session, year: i32, bial: &str) -> Result<bool> {
        db::bial_in_use(&self.conn, year, bial)
    }

    pub fn fetch_bial_info(&self, session: &Session, year: i32, bial: &str) -> Result<BialInfo> {
        session.require_bial(bial)?;
        Ok(db::get_bial_info(&self.conn, year, bial)?.unwrap_or_else(|| BialInfo::empty(year, bial)))
    }

    pub fn update_bial_info(
        &self,
        session: &Session,
        year: i32,
        bial: &str,
        vawngtu: Vec<Vawngtu>,
    ) -> Result<BialInfo> {
        validate_bial_name(bial)?;
        session.require_bial(bial)?;
        self.ensure_writable(year)?;

        let info = BialInfo {
            year,
            bial: bial.to_string(),
            vawngtu: normalize_vawngtu(vawngtu),
        };
        db::put_bial_info(&self.conn, &info)?;

        info!(year, bial, overseers = info.vawngtu.len(), "bial info updated");
        self.record(session, "bial_info_updated", "upa_bial", bial, &info);
        Ok(info)
    }

    // ========================================================================
    // USERS & AUDIT
    // ========================================================================

    /// A user may read their own role; admins may read anyone's
    pub fn fetch_user_role(&self, session: &Session, uid: &str) -> Result<Option<UserRole>> {
        if session.actor() != uid {
            session.require_admin()?;
        }
        db::get_user_role(&self.conn, uid)
    }

    pub fn upsert_user_role(&self, session: &Session, role: &UserRole) -> Result<()> {
        session.require_admin()?;
        role.validate()?;

        db::upsert_user_role(&self.conn, role)?;

        info!(uid = %role.uid, is_admin = role.is_admin, bial = ?role.assigned_bial, "user role saved");
        self.record(session, "user_role_saved", "user", &role.uid, role);
        Ok(())
    }

    pub fn events_for_entity(&self, session: &Session, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
        session.require_admin()?;
        db::get_events_for_entity(&self.conn, entity_type, entity_id)
    }

}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::FixedClock;
    use crate::entities::{Category, Tithe};

    fn service() -> TitheService {
        TitheService::new(db::open_in_memory().unwrap()).with_clock(FixedClock::new(2024))
    }

    fn admin() -> Session {
        Session::local_admin()
    }

    fn member(bial: &str) -> Session {
        Session::new(UserRole::member("u-1", "u1@example.org", bial))
    }

    #[test]
    fn test_past_year_is_locked() {
        let mut svc = service();
        let family = svc.add_family(&admin(), 2024, "Bial 1", "Lal").unwrap();

        let result = svc.update_tithe(
            &admin(),
            2023,
            5,
            "Bial 1",
            &family.id,
            &TithePatch::category(Category::PathianRam, 10.0),
        );

        assert!(matches!(result, Err(LedgerError::LockedPeriod { year: 2023 })));
        assert!(db::get_log(svc.connection(), 2023, 5, &family.id).unwrap().is_none());
    }

    #[test]
    fn test_archive_flag_locks_current_year_until_reopened() {
        let mut svc = service();
        let family = svc.add_family(&admin(), 2024, "Bial 1", "Lal").unwrap();
        svc.update_archive_status(&admin(), 2024, true).unwrap();

        let patch = TithePatch::category(Category::Ramthar, 5.0);
        assert!(matches!(
            svc.update_tithe(&admin(), 2024, 1, "Bial 1", &family.id, &patch),
            Err(LedgerError::LockedPeriod { .. })
        ));
        assert!(matches!(
            svc.add_family(&admin(), 2024, "Bial 1", "Mawia"),
            Err(LedgerError::LockedPeriod { .. })
        ));

        svc.update_archive_status(&admin(), 2024, false).unwrap();
        assert!(svc.update_tithe(&admin(), 2024, 1, "Bial 1", &family.id, &patch).is_ok());
    }

    #[test]
    fn test_member_is_scoped_to_assigned_bial() {
        let mut svc = service();
        let own = svc.add_family(&admin(), 2024, "Bial 1", "Lal").unwrap();
        let other = svc.add_family(&admin(), 2024, "Bial 2", "Mawia").unwrap();
        let session = member("Bial 1");

        assert!(svc.fetch_families(&session, 2024, 1, "Bial 1").is_ok());
        assert!(matches!(
            svc.fetch_families(&session, 2024, 1, "Bial 2"),
            Err(LedgerError::Permission(_))
        ));
        assert!(matches!(
            svc.remove_family(&session, &other.id, 2024),
            Err(LedgerError::Permission(_))
        ));
        assert!(matches!(
            svc.update_archive_status(&session, 2024, true),
            Err(LedgerError::Permission(_))
        ));
        assert!(matches!(
            svc.update_upa_bials_list(&session, 2024, &["Bial 1".to_string()]),
            Err(LedgerError::Permission(_))
        ));

        // Aggregate reports stay readable
        assert!(svc.fetch_yearly_report(&session, 2024).is_ok());
        assert!(svc
            .update_tithe(&session, 2024, 1, "Bial 1", &own.id, &TithePatch::category(Category::Tualchhung, 3.0))
            .is_ok());
    }

    #[test]
    fn test_fetch_families_hydrates_month() {
        let mut svc = service();
        let lal = svc.add_family(&admin(), 2024, "Bial 1", "Lal").unwrap();
        svc.add_family(&admin(), 2024, "Bial 1", "Mawia").unwrap();
        svc.update_tithe(&admin(), 2024, 3, "Bial 1", &lal.id, &TithePatch::FullReplace(Tithe::new(10.0, 20.0, 30.0)))
            .unwrap();

        let rows = svc.fetch_families(&admin(), 2024, 3, "Bial 1").unwrap();

        assert_eq!(rows.len(), 2);
        let lal_row = rows.iter().find(|r| r.family.id == lal.id).unwrap();
        assert!(lal_row.has_log);
        assert_eq!(lal_row.total, 60.0);
        let mawia_row = rows.iter().find(|r| r.family.id != lal.id).unwrap();
        assert!(!mawia_row.has_log);
        assert_eq!(mawia_row.total, 0.0);
    }

    #[test]
    fn test_mutations_write_audit_events() {
        let mut svc = service();
        let family = svc.add_family(&admin(), 2024, "Bial 1", "Lal").unwrap();
        svc.transfer_family(&admin(), &family.id, "Bial 2", 2024).unwrap();

        let events = svc.events_for_entity(&admin(), "family", &family.id).unwrap();

        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["family_transferred", "family_added"]);
        assert!(events.iter().all(|e| e.actor == "local-cli"));
    }

    #[test]
    fn test_upa_bial_list_keeps_units_in_use() {
        let svc = service();
        let names = vec!["Bial 1".to_string(), "Bial 2".to_string(), " bial 1 ".to_string()];
        let stored = svc.update_upa_bials_list(&admin(), 2024, &names).unwrap();
        assert_eq!(stored, vec!["Bial 1", "Bial 2"]);

        svc.add_family(&admin(), 2024, "Bial 2", "Lal").unwrap();
        assert!(svc.is_bial_in_use(&admin(), 2024, "Bial 2").unwrap());

        let result = svc.update_upa_bials_list(&admin(), 2024, &["Bial 1".to_string()]);
        assert!(matches!(result, Err(LedgerError::Validation(_))));

        let stored = svc
            .update_upa_bials_list(&admin(), 2024, &["Bial 2".to_string(), "Bial 3".to_string()])
            .unwrap();
        assert_eq!(stored, vec!["Bial 2", "Bial 3"]);
        assert_eq!(svc.fetch_upa_bials(&admin(), 2024).unwrap(), stored);
    }

    #[test]
    fn test_bial_info_defaults_and_updates() {
        let svc = service();
        assert!(svc.fetch_bial_info(&admin(), 2024, "Bial 1").unwrap().vawngtu.is_empty());

        let saved = svc
            .update_bial_info(
                &admin(),
                2024,
                "Bial 1",
                vec![
                    Vawngtu { name: " Zova ".into(), phone: "98".into() },
                    Vawngtu { name: "  ".into(), phone: String::new() },
                ],
            )
            .unwrap();

        assert_eq!(saved.vawngtu.len(), 1);
        assert_eq!(svc.fetch_bial_info(&admin(), 2024, "Bial 1").unwrap(), saved);
        assert!(svc.update_bial_info(&admin(), 2023, "Bial 1", vec![]).is_err());
    }

    #[test]
    fn test_user_roles_are_admin_managed() {
        let svc = service();
        let role = UserRole::member("u-1", "u1@example.org", "Bial 1");

        assert!(matches!(
            svc.upsert_user_role(&member("Bial 1"), &role),
            Err(LedgerError::Permission(_))
        ));
        svc.upsert_user_role(&admin(), &role).unwrap();

        let session = svc.resolve_session("u-1").unwrap();
        assert_eq!(session.user.assigned_bial.as_deref(), Some("Bial 1"));
        assert_eq!(svc.fetch_user_role(&session, "u-1").unwrap(), Some(role));
        assert!(svc.fetch_user_role(&session, "someone-else").is_err());
        assert!(matches!(svc.resolve_session("ghost"), Err(LedgerError::Permission(_))));

        let mut bad = UserRole::admin("u-2", "u2@example.org");
        bad.assigned_bial = Some("Bial 1".to_string());
        assert!(matches!(svc.upsert_user_role(&admin(), &bad), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_member_cannot_write_tithe_outside_own_bial() {
        let mut svc = service();
        let other = svc.add_family(&admin(), 2024, "Bial 2", "Mawia").unwrap();
        let drifter = svc.add_family(&admin(), 2024, "Bial 2", "Zuali").unwrap();
        svc.unassign_family_from_bial(&admin(), &drifter.id, 2024).unwrap();
        let session = member("Bial 1");
        let patch = TithePatch::category(Category::PathianRam, 999.0);

        for family_id in [&other.id, &drifter.id] {
            let result = svc.update_tithe(&session, 2024, 1, "Bial 1", family_id, &patch);
            assert!(matches!(result, Err(LedgerError::Permission(_))));
            assert!(db::get_log(svc.connection(), 2024, 1, family_id).unwrap().is_none());
        }

        let report = svc.fetch_monthly_report(&admin(), 2024, 1).unwrap();
        assert_eq!(report.total, 0.0);

        // Admins may still attribute an unassigned family's tithe to a unit
        assert!(svc.update_tithe(&admin(), 2024, 1, "Bial 1", &drifter.id, &patch).is_ok());
    }

    #[test]
    fn test_member_cannot_read_other_family_yearly_data() {
        let svc = service();
        let other = svc.add_family(&admin(), 2024, "Bial 2", "Mawia").unwrap();
        let own = svc.add_family(&admin(), 2024, "Bial 1", "Lal").unwrap();
        let session = member("Bial 1");

        assert!(matches!(
            svc.fetch_family_yearly_data(&session, 2024, &other.id),
            Err(LedgerError::Permission(_))
        ));
        assert!(svc.fetch_family_yearly_data(&session, 2024, &own.id).is_ok());
        assert_eq!(svc.fetch_family_yearly_data(&session, 2024, "ghost").unwrap().total, 0.0);
    }

    #[test]
    fn test_unassigned_families_are_admin_only() {
        let svc = service();
        let family = svc.add_family(&admin(), 2024, "Bial 1", "Lal").unwrap();
        svc.unassign_family_from_bial(&admin(), &family.id, 2024).unwrap();

        assert!(matches!(
            svc.fetch_unassigned_families(&member("Bial 1")),
            Err(LedgerError::Permission(_))
        ));
        assert_eq!(svc.fetch_unassigned_families(&admin()).unwrap().len(), 1);
    }

    #[test]
    fn test_audit_failure_does_not_fail_committed_write() {
        let svc = service();
        svc.connection().execute("DROP TABLE events", []).unwrap();

        let family = svc.add_family(&admin(), 2024, "Bial 1", "Lal").unwrap();

        assert!(db::get_family(svc.connection(), &family.id).unwrap().is_some());
    }

    #[test]
    fn test_bulk_remove_refuses_out_of_scope_family() {
        let mut svc = service();
        let own = svc.add_family(&admin(), 2024, "Bial 1", "Lal").unwrap();
        let other = svc.add_family(&admin(), 2024, "Bial 2", "Mawia").unwrap();

        let result = svc.bulk_remove_families(&member("Bial 1"), &[own.id.clone(), other.id.clone()], 2024);
        assert!(matches!(result, Err(LedgerError::Permission(_))));
        assert_eq!(svc.fetch_families(&admin(), 2024, 1, "Bial 1").unwrap().len(), 1);

        let outcome = svc
            .bulk_remove_families(&member("Bial 1"), &[own.id.clone(), "ghost".to_string()], 2024)
            .unwrap();
        assert_eq!(outcome.removed, vec![own.id]);
        assert_eq!(outcome.skipped, vec!["ghost".to_string()]);
    }
}
