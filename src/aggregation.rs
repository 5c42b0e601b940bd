// 📊 Aggregation Engine - fold monthly logs into report views
//
// Unit totals group by the log's stored upa_bial, not by where the family
// is today. The sum of the unit totals always equals the sum of the logs
// in scope.

use crate::db;
use crate::entities::family::roster_order;
use crate::entities::tithe::validate_month;
use crate::entities::{Family, Tithe, TitheLog};
use crate::error::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ============================================================================
// SCOPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportScope {
    Year(i32),
    Month { year: i32, month: u32 },
}

impl ReportScope {
    pub fn year(&self) -> i32 {
        match self {
            ReportScope::Year(year) => *year,
            ReportScope::Month { year, .. } => *year,
        }
    }

    pub fn month(&self) -> Option<u32> {
        match self {
            ReportScope::Year(_) => None,
            ReportScope::Month { month, .. } => Some(*month),
        }
    }
}

// ============================================================================
// REPORT DATA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BialTotal {
    pub upa_bial: String,
    pub tithe: Tithe,
    pub total: f64,
    /// Distinct families with a log in scope
    pub families: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReportData {
    pub year: i32,
    pub month: Option<u32>,
    pub bials: Vec<BialTotal>,
    pub grand_total: Tithe,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthTotal {
    pub month: u32,
    pub tithe: Tithe,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyYearlyData {
    pub year: i32,
    pub family_id: String,
    /// None when the family no longer exists
    pub family_name: Option<String>,
    pub current_bial: Option<String>,
    /// Always 12 entries, January first
    pub months: Vec<MonthTotal>,
    pub grand_total: Tithe,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyFamilyTotal {
    pub family_id: String,
    pub name: String,
    pub ip_serial_no: Option<i64>,
    /// False for families that contributed to the unit but have left it
    pub in_roster: bool,
    pub tithe: Tithe,
    pub total: f64,
}

// ============================================================================
// PURE FOLDS
// ============================================================================

/// Group logs by upa_bial. Units of `bial_order` come first (zero-filled,
/// in list order); any other unit seen in the logs follows by name.
pub fn aggregate(
    logs: &[TitheLog],
    bial_order: &[String],
    year: i32,
    month: Option<u32>,
) -> AggregateReportData {
    let mut sums: HashMap<&str, (Tithe, HashSet<&str>)> = HashMap::new();
    let mut grand_total = Tithe::zero();

    for log in logs {
        let entry = sums.entry(log.upa_bial.as_str()).or_default();
        entry.0 += log.tithe;
        entry.1.insert(log.family_id.as_str());
        grand_total += log.tithe;
    }

    let mut extras: Vec<&str> = sums
        .keys()
        .copied()
        .filter(|bial| !bial_order.iter().any(|b| b == bial))
        .collect();
    extras.sort();

    let bials = bial_order
        .iter()
        .map(String::as_str)
        .chain(extras)
        .map(|bial| {
            let (tithe, families) = sums.get(bial).cloned().unwrap_or_default();
            BialTotal {
                upa_bial: bial.to_string(),
                tithe,
                total: tithe.total(),
                families: families.len(),
            }
        })
        .collect();

    AggregateReportData {
        year,
        month,
        bials,
        grand_total,
        total: grand_total.total(),
    }
}

/// Dense 12-month table for one family
pub fn family_yearly(
    year: i32,
    family_id: &str,
    family: Option<&Family>,
    logs: &[TitheLog],
) -> FamilyYearlyData {
    let mut months: Vec<MonthTotal> = (1..=12)
        .map(|month| MonthTotal {
            month,
            tithe: Tithe::zero(),
            total: 0.0,
        })
        .collect();
    let mut grand_total = Tithe::zero();

    for log in logs.iter().filter(|l| l.year == year && l.family_id == family_id) {
        if validate_month(log.month).is_err() {
            continue;
        }
        let slot = &mut months[(log.month - 1) as usize];
        slot.tithe += log.tithe;
        slot.total = slot.tithe.total();
        grand_total += log.tithe;
    }

    FamilyYearlyData {
        year,
        family_id: family_id.to_string(),
        family_name: family.map(|f| f.name.clone()),
        current_bial: family.and_then(|f| f.current_bial.clone()),
        months,
        grand_total,
        total: grand_total.total(),
    }
}

/// Per-family totals for a unit: the roster (zero-filled) plus any other
/// family whose logs are attributed to the unit
pub fn bial_family_totals(
    roster: &[Family],
    former_members: &[Family],
    logs: &[TitheLog],
) -> Vec<YearlyFamilyTotal> {
    let mut sums: HashMap<&str, Tithe> = HashMap::new();
    for log in logs {
        *sums.entry(log.family_id.as_str()).or_default() += log.tithe;
    }

    let roster_rows = roster.iter().map(|f| (f, true));
    let former_rows = former_members
        .iter()
        .filter(|f| sums.contains_key(f.id.as_str()))
        .filter(|f| !roster.iter().any(|r| r.id == f.id))
        .map(|f| (f, false));

    let mut totals: Vec<YearlyFamilyTotal> = roster_rows
        .chain(former_rows)
        .map(|(family, in_roster)| {
            let tithe = sums.get(family.id.as_str()).copied().unwrap_or_default();
            YearlyFamilyTotal {
                family_id: family.id.clone(),
                name: family.name.clone(),
                ip_serial_no: family.ip_serial_no,
                in_roster,
                tithe,
                total: tithe.total(),
            }
        })
        .collect();

    totals.sort_by(|a, b| roster_order(a.ip_serial_no, &a.name, b.ip_serial_no, &b.name));
    totals
}

// ============================================================================
// STORE-BACKED VIEWS
// ============================================================================

pub fn fetch_report(conn: &Connection, scope: ReportScope) -> Result<AggregateReportData> {
    if let Some(month) = scope.month() {
        validate_month(month)?;
    }

    let logs = db::logs_for_period(conn, scope.year(), scope.month())?;
    let bial_order = db::get_upa_bials(conn, scope.year())?;

    Ok(aggregate(&logs, &bial_order, scope.year(), scope.month()))
}

/// Unknown families yield a zeroed table rather than an error
pub fn fetch_family_yearly(conn: &Connection, year: i32, family_id: &str) -> Result<FamilyYearlyData> {
    let family = db::get_family(conn, family_id)?;
    let logs = db::logs_for_family(conn, year, family_id)?;

    Ok(family_yearly(year, family_id, family.as_ref(), &logs))
}

pub fn fetch_bial_yearly(conn: &Connection, year: i32, bial: &str) -> Result<Vec<YearlyFamilyTotal>> {
    let roster = db::families_in_bial(conn, bial)?;
    let logs = db::logs_for_bial(conn, year, bial)?;

    let mut former = Vec::new();
    let mut looked_up = HashSet::new();
    for log in &logs {
        let known = roster.iter().any(|f| f.id == log.family_id);
        if !known && looked_up.insert(log.family_id.clone()) {
            if let Some(family) = db::get_family(conn, &log.family_id)? {
                former.push(family);
            }
        }
    }

    Ok(bial_family_totals(&roster, &former, &logs))
}

// ============================================================================
// TESTS
// ============================================================================
