// 💰 Tithe Entity - the three contribution categories and the monthly log
//
// A TitheLog is identified by (year, month, family_id). Its upa_bial is a
// snapshot of the family's unit when the contribution was recorded.

use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Reject months outside 1..=12
pub fn validate_month(month: u32) -> Result<()> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(LedgerError::validation(format!(
            "month must be between 1 and 12, got {}",
            month
        )))
    }
}

/// Physical row key of a TitheLog: "{year}_{month}_{familyId}"
pub fn log_key(year: i32, month: u32, family_id: &str) -> String {
    format!("{}_{}_{}", year, month, family_id)
}

// ============================================================================
// CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    PathianRam,
    Ramthar,
    Tualchhung,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::PathianRam, Category::Ramthar, Category::Tualchhung];

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Category::PathianRam => "Pathian Ram",
            Category::Ramthar => "Ramthar",
            Category::Tualchhung => "Tualchhung",
        }
    }

    /// Column name in the tithe_logs table
    pub fn column(&self) -> &'static str {
        match self {
            Category::PathianRam => "pathian_ram",
            Category::Ramthar => "ramthar",
            Category::Tualchhung => "tualchhung",
        }
    }

    /// Accepts the column name, the camelCase key or the label (case-insensitive)
    pub fn parse(value: &str) -> Option<Category> {
        let normalized: String = value
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "pathianram" => Some(Category::PathianRam),
            "ramthar" => Some(Category::Ramthar),
            "tualchhung" => Some(Category::Tualchhung),
            _ => None,
        }
    }
}

// ============================================================================
// TITHE VALUE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tithe {
    #[serde(default)]
    pub pathian_ram: f64,
    #[serde(default)]
    pub ramthar: f64,
    #[serde(default)]
    pub tualchhung: f64,
}

impl Tithe {
    pub fn new(pathian_ram: f64, ramthar: f64, tualchhung: f64) -> Self {
        Tithe {
            pathian_ram: finite_or_zero(pathian_ram),
            ramthar: finite_or_zero(ramthar),
            tualchhung: finite_or_zero(tualchhung),
        }
    }

    pub fn zero() -> Self {
        Tithe::default()
    }

    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::PathianRam => self.pathian_ram,
            Category::Ramthar => self.ramthar,
            Category::Tualchhung => self.tualchhung,
        }
    }

    pub fn set(&mut self, category: Category, value: f64) {
        let value = finite_or_zero(value);
        match category {
            Category::PathianRam => self.pathian_ram = value,
            Category::Ramthar => self.ramthar = value,
            Category::Tualchhung => self.tualchhung = value,
        }
    }

    pub fn total(&self) -> f64 {
        self.pathian_ram + self.ramthar + self.tualchhung
    }

    pub fn is_zero(&self) -> bool {
        self.pathian_ram == 0.0 && self.ramthar == 0.0 && self.tualchhung == 0.0
    }

    /// Replace NaN/infinite components with zero
    pub fn sanitized(self) -> Self {
        Tithe::new(self.pathian_ram, self.ramthar, self.tualchhung)
    }
}

impl AddAssign for Tithe {
    fn add_assign(&mut self, other: Tithe) {
        self.pathian_ram += other.pathian_ram;
        self.ramthar += other.ramthar;
        self.tualchhung += other.tualchhung;
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

// ============================================================================
// TITHE PATCH
// ============================================================================

/// An edit to a monthly log: the whole object or a single category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TithePatch {
    FullReplace(Tithe),
    CategoryDelta { category: Category, value: f64 },
}

impl TithePatch {
    pub fn category(category: Category, value: f64) -> Self {
        TithePatch::CategoryDelta { category, value }
    }

    /// Compute the stored value after applying this patch.
    ///
    /// A delta sets the named category and keeps the others (zero when
    /// there is no existing log). A full patch replaces everything.
    pub fn apply(&self, existing: Option<Tithe>) -> Tithe {
        match self {
            TithePatch::FullReplace(tithe) => tithe.sanitized(),
            TithePatch::CategoryDelta { category, value } => {
                let mut tithe = existing.unwrap_or_default();
                tithe.set(*category, *value);
                tithe
            }
        }
    }
}

// ============================================================================
// TITHE LOG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitheLog {
    /// "{year}_{month}_{familyId}"
    pub id: String,
    pub year: i32,
    pub month: u32,
    pub family_id: String,

    /// Unit the contribution is attributed to (snapshot, see transfer)
    pub upa_bial: String,
    pub tithe: Tithe,
    pub last_updated: DateTime<Utc>,
}

impl TitheLog {
    pub fn new(year: i32, month: u32, family_id: &str, upa_bial: &str, tithe: Tithe) -> Self {
        TitheLog {
            id: log_key(year, month, family_id),
            year,
            month,
            family_id: family_id.to_string(),
            upa_bial: upa_bial.to_string(),
            tithe,
            last_updated: Utc::now(),
        }
    }

    pub fn total(&self) -> f64 {
        self.tithe.total()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_on_missing_log_zero_seeds() {
        let patch = TithePatch::category(Category::Ramthar, 50.0);
        let tithe = patch.apply(None);

        assert_eq!(tithe, Tithe::new(0.0, 50.0, 0.0));
    }

    #[test]
    fn test_delta_preserves_other_categories() {
        let existing = Tithe::new(100.0, 20.0, 5.0);
        let patch = TithePatch::category(Category::Tualchhung, 7.5);

        assert_eq!(patch.apply(Some(existing)), Tithe::new(100.0, 20.0, 7.5));
    }

    #[test]
    fn test_delta_is_idempotent() {
        let patch = TithePatch::category(Category::PathianRam, 40.0);
        let once = patch.apply(None);
        let twice = patch.apply(Some(once));

        assert_eq!(once, twice);
        assert_eq!(twice.pathian_ram, 40.0);
    }

    #[test]
    fn test_full_replace_ignores_existing() {
        let existing = Tithe::new(100.0, 20.0, 5.0);
        let patch = TithePatch::FullReplace(Tithe::new(1.0, 0.0, 0.0));

        assert_eq!(patch.apply(Some(existing)), Tithe::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_non_finite_values_become_zero() {
        let tithe = Tithe::new(f64::NAN, f64::INFINITY, -3.0);

        assert_eq!(tithe.pathian_ram, 0.0);
        assert_eq!(tithe.ramthar, 0.0);
        // Negative values are accepted as-is
        assert_eq!(tithe.tualchhung, -3.0);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(Category::parse("pathian_ram"), Some(Category::PathianRam));
        assert_eq!(Category::parse("Pathian Ram"), Some(Category::PathianRam));
        assert_eq!(Category::parse("RAMTHAR"), Some(Category::Ramthar));
        assert_eq!(Category::parse("tualchhung"), Some(Category::Tualchhung));
        assert_eq!(Category::parse("offering"), None);
    }

    #[test]
    fn test_patch_serde_shape() {
        let delta: TithePatch =
            serde_json::from_str(r#"{"kind":"categoryDelta","category":"ramthar","value":50}"#)
                .unwrap();
        assert_eq!(delta, TithePatch::category(Category::Ramthar, 50.0));

        let full: TithePatch = serde_json::from_str(
            r#"{"kind":"fullReplace","pathianRam":100,"ramthar":0,"tualchhung":0}"#,
        )
        .unwrap();
        assert_eq!(full, TithePatch::FullReplace(Tithe::new(100.0, 0.0, 0.0)));
    }

    #[test]
    fn test_log_key_and_month_validation() {
        assert_eq!(log_key(2024, 2, "fam-1"), "2024_2_fam-1");
        assert!(validate_month(1).is_ok());
        assert!(validate_month(12).is_ok());
        assert!(validate_month(0).is_err());
        assert!(validate_month(13).is_err());
    }
}
