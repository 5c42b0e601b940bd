// 🏗️ Row Loader - CSV sheets → import rows
//
// Column headers are fixed: name, ip_serial_no, pathian_ram, ramthar,
// tualchhung. Cells are parsed permissively; a cell that cannot be read as
// a number becomes 0 and its column is remembered so a strict policy can
// skip the row later.

use crate::entities::{Category, Tithe};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

// ============================================================================
// CORE TYPES
// ============================================================================

/// What to do with a row whose numeric cells could not be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericPolicy {
    /// Unreadable cells count as 0
    #[default]
    Permissive,
    /// Rows with unreadable cells are skipped with a reason
    Strict,
}

impl NumericPolicy {
    pub fn parse(value: &str) -> Option<NumericPolicy> {
        match value.trim().to_lowercase().as_str() {
            "permissive" | "lenient" => Some(NumericPolicy::Permissive),
            "strict" => Some(NumericPolicy::Strict),
            _ => None,
        }
    }
}

/// Roster growth input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyRow {
    pub name: String,
    #[serde(default)]
    pub ip_serial_no: Option<i64>,
}

impl FamilyRow {
    pub fn new(name: &str, ip_serial_no: Option<i64>) -> Self {
        FamilyRow {
            name: name.to_string(),
            ip_serial_no,
        }
    }
}

/// Monthly contribution input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionRow {
    pub name: String,
    #[serde(default)]
    pub ip_serial_no: Option<i64>,
    #[serde(default)]
    pub tithe: Tithe,

    /// Columns whose cell was coerced to 0
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_columns: Vec<String>,
}

impl ContributionRow {
    pub fn new(name: &str, ip_serial_no: Option<i64>, tithe: Tithe) -> Self {
        ContributionRow {
            name: name.to_string(),
            ip_serial_no,
            tithe,
            invalid_columns: Vec::new(),
        }
    }
}

/// A sheet line before any numeric interpretation
#[derive(Debug, Clone, Default, Deserialize)]
struct RawRow {
    #[serde(default, alias = "Name")]
    name: String,
    #[serde(default, alias = "IP Serial No", alias = "serial")]
    ip_serial_no: String,
    #[serde(default, alias = "Pathian Ram")]
    pathian_ram: String,
    #[serde(default, alias = "Ramthar")]
    ramthar: String,
    #[serde(default, alias = "Tualchhung")]
    tualchhung: String,
}

// ============================================================================
// CELL PARSING
// ============================================================================

/// Parse a money cell. Blank is 0; thousands separators and a leading
/// currency marker are ignored. None when the cell is not a finite number.
pub fn parse_amount(cell: &str) -> Option<f64> {
    let cleaned: String = cell
        .trim()
        .trim_start_matches("Rs.")
        .trim_start_matches("Rs")
        .trim_start_matches('₹')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return Some(0.0);
    }

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a serial cell. Accepts "5" and spreadsheet-style "5.0".
pub fn parse_serial(cell: &str) -> Option<i64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }

    if let Ok(value) = cell.parse::<i64>() {
        return Some(value);
    }

    match cell.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 => Some(value as i64),
        _ => None,
    }
}

fn contribution_from_raw(raw: RawRow) -> ContributionRow {
    let mut tithe = Tithe::zero();
    let mut invalid_columns = Vec::new();

    for (category, cell) in [
        (Category::PathianRam, &raw.pathian_ram),
        (Category::Ramthar, &raw.ramthar),
        (Category::Tualchhung, &raw.tualchhung),
    ] {
        match parse_amount(cell) {
            Some(value) => tithe.set(category, value),
            None => invalid_columns.push(category.column().to_string()),
        }
    }

    ContributionRow {
        name: raw.name.trim().to_string(),
        ip_serial_no: parse_serial(&raw.ip_serial_no),
        tithe,
        invalid_columns,
    }
}

// ============================================================================
// CSV LOADING
// ============================================================================

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader)
}

pub fn read_family_rows<R: Read>(reader: R) -> Result<Vec<FamilyRow>> {
    let mut rdr = csv_reader(reader);
    let mut rows = Vec::new();

    for result in rdr.deserialize() {
        let raw: RawRow = result?;
        rows.push(FamilyRow {
            name: raw.name.trim().to_string(),
            ip_serial_no: parse_serial(&raw.ip_serial_no),
        });
    }

    Ok(rows)
}

pub fn read_contribution_rows<R: Read>(reader: R) -> Result<Vec<ContributionRow>> {
    let mut rdr = csv_reader(reader);
    let mut rows = Vec::new();

    for result in rdr.deserialize() {
        let raw: RawRow = result?;
        rows.push(contribution_from_raw(raw));
    }

    Ok(rows)
}

pub fn load_family_rows(path: &Path) -> Result<Vec<FamilyRow>> {
    read_family_rows(std::fs::File::open(path)?)
}

pub fn load_contribution_rows(path: &Path) -> Result<Vec<ContributionRow>> {
    read_contribution_rows(std::fs::File::open(path)?)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_permissive_forms() {
        assert_eq!(parse_amount("100"), Some(100.0));
        assert_eq!(parse_amount(" 1,250.50 "), Some(1250.5));
        assert_eq!(parse_amount("₹500"), Some(500.0));
        assert_eq!(parse_amount("Rs. 20"), Some(20.0));
        assert_eq!(parse_amount(""), Some(0.0));
        assert_eq!(parse_amount("-15"), Some(-15.0));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("inf"), None);
    }

    #[test]
    fn test_parse_serial() {
        assert_eq!(parse_serial("5"), Some(5));
        assert_eq!(parse_serial(" 12.0 "), Some(12));
        assert_eq!(parse_serial("12.5"), None);
        assert_eq!(parse_serial(""), None);
        assert_eq!(parse_serial("n/a"), None);
    }

    #[test]
    fn test_read_contribution_rows_marks_invalid_cells() {
        let sheet = "name,ip_serial_no,pathian_ram,ramthar,tualchhung\n\
                     Lal,1,100,20,\n\
                     Mawia,,oops,5,5\n";

        let rows = read_contribution_rows(sheet.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ip_serial_no, Some(1));
        assert_eq!(rows[0].tithe, Tithe::new(100.0, 20.0, 0.0));
        assert!(rows[0].invalid_columns.is_empty());

        assert_eq!(rows[1].ip_serial_no, None);
        assert_eq!(rows[1].tithe, Tithe::new(0.0, 5.0, 5.0));
        assert_eq!(rows[1].invalid_columns, vec!["pathian_ram".to_string()]);
    }

    #[test]
    fn test_read_family_rows() {
        let sheet = "name,ip_serial_no\n  Lal  ,3\nMawia,\n";

        let rows = read_family_rows(sheet.as_bytes()).unwrap();

        assert_eq!(rows, vec![FamilyRow::new("Lal", Some(3)), FamilyRow::new("Mawia", None)]);
    }

    #[test]
    fn test_numeric_policy_parse() {
        assert_eq!(NumericPolicy::parse("STRICT"), Some(NumericPolicy::Strict));
        assert_eq!(NumericPolicy::parse("permissive"), Some(NumericPolicy::Permissive));
        assert_eq!(NumericPolicy::parse("loose"), None);
        assert_eq!(NumericPolicy::default(), NumericPolicy::Permissive);
    }
}
