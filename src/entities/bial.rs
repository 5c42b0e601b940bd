// 🏘️ Upa Bial - unit names and year-scoped overseer rosters

use crate::deduplication::name_key;
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An overseer of a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vawngtu {
    pub name: String,
    #[serde(default)]
    pub phone: String,
}

/// Unit metadata, keyed by (year, bial)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BialInfo {
    pub year: i32,
    pub bial: String,
    pub vawngtu: Vec<Vawngtu>,
}

impl BialInfo {
    pub fn empty(year: i32, bial: &str) -> Self {
        BialInfo {
            year,
            bial: bial.to_string(),
            vawngtu: Vec::new(),
        }
    }
}

pub fn validate_bial_name(bial: &str) -> Result<()> {
    if bial.trim().is_empty() {
        return Err(LedgerError::validation("Upa Bial name must not be empty"));
    }
    Ok(())
}

/// Trim names, drop blanks, and drop case-insensitive repeats (first wins)
pub fn normalize_bial_list(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .filter(|n| seen.insert(name_key(n)))
        .map(str::to_string)
        .collect()
}

/// Overseers with blank names are dropped; names and phones are trimmed
pub fn normalize_vawngtu(vawngtu: Vec<Vawngtu>) -> Vec<Vawngtu> {
    vawngtu
        .into_iter()
        .map(|v| Vawngtu {
            name: v.name.trim().to_string(),
            phone: v.phone.trim().to_string(),
        })
        .filter(|v| !v.name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bial_list() {
        let names = vec![
            " Bial 1".to_string(),
            "Bial 2".to_string(),
            "bial 1".to_string(),
            "  ".to_string(),
            "Bial 3 ".to_string(),
        ];

        assert_eq!(normalize_bial_list(&names), vec!["Bial 1", "Bial 2", "Bial 3"]);
    }

    #[test]
    fn test_normalize_vawngtu_drops_blank_names() {
        let list = vec![
            Vawngtu { name: " Pu Liana ".into(), phone: " 98620 ".into() },
            Vawngtu { name: "".into(), phone: "1".into() },
        ];

        let normalized = normalize_vawngtu(list);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].name, "Pu Liana");
        assert_eq!(normalized[0].phone, "98620");
    }

    #[test]
    fn test_validate_bial_name() {
        assert!(validate_bial_name("Bial 1").is_ok());
        assert!(validate_bial_name("   ").is_err());
    }
}
