// 🔍 Deduplication - normalized name keys and in-file duplicate collapsing
//
// Two names refer to the same family when they are equal after trimming
// and lowercasing. "Lal ", "lal" and " LAL" all collapse to "lal".

use std::collections::HashSet;

// ============================================================================
// NAME KEY
// ============================================================================

/// Normalized comparison key for a family name
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn same_name(a: &str, b: &str) -> bool {
    name_key(a) == name_key(b)
}

// ============================================================================
// DUPLICATE MATCH RESULT
// ============================================================================

/// Outcome of collapsing a batch of rows by name key
#[derive(Debug, Clone)]
pub struct Collapsed<T> {
    /// First occurrence of each name, in input order
    pub unique: Vec<T>,

    /// Later occurrences of an already-seen name
    pub duplicates: Vec<T>,

    /// Rows whose name is empty after trimming
    pub blank: Vec<T>,
}

// ============================================================================
// DEDUPLICATION ENGINE
// ============================================================================

/// Keep the first row of every name key; classify the rest
pub fn collapse_by_name<T, F>(rows: Vec<T>, name_of: F) -> Collapsed<T>
where
    F: Fn(&T) -> &str,
{
    let mut seen = HashSet::new();
    let mut collapsed = Collapsed {
        unique: Vec::new(),
        duplicates: Vec::new(),
        blank: Vec::new(),
    };

    for row in rows {
        let key = name_key(name_of(&row));
        if key.is_empty() {
            collapsed.blank.push(row);
        } else if seen.insert(key) {
            collapsed.unique.push(row);
        } else {
            collapsed.duplicates.push(row);
        }
    }

    collapsed
}

// ============================================================================
// TESTS
// ============================================================================
