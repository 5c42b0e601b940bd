// 👪 Family Entity - stable identity, mutable name/serial/unit
//
// "Family name is a VALUE (can change), Family UUID is IDENTITY (never changes)"
//
// current_bial is None when the family is unassigned: it still exists and
// keeps its logs, but no unit roster lists it.

use crate::deduplication::name_key;
use crate::entities::tithe::Tithe;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ============================================================================
// FAMILY ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Family {
    /// Stable identity (UUID) - NEVER changes
    pub id: String,

    pub name: String,

    /// Unit-scoped display/sort key; not unique
    pub ip_serial_no: Option<i64>,

    /// Unit the family currently belongs to
    pub current_bial: Option<String>,
}

impl Family {
    /// Create new family entity with UUID, assigned to `bial`
    pub fn new(name: &str, bial: &str) -> Self {
        Family {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            ip_serial_no: None,
            current_bial: Some(bial.to_string()),
        }
    }

    pub fn with_serial(mut self, ip_serial_no: Option<i64>) -> Self {
        self.ip_serial_no = ip_serial_no;
        self
    }

    pub fn name_key(&self) -> String {
        name_key(&self.name)
    }

    pub fn is_assigned(&self) -> bool {
        self.current_bial.is_some()
    }

    pub fn is_in(&self, bial: &str) -> bool {
        self.current_bial.as_deref() == Some(bial)
    }
}

// ============================================================================
// HYDRATED VIEW
// ============================================================================

/// A roster row for one month: the family plus its tithe for that month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyWithTithe {
    #[serde(flatten)]
    pub family: Family,

    /// Zero when the family has no log for the month
    pub tithe: Tithe,
    pub total: f64,
    pub has_log: bool,
}

// ============================================================================
// ROSTER ORDER
// ============================================================================

/// Ascending serial number, missing serials last, ties broken by name
pub fn roster_order(
    a_serial: Option<i64>,
    a_name: &str,
    b_serial: Option<i64>,
    b_name: &str,
) -> Ordering {
    let serial = match (a_serial, b_serial) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    serial.then_with(|| name_key(a_name).cmp(&name_key(b_name)))
}

pub fn sort_roster(families: &mut [Family]) {
    families.sort_by(|a, b| roster_order(a.ip_serial_no, &a.name, b.ip_serial_no, &b.name));
}

// ============================================================================
// TESTS
// ============================================================================
