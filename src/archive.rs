// 🔒 Archival Gate - decides whether a year still accepts edits
//
// locked = archived OR year < current calendar year
//
// The gate is a pure predicate. It is re-evaluated on every mutating call,
// never cached, so a year rolls over or gets re-opened immediately.

use crate::error::{LedgerError, Result};
use chrono::{Datelike, Utc};

// ============================================================================
// CLOCK
// ============================================================================

/// Source of "today" for the chronological rule
pub trait Clock: Send + Sync {
    fn current_year(&self) -> i32;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn current_year(&self) -> i32 {
        Utc::now().year()
    }
}

/// A clock pinned to one year (tests, back-office replays)
pub struct FixedClock {
    pub year: i32,
}

impl FixedClock {
    pub fn new(year: i32) -> Self {
        FixedClock { year }
    }
}

impl Clock for FixedClock {
    fn current_year(&self) -> i32 {
        self.year
    }
}

// ============================================================================
// GATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    Archived,
    PastYear,
}

/// Why a year is locked, or None when it is open
pub fn lock_reason(year: i32, archived: bool, current_year: i32) -> Option<LockReason> {
    if archived {
        Some(LockReason::Archived)
    } else if year < current_year {
        Some(LockReason::PastYear)
    } else {
        None
    }
}

pub fn is_locked(year: i32, archived: bool, current_year: i32) -> bool {
    lock_reason(year, archived, current_year).is_some()
}

pub fn ensure_unlocked(year: i32, archived: bool, current_year: i32) -> Result<()> {
    if is_locked(year, archived, current_year) {
        Err(LedgerError::LockedPeriod { year })
    } else {
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
