// 🚨 Ledger Errors - one taxonomy for every core operation
//
// Domain failures (duplicate, locked, not found, validation, permission)
// are distinct variants so callers can branch on them; infrastructure
// failures wrap their source error.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// A family with the same normalized name is already on the unit roster
    #[error("family '{name}' already exists in {bial}")]
    DuplicateFamily { name: String, bial: String },

    /// Mutation attempted on an archived or past year
    #[error("year {year} is locked for editing")]
    LockedPeriod { year: i32 },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    pub fn permission(message: impl Into<String>) -> Self {
        LedgerError::Permission(message.into())
    }

    /// Stable machine-readable code, safe to hand to a presentation layer
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::DuplicateFamily { .. } => "LEDGER/DUPLICATE_FAMILY",
            LedgerError::LockedPeriod { .. } => "LEDGER/LOCKED_PERIOD",
            LedgerError::NotFound { .. } => "LEDGER/NOT_FOUND",
            LedgerError::Validation(_) => "LEDGER/VALIDATION",
            LedgerError::Permission(_) => "LEDGER/PERMISSION",
            LedgerError::Storage(_) => "LEDGER/STORAGE",
            LedgerError::Csv(_) => "LEDGER/CSV",
            LedgerError::Io(_) => "LEDGER/IO",
            LedgerError::Json(_) => "LEDGER/JSON",
        }
    }

    /// True for failures caused by the caller's request rather than the system
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            LedgerError::DuplicateFamily { .. }
                | LedgerError::LockedPeriod { .. }
                | LedgerError::NotFound { .. }
                | LedgerError::Validation(_)
                | LedgerError::Permission(_)
        )
    }
}
