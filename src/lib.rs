// Tithe Ledger - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod config;
pub mod logging;
pub mod db;
pub mod entities;
pub mod deduplication;
pub mod parser;
pub mod archive;         // Archival Gate
pub mod upsert;          // Upsert/Transaction Engine
pub mod membership;      // Membership & Transfer Manager
pub mod reconciliation;  // Bulk Import Reconciler
pub mod aggregation;     // Aggregation Engine
pub mod service;

// Re-export commonly used types
pub use error::{LedgerError, Result};
pub use config::Config;
pub use db::{open_database, open_in_memory, setup_database, Event};
pub use entities::{
    BialInfo, Vawngtu,
    Family, FamilyWithTithe,
    Category, Tithe, TitheLog, TithePatch,
    Session, UserRole,
};
pub use parser::{
    ContributionRow, FamilyRow, NumericPolicy,
    load_contribution_rows, load_family_rows,
    read_contribution_rows, read_family_rows,
};
pub use archive::{is_locked, Clock, FixedClock, SystemClock};
pub use membership::{BulkRemoveOutcome, FamilyUpdate, TransferOutcome};
pub use reconciliation::{
    ContributionImportReport, FamilyImportReport, ImportReconciler, SkippedRow,
};
pub use aggregation::{
    AggregateReportData, BialTotal, FamilyYearlyData, MonthTotal, ReportScope,
    YearlyFamilyTotal,
};
pub use service::TitheService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
