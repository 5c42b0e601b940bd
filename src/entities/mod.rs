// Entity Models
//
// Each entity has:
// - Stable identity that NEVER changes (UUID for families, natural keys elsewhere)
// - Values that change through the service's gated operations
// - Pure helpers for normalization and ordering

pub mod bial;
pub mod family;
pub mod tithe;
pub mod user;

pub use bial::{BialInfo, Vawngtu};
pub use family::{Family, FamilyWithTithe};
pub use tithe::{Category, Tithe, TitheLog, TithePatch};
pub use user::{Session, UserRole};
