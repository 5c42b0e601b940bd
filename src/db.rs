use crate::entities::{BialInfo, Family, Tithe, TitheLog, UserRole, Vawngtu};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Event for audit trail ("Every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Open (or create) a file-backed store and make sure the schema exists
pub fn open_database(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery (in-memory databases report "memory")
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Families (identity + current unit assignment)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS families (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            ip_serial_no INTEGER,
            current_bial TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Tithe logs: exactly one row per (year, month, family)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tithe_logs (
            id TEXT PRIMARY KEY,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
            family_id TEXT NOT NULL REFERENCES families(id) ON DELETE CASCADE,
            upa_bial TEXT NOT NULL,
            pathian_ram REAL NOT NULL DEFAULT 0,
            ramthar REAL NOT NULL DEFAULT 0,
            tualchhung REAL NOT NULL DEFAULT 0,
            last_updated TEXT NOT NULL,
            UNIQUE (year, month, family_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Year-scoped unit metadata
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS upa_bials (
            year INTEGER NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            PRIMARY KEY (year, name)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bial_info (
            year INTEGER NOT NULL,
            bial TEXT NOT NULL,
            vawngtu TEXT NOT NULL,
            PRIMARY KEY (year, bial)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS archive_status (
            year INTEGER PRIMARY KEY,
            archived INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_roles (
            uid TEXT PRIMARY KEY,
            email TEXT NOT NULL DEFAULT '',
            display_name TEXT NOT NULL DEFAULT '',
            is_admin INTEGER NOT NULL DEFAULT 0,
            assigned_bial TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_families_bial ON families(current_bial)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_logs_period ON tithe_logs(year, month)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_logs_family ON tithe_logs(family_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_logs_bial ON tithe_logs(year, upa_bial)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const FAMILY_COLUMNS: &str = "id, name, ip_serial_no, current_bial";

const LOG_COLUMNS: &str =
    "id, year, month, family_id, upa_bial, pathian_ram, ramthar, tualchhung, last_updated";

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn family_from_row(row: &Row) -> rusqlite::Result<Family> {
    Ok(Family {
        id: row.get(0)?,
        name: row.get(1)?,
        ip_serial_no: row.get(2)?,
        current_bial: row.get(3)?,
    })
}

fn log_from_row(row: &Row) -> rusqlite::Result<TitheLog> {
    let last_updated: String = row.get(8)?;

    Ok(TitheLog {
        id: row.get(0)?,
        year: row.get(1)?,
        month: row.get(2)?,
        family_id: row.get(3)?,
        upa_bial: row.get(4)?,
        tithe: Tithe {
            pathian_ram: row.get(5)?,
            ramthar: row.get(6)?,
            tualchhung: row.get(7)?,
        },
        last_updated: parse_timestamp(8, &last_updated)?,
    })
}

// ============================================================================
// FAMILIES
// ============================================================================

pub fn insert_family(conn: &Connection, family: &Family) -> Result<()> {
    conn.execute(
        "INSERT INTO families (id, name, ip_serial_no, current_bial) VALUES (?1, ?2, ?3, ?4)",
        params![
            family.id,
            family.name,
            family.ip_serial_no,
            family.current_bial
        ],
    )?;
    Ok(())
}

pub fn get_family(conn: &Connection, id: &str) -> Result<Option<Family>> {
    let family = conn
        .query_row(
            &format!("SELECT {} FROM families WHERE id = ?1", FAMILY_COLUMNS),
            [id],
            family_from_row,
        )
        .optional()?;
    Ok(family)
}

/// Current roster of a unit, unsorted
pub fn families_in_bial(conn: &Connection, bial: &str) -> Result<Vec<Family>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM families WHERE current_bial = ?1",
        FAMILY_COLUMNS
    ))?;

    let families = stmt
        .query_map([bial], family_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(families)
}

pub fn unassigned_families(conn: &Connection) -> Result<Vec<Family>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM families WHERE current_bial IS NULL ORDER BY name COLLATE NOCASE",
        FAMILY_COLUMNS
    ))?;

    let families = stmt
        .query_map([], family_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(families)
}

/// Returns the number of rows changed (0 when the family does not exist)
pub fn set_family_bial(conn: &Connection, id: &str, bial: Option<&str>) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE families SET current_bial = ?1 WHERE id = ?2",
        params![bial, id],
    )?;
    Ok(changed)
}

pub fn update_family_fields(
    conn: &Connection,
    id: &str,
    name: &str,
    ip_serial_no: Option<i64>,
) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE families SET name = ?1, ip_serial_no = ?2 WHERE id = ?3",
        params![name, ip_serial_no, id],
    )?;
    Ok(changed)
}

/// Hard delete: logs first, then the family row
pub fn delete_family(conn: &Connection, id: &str) -> Result<usize> {
    conn.execute("DELETE FROM tithe_logs WHERE family_id = ?1", [id])?;
    let deleted = conn.execute("DELETE FROM families WHERE id = ?1", [id])?;
    Ok(deleted)
}

// ============================================================================
// TITHE LOGS
// ============================================================================

pub fn get_log(
    conn: &Connection,
    year: i32,
    month: u32,
    family_id: &str,
) -> Result<Option<TitheLog>> {
    let log = conn
        .query_row(
            &format!(
                "SELECT {} FROM tithe_logs WHERE year = ?1 AND month = ?2 AND family_id = ?3",
                LOG_COLUMNS
            ),
            params![year, month, family_id],
            log_from_row,
        )
        .optional()?;
    Ok(log)
}

pub fn insert_log(conn: &Connection, log: &TitheLog) -> Result<()> {
    conn.execute(
        "INSERT INTO tithe_logs (
            id, year, month, family_id, upa_bial,
            pathian_ram, ramthar, tualchhung, last_updated
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            log.id,
            log.year,
            log.month,
            log.family_id,
            log.upa_bial,
            log.tithe.pathian_ram,
            log.tithe.ramthar,
            log.tithe.tualchhung,
            log.last_updated.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Overwrite the tithe of an existing log; upa_bial is left untouched
pub fn update_log_tithe(
    conn: &Connection,
    year: i32,
    month: u32,
    family_id: &str,
    tithe: &Tithe,
    last_updated: DateTime<Utc>,
) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE tithe_logs
         SET pathian_ram = ?1, ramthar = ?2, tualchhung = ?3, last_updated = ?4
         WHERE year = ?5 AND month = ?6 AND family_id = ?7",
        params![
            tithe.pathian_ram,
            tithe.ramthar,
            tithe.tualchhung,
            last_updated.to_rfc3339(),
            year,
            month,
            family_id
        ],
    )?;
    Ok(changed)
}

/// Overwrite both the tithe and the attributed unit (contribution import)
pub fn replace_log(conn: &Connection, log: &TitheLog) -> Result<()> {
    conn.execute(
        "INSERT INTO tithe_logs (
            id, year, month, family_id, upa_bial,
            pathian_ram, ramthar, tualchhung, last_updated
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT (year, month, family_id) DO UPDATE SET
            upa_bial = excluded.upa_bial,
            pathian_ram = excluded.pathian_ram,
            ramthar = excluded.ramthar,
            tualchhung = excluded.tualchhung,
            last_updated = excluded.last_updated",
        params![
            log.id,
            log.year,
            log.month,
            log.family_id,
            log.upa_bial,
            log.tithe.pathian_ram,
            log.tithe.ramthar,
            log.tithe.tualchhung,
            log.last_updated.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// All logs of a year, or of one month of it
pub fn logs_for_period(conn: &Connection, year: i32, month: Option<u32>) -> Result<Vec<TitheLog>> {
    let logs = match month {
        Some(month) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tithe_logs WHERE year = ?1 AND month = ?2",
                LOG_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![year, month], log_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tithe_logs WHERE year = ?1",
                LOG_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![year], log_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
    };

    Ok(logs)
}

pub fn logs_for_family(conn: &Connection, year: i32, family_id: &str) -> Result<Vec<TitheLog>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM tithe_logs WHERE year = ?1 AND family_id = ?2 ORDER BY month",
        LOG_COLUMNS
    ))?;

    let logs = stmt
        .query_map(params![year, family_id], log_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(logs)
}

pub fn logs_for_bial(conn: &Connection, year: i32, bial: &str) -> Result<Vec<TitheLog>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM tithe_logs WHERE year = ?1 AND upa_bial = ?2",
        LOG_COLUMNS
    ))?;

    let logs = stmt
        .query_map(params![year, bial], log_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(logs)
}

/// Rewrite upa_bial on every log of a family, across all years
pub fn reassign_family_logs(conn: &Connection, family_id: &str, bial: &str) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE tithe_logs SET upa_bial = ?1 WHERE family_id = ?2",
        params![bial, family_id],
    )?;
    Ok(changed)
}

// ============================================================================
// ARCHIVE STATUS
// ============================================================================

pub fn get_archive_flag(conn: &Connection, year: i32) -> Result<bool> {
    let archived: Option<bool> = conn
        .query_row(
            "SELECT archived FROM archive_status WHERE year = ?1",
            [year],
            |row| row.get(0),
        )
        .optional()?;
    Ok(archived.unwrap_or(false))
}

pub fn set_archive_flag(conn: &Connection, year: i32, archived: bool) -> Result<()> {
    conn.execute(
        "INSERT INTO archive_status (year, archived, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (year) DO UPDATE SET archived = excluded.archived, updated_at = excluded.updated_at",
        params![year, archived, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

// ============================================================================
// UPA BIALS
// ============================================================================

pub fn get_upa_bials(conn: &Connection, year: i32) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT name FROM upa_bials WHERE year = ?1 ORDER BY position")?;

    let names = stmt
        .query_map([year], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;

    Ok(names)
}

/// Replace the whole ordered list for a year
pub fn replace_upa_bials(conn: &Connection, year: i32, names: &[String]) -> Result<()> {
    conn.execute("DELETE FROM upa_bials WHERE year = ?1", [year])?;

    let mut stmt =
        conn.prepare("INSERT INTO upa_bials (year, position, name) VALUES (?1, ?2, ?3)")?;
    for (position, name) in names.iter().enumerate() {
        stmt.execute(params![year, position as i64, name])?;
    }

    Ok(())
}

/// A unit is in use when families are assigned to it or it has logs that year
pub fn bial_in_use(conn: &Connection, year: i32, bial: &str) -> Result<bool> {
    let in_use: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM families WHERE current_bial = ?2)
             OR EXISTS (SELECT 1 FROM tithe_logs WHERE year = ?1 AND upa_bial = ?2)",
        params![year, bial],
        |row| row.get(0),
    )?;
    Ok(in_use)
}

// ============================================================================
// BIAL INFO
// ============================================================================

pub fn get_bial_info(conn: &Connection, year: i32, bial: &str) -> Result<Option<BialInfo>> {
    let vawngtu_json: Option<String> = conn
        .query_row(
            "SELECT vawngtu FROM bial_info WHERE year = ?1 AND bial = ?2",
            params![year, bial],
            |row| row.get(0),
        )
        .optional()?;

    match vawngtu_json {
        Some(json) => {
            let vawngtu: Vec<Vawngtu> = serde_json::from_str(&json)?;
            Ok(Some(BialInfo {
                year,
                bial: bial.to_string(),
                vawngtu,
            }))
        }
        None => Ok(None),
    }
}

pub fn put_bial_info(conn: &Connection, info: &BialInfo) -> Result<()> {
    let vawngtu_json = serde_json::to_string(&info.vawngtu)?;
    conn.execute(
        "INSERT INTO bial_info (year, bial, vawngtu) VALUES (?1, ?2, ?3)
         ON CONFLICT (year, bial) DO UPDATE SET vawngtu = excluded.vawngtu",
        params![info.year, info.bial, vawngtu_json],
    )?;
    Ok(())
}

// ============================================================================
// USER ROLES
// ============================================================================

pub fn get_user_role(conn: &Connection, uid: &str) -> Result<Option<UserRole>> {
    let role = conn
        .query_row(
            "SELECT uid, email, display_name, is_admin, assigned_bial FROM user_roles WHERE uid = ?1",
            [uid],
            |row| {
                Ok(UserRole {
                    uid: row.get(0)?,
                    email: row.get(1)?,
                    display_name: row.get(2)?,
                    is_admin: row.get(3)?,
                    assigned_bial: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(role)
}

pub fn upsert_user_role(conn: &Connection, role: &UserRole) -> Result<()> {
    conn.execute(
        "INSERT INTO user_roles (uid, email, display_name, is_admin, assigned_bial)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (uid) DO UPDATE SET
            email = excluded.email,
            display_name = excluded.display_name,
            is_admin = excluded.is_admin,
            assigned_bial = excluded.assigned_bial",
        params![
            role.uid,
            role.email,
            role.display_name,
            role.is_admin,
            role.assigned_bial
        ],
    )?;
    Ok(())
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(1, &timestamp_str)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(events)
}
