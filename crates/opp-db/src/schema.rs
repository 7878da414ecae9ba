//! Schema definitions and migration runner for SurrealDB.
//!
//! Tables are SCHEMAFULL. UUIDs and references are stored as strings;
//! a reference field asserts that the record it names exists, so an
//! insert racing a delete fails instead of leaving a dangling row.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{debug, info};

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "parking_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1 — parking tables
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Users (record key = username)
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD username ON TABLE user TYPE string;
DEFINE FIELD name ON TABLE user TYPE string;
DEFINE FIELD surname ON TABLE user TYPE string;
DEFINE FIELD email ON TABLE user TYPE string;
DEFINE FIELD password_hash ON TABLE user TYPE string;
DEFINE FIELD role ON TABLE user TYPE string \
    ASSERT $value IN ['superuser', 'admin', 'controller', 'user'];
DEFINE FIELD created_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_user_email ON TABLE user COLUMNS email UNIQUE;

-- =======================================================================
-- Cars (record key = normalised plate)
-- =======================================================================
DEFINE TABLE car SCHEMAFULL;
DEFINE FIELD plate ON TABLE car TYPE string;
DEFINE FIELD brand ON TABLE car TYPE string;
DEFINE FIELD model ON TABLE car TYPE string;
DEFINE FIELD owner ON TABLE car TYPE string \
    ASSERT record::exists(type::record('user', $value));
DEFINE INDEX idx_car_owner ON TABLE car COLUMNS owner;

-- =======================================================================
-- Zones; geometry is GeoJSON Polygon text
-- =======================================================================
DEFINE TABLE zone SCHEMAFULL;
DEFINE FIELD name ON TABLE zone TYPE string;
DEFINE FIELD available ON TABLE zone TYPE bool DEFAULT true;
DEFINE FIELD geometry ON TABLE zone TYPE string;
DEFINE FIELD metadata ON TABLE zone TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD price_offset ON TABLE zone TYPE float;
DEFINE FIELD price_lin ON TABLE zone TYPE float;
DEFINE FIELD price_exp ON TABLE zone TYPE float;
DEFINE FIELD min_lon ON TABLE zone TYPE float;
DEFINE FIELD min_lat ON TABLE zone TYPE float;
DEFINE FIELD max_lon ON TABLE zone TYPE float;
DEFINE FIELD max_lat ON TABLE zone TYPE float;
-- written by every ticket or fine insert, so it conflicts with a zone delete
DEFINE FIELD last_issued_at ON TABLE zone TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE zone TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE zone TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_zone_name ON TABLE zone COLUMNS name UNIQUE;
DEFINE INDEX idx_zone_lon ON TABLE zone COLUMNS min_lon, max_lon;

-- Single row `zone_guard:main`; every zone geometry write bumps version
DEFINE TABLE zone_guard SCHEMAFULL;
DEFINE FIELD version ON TABLE zone_guard TYPE int DEFAULT 0;

DEFINE TABLE zone_user_role SCHEMAFULL;
DEFINE FIELD zone_id ON TABLE zone_user_role TYPE string \
    ASSERT record::exists(type::record('zone', $value));
DEFINE FIELD username ON TABLE zone_user_role TYPE string;
DEFINE FIELD role ON TABLE zone_user_role TYPE string \
    ASSERT $value IN ['admin', 'controller'];
DEFINE FIELD assigned_by ON TABLE zone_user_role TYPE string;
DEFINE FIELD assigned_at ON TABLE zone_user_role TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_zone_user_role_zone_user ON TABLE zone_user_role \
    COLUMNS zone_id, username UNIQUE;
DEFINE INDEX idx_zone_user_role_user ON TABLE zone_user_role \
    COLUMNS username;

-- =======================================================================
-- Tickets
-- =======================================================================
DEFINE TABLE ticket SCHEMAFULL;
DEFINE FIELD plate ON TABLE ticket TYPE string \
    ASSERT record::exists(type::record('car', $value));
DEFINE FIELD zone_id ON TABLE ticket TYPE string \
    ASSERT record::exists(type::record('zone', $value));
DEFINE FIELD start_date ON TABLE ticket TYPE datetime;
DEFINE FIELD end_date ON TABLE ticket TYPE datetime;
DEFINE FIELD price ON TABLE ticket TYPE float;
DEFINE FIELD paid ON TABLE ticket TYPE bool DEFAULT false;
DEFINE FIELD creation_time ON TABLE ticket TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_ticket_plate ON TABLE ticket COLUMNS plate;
DEFINE INDEX idx_ticket_zone ON TABLE ticket COLUMNS zone_id;

-- =======================================================================
-- Fines
-- =======================================================================
DEFINE TABLE fine SCHEMAFULL;
DEFINE FIELD plate ON TABLE fine TYPE string \
    ASSERT record::exists(type::record('car', $value));
DEFINE FIELD zone_id ON TABLE fine TYPE string \
    ASSERT record::exists(type::record('zone', $value));
DEFINE FIELD amount ON TABLE fine TYPE float ASSERT $value > 0;
DEFINE FIELD paid ON TABLE fine TYPE bool DEFAULT false;
DEFINE FIELD date ON TABLE fine TYPE datetime DEFAULT time::now();
DEFINE INDEX idx_fine_plate ON TABLE fine COLUMNS plate;
DEFINE INDEX idx_fine_zone ON TABLE fine COLUMNS zone_id;

-- =======================================================================
-- Totems (record key = kiosk id)
-- =======================================================================
DEFINE TABLE totem SCHEMAFULL;
DEFINE FIELD zone_id ON TABLE totem TYPE string \
    ASSERT record::exists(type::record('zone', $value));
DEFINE FIELD latitude ON TABLE totem TYPE float;
DEFINE FIELD longitude ON TABLE totem TYPE float;
DEFINE FIELD registration_time ON TABLE totem TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_totem_zone ON TABLE totem COLUMNS zone_id;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Apply every migration newer than the recorded schema version.
///
/// The `_migration` table is created on first use. Each applied
/// migration is recorded, so calling this on an up-to-date database is a
/// no-op.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let current = schema_version(db).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        debug!(version = current, "Schema up to date");
        return Ok(());
    }

    for migration in pending {
        apply(db, migration).await?;
    }
    Ok(())
}

/// Highest applied migration version, `0` on a fresh database.
pub async fn schema_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    Ok(records.first().map(|m| m.version).unwrap_or(0))
}

async fn apply<C: Connection>(db: &Surreal<C>, migration: &Migration) -> Result<(), DbError> {
    info!(
        version = migration.version,
        name = migration.name,
        "Applying migration"
    );
    let failed = |stage: &str, e: surrealdb::Error| {
        DbError::Migration(format!(
            "v{} '{}' {stage}: {e}",
            migration.version, migration.name
        ))
    };

    db.query(migration.sql)
        .await?
        .check()
        .map_err(|e| failed("failed", e))?;
    db.query("CREATE _migration SET version = $version, name = $name")
        .bind(("version", migration.version))
        .bind(("name", migration.name))
        .await?
        .check()
        .map_err(|e| failed("could not be recorded", e))?;

    info!(version = migration.version, "Migration applied");
    Ok(())
}

/// Raw DDL of schema version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}
