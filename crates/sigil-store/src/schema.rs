use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 2;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    // Checkpoint every ~400KB instead of the default ~4MB
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    // Fold stale WAL data into the main DB on startup. In-memory and fresh
    // databases legitimately fail this, so errors are ignored.
    if conn
        .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .is_ok()
    {
        tracing::info!("startup WAL checkpoint complete");
    }

    // Fresh databases get the full v2 layout. On v1 databases the sigils
    // table already exists without external_id; it is added below.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sigils (
            id           TEXT PRIMARY KEY,
            pattern      BLOB NOT NULL,
            category     TEXT NOT NULL,
            source_kind  TEXT NOT NULL,
            strength     REAL NOT NULL,
            created_at   INTEGER NOT NULL,
            origin_hash  INTEGER NOT NULL,
            tags         TEXT NOT NULL DEFAULT '{}',
            external_id  TEXT
        );

        CREATE TABLE IF NOT EXISTS braids (
            id              TEXT PRIMARY KEY,
            created_at      INTEGER NOT NULL,
            fusion_score    REAL NOT NULL,
            classification  TEXT NOT NULL,
            body            TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS braid_participants (
            braid_id  TEXT NOT NULL REFERENCES braids(id) ON DELETE CASCADE,
            sigil_id  TEXT NOT NULL,
            position  INTEGER NOT NULL,
            PRIMARY KEY (braid_id, sigil_id)
        );

        CREATE INDEX IF NOT EXISTS idx_sigil_category ON sigils(category);
        CREATE INDEX IF NOT EXISTS idx_sigil_source_kind ON sigils(source_kind);
        CREATE INDEX IF NOT EXISTS idx_participant_sigil ON braid_participants(sigil_id);
        ",
    )?;

    // Add external_id to v1 databases that lack it
    if conn
        .prepare("SELECT external_id FROM sigils LIMIT 0")
        .is_err()
    {
        conn.execute_batch("ALTER TABLE sigils ADD COLUMN external_id TEXT;")?;
        backfill_external_ids(conn)?;
    }

    // Safe to run after ALTER TABLE or on a fresh db
    conn.execute_batch("CREATE INDEX IF NOT EXISTS idx_sigil_external ON sigils(external_id);")?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Copy `linkedEntityId` out of the tags JSON into the indexed column.
fn backfill_external_ids(conn: &Connection) -> Result<()> {
    let updated = conn.execute(
        "UPDATE sigils SET external_id = json_extract(tags, '$.linkedEntityId')
         WHERE external_id IS NULL AND json_valid(tags)",
        [],
    )?;
    if updated > 0 {
        tracing::info!("backfilled external ids on {updated} sigils");
    }
    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}
