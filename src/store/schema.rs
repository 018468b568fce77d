//! Schema Manager: creates tables on empty databases and upgrades a legacy
//! (version 0) layout to the current layout (version 1).

use rusqlite::Connection;

use crate::error::EngineError;

pub const DB_VERSION: i64 = 1;

const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS devices (
        int_id INTEGER PRIMARY KEY AUTOINCREMENT,
        device VARCHAR(255) UNIQUE
    );

    CREATE TABLE IF NOT EXISTS channels (
        int_id INTEGER PRIMARY KEY AUTOINCREMENT,
        device VARCHAR(255),
        control VARCHAR(255)
    );

    CREATE TABLE IF NOT EXISTS groups (
        int_id INTEGER PRIMARY KEY AUTOINCREMENT,
        group_id VARCHAR(255)
    );

    CREATE TABLE IF NOT EXISTS data (
        uid INTEGER PRIMARY KEY AUTOINCREMENT,
        device INTEGER,
        channel INTEGER,
        value VARCHAR(255),
        timestamp REAL DEFAULT (julianday('now')),
        group_id INTEGER
    );

    CREATE TABLE IF NOT EXISTS variables (
        name VARCHAR(255) PRIMARY KEY,
        value VARCHAR(255)
    );

    CREATE INDEX IF NOT EXISTS data_topic ON data (channel);
    CREATE INDEX IF NOT EXISTS data_topic_timestamp ON data (channel, timestamp);
    CREATE INDEX IF NOT EXISTS data_gid ON data (group_id);
    CREATE INDEX IF NOT EXISTS data_gid_timestamp ON data (group_id, timestamp);
";

/// Create all tables/indexes (idempotent) and stamp `db_version`.
pub fn create_tables(conn: &Connection) -> Result<(), EngineError> {
    conn.execute_batch(CREATE_TABLES)?;
    conn.execute(
        "INSERT OR REPLACE INTO variables (name, value) VALUES ('db_version', ?1)",
        [DB_VERSION],
    )?;
    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, EngineError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn read_db_version(conn: &Connection) -> Result<i64, EngineError> {
    if !table_exists(conn, "variables")? {
        return Ok(0);
    }

    let version: Option<i64> = conn
        .query_row(
            "SELECT value FROM variables WHERE name = 'db_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .ok()
        .and_then(|v| v.parse().ok());

    Ok(version.unwrap_or(0))
}

/// Rewrite a legacy (version 0) `data` table — textual `device`/`control`/
/// `group_id`, string timestamps — into the current integer-keyed schema.
/// Runs inside one transaction; any failure rolls everything back.
fn upgrade_from_v0(conn: &mut Connection) -> Result<(), EngineError> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        "
        ALTER TABLE data RENAME TO tmp;
        DROP INDEX IF EXISTS data_topic;
        DROP INDEX IF EXISTS data_topic_timestamp;
        DROP INDEX IF EXISTS data_gid;
        DROP INDEX IF EXISTS data_gid_timestamp;
        ",
    )
    .map_err(|e| EngineError::UpgradeFailed(e.to_string()))?;

    create_tables(&tx).map_err(|e| EngineError::UpgradeFailed(e.to_string()))?;

    tx.execute_batch(
        "
        INSERT OR IGNORE INTO devices (device) SELECT device FROM tmp GROUP BY device;
        INSERT OR IGNORE INTO channels (device, control) SELECT device, control FROM tmp GROUP BY device, control;
        INSERT OR IGNORE INTO groups (group_id) SELECT group_id FROM tmp GROUP BY group_id;

        INSERT INTO data (uid, device, channel, value, timestamp, group_id)
        SELECT tmp.uid, devices.int_id, channels.int_id, tmp.value, julianday(tmp.timestamp), groups.int_id
        FROM tmp
        LEFT JOIN devices ON tmp.device = devices.device
        LEFT JOIN channels ON tmp.device = channels.device AND tmp.control = channels.control
        LEFT JOIN groups ON tmp.group_id = groups.group_id;

        DROP TABLE tmp;
        ",
    )
    .map_err(|e| EngineError::UpgradeFailed(e.to_string()))?;

    tx.commit()
        .map_err(|e| EngineError::UpgradeFailed(e.to_string()))?;

    conn.execute_batch("VACUUM")?;

    Ok(())
}

/// Open-time schema setup: create tables on a fresh file, upgrade a legacy
/// one, or leave an up-to-date one untouched (idempotent `CREATE TABLE IF
/// NOT EXISTS`).
pub fn ensure_schema(conn: &mut Connection) -> Result<(), EngineError> {
    if !table_exists(conn, "data")? {
        tracing::info!("creating tables on new database");
        return create_tables(conn);
    }

    let version = read_db_version(conn)?;
    match version.cmp(&DB_VERSION) {
        std::cmp::Ordering::Greater => Err(EngineError::SchemaTooNew),
        std::cmp::Ordering::Equal => {
            tracing::debug!("schema already at version {DB_VERSION}");
            create_tables(conn)
        }
        std::cmp::Ordering::Less => {
            tracing::warn!("old database format found (version {version}), upgrading");
            upgrade_from_v0(conn)
        }
    }
}
