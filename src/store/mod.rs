//! Store: the single-file relational database holding `devices`, `channels`,
//! `groups`, `data`, and `variables`. Owns all rows exclusively; callers
//! never see raw query text.

mod schema;

use std::collections::HashMap;
use std::sync::Mutex;

use rusqlite::{Connection, params};

use crate::error::EngineError;
use crate::ids::{ChannelId, DeviceId, GroupId};

/// One persisted row, as returned by a range query.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    pub uid: i64,
    pub channel: ChannelId,
    pub value: String,
    /// Unix seconds, fractional.
    pub timestamp: f64,
}

pub struct Store {
    conn: Mutex<Connection>,
}

/// Fractional-Julian-day epoch offset used to convert to/from Unix seconds:
/// `unix = (julian - 2440587.5) * 86400`.
const JULIAN_UNIX_EPOCH: f64 = 2_440_587.5;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Ring-buffer eviction hysteresis: eviction fires once a counter exceeds
/// `limit * (1 + EPSILON)`, batching deletes instead of evicting one row per
/// insert at the exact limit.
const EPSILON: f64 = 0.02;

impl Store {
    pub fn open(path: &str) -> Result<Self, EngineError> {
        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=OFF;")?;
        schema::ensure_schema(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let mut conn = Connection::open_in_memory()?;
        schema::ensure_schema(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ── Identifier Registry backing ──

    pub fn scan_devices(&self) -> Result<Vec<(String, DeviceId)>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT device, int_id FROM devices")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, DeviceId(row.get(1)?))))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn scan_channels(&self) -> Result<Vec<((String, String), ChannelId)>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT device, control, int_id FROM channels")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    (row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                    ChannelId(row.get(2)?),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn scan_groups(&self) -> Result<Vec<(String, GroupId)>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT group_id, int_id FROM groups")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, GroupId(row.get(1)?))))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_device(&self, name: &str) -> Result<DeviceId, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("INSERT INTO devices (device) VALUES (?1)")?;
        stmt.execute(params![name])?;
        Ok(DeviceId(conn.last_insert_rowid()))
    }

    pub fn insert_channel(&self, device: &str, control: &str) -> Result<ChannelId, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare_cached("INSERT INTO channels (device, control) VALUES (?1, ?2)")?;
        stmt.execute(params![device, control])?;
        Ok(ChannelId(conn.last_insert_rowid()))
    }

    pub fn insert_group(&self, name: &str) -> Result<GroupId, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("INSERT INTO groups (group_id) VALUES (?1)")?;
        stmt.execute(params![name])?;
        Ok(GroupId(conn.last_insert_rowid()))
    }

    // ── Retention Counters backing ──

    pub fn count_by_channel(&self) -> Result<HashMap<ChannelId, i64>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT channel, COUNT(*) FROM data GROUP BY channel")?;
        let rows = stmt
            .query_map([], |row| Ok((ChannelId(row.get(0)?), row.get::<_, i64>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(rows)
    }

    pub fn count_by_group(&self) -> Result<HashMap<GroupId, i64>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT group_id, COUNT(*) FROM data GROUP BY group_id")?;
        let rows = stmt
            .query_map([], |row| Ok((GroupId(row.get(0)?), row.get::<_, i64>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(rows)
    }

    // ── Ingestion hot path ──

    /// Insert one sample with the default (now) timestamp, returning its
    /// assigned `uid`.
    pub fn insert_sample(
        &self,
        device: DeviceId,
        channel: ChannelId,
        value: &str,
        group: GroupId,
    ) -> Result<i64, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO data (device, channel, value, group_id) VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute(params![device.0, channel.0, value, group.0])?;
        Ok(conn.last_insert_rowid())
    }

    /// Delete the oldest `count` rows for `channel`, ordered by ascending
    /// `uid`. Returns the number of rows actually deleted.
    pub fn evict_oldest_by_channel(&self, channel: ChannelId, count: i64) -> Result<u64, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "DELETE FROM data WHERE uid IN (
                SELECT uid FROM data WHERE channel = ?1 ORDER BY uid ASC LIMIT ?2
             )",
        )?;
        let deleted = stmt.execute(params![channel.0, count])?;
        Ok(deleted as u64)
    }

    /// Delete the oldest `count` rows for `group`, ordered by ascending
    /// `uid`. Returns the number of rows actually deleted.
    pub fn evict_oldest_by_group(&self, group: GroupId, count: i64) -> Result<u64, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "DELETE FROM data WHERE uid IN (
                SELECT uid FROM data WHERE group_id = ?1 ORDER BY uid ASC LIMIT ?2
             )",
        )?;
        let deleted = stmt.execute(params![group.0, count])?;
        Ok(deleted as u64)
    }

    /// Total live rows for a channel — used only by tests to assert the
    /// ring-buffer bound invariant without going through the in-memory
    /// counter cache.
    pub fn live_count_for_channel(&self, channel: ChannelId) -> Result<i64, EngineError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM data WHERE channel = ?1",
            params![channel.0],
            |row| row.get(0),
        )
        .map_err(EngineError::from)
    }

    // ── Query Service ──

    /// Run the historical range query. `channel_ids` is the ordered list of
    /// resolved channel ids from the request's `channels` array (order
    /// matters for `ver = 1`'s `c` index). `min_interval_ms = 0` disables
    /// down-sampling; when enabled, each `ROUND(timestamp * k)` bucket
    /// collapses deterministically to the row with the lowest `uid`.
    pub fn query_values(
        &self,
        channel_ids: &[ChannelId],
        timestamp_gt: f64,
        timestamp_lt: f64,
        uid_gt: i64,
        min_interval_ms: i64,
        fetch_limit: Option<i64>,
    ) -> Result<Vec<DataRow>, EngineError> {
        use rusqlite::types::Value;

        if channel_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; channel_ids.len()].join(", ");
        let mut values: Vec<Value> = channel_ids.iter().map(|id| Value::Integer(id.0)).collect();
        values.push(Value::Real(timestamp_gt));
        values.push(Value::Real(timestamp_lt));
        values.push(Value::Integer(uid_gt));

        let filtered = format!(
            "SELECT uid, channel, value, (timestamp - {JULIAN_UNIX_EPOCH}) * {SECONDS_PER_DAY} AS unix_ts, timestamp
             FROM data
             WHERE channel IN ({placeholders})
               AND timestamp > julianday(datetime(?, 'unixepoch'))
               AND timestamp < julianday(datetime(?, 'unixepoch'))
               AND uid > ?"
        );

        let sql = if min_interval_ms > 0 {
            let day_fraction = 86_400_000.0 / (min_interval_ms as f64);
            values.push(Value::Real(day_fraction));
            format!(
                "WITH filtered AS ({filtered}),
                      ranked AS (
                          SELECT uid, channel, value, unix_ts,
                                 ROW_NUMBER() OVER (
                                     PARTITION BY ROUND(timestamp * ?)
                                     ORDER BY uid ASC
                                 ) AS rn
                          FROM filtered
                      )
                 SELECT uid, channel, value, unix_ts FROM ranked WHERE rn = 1 ORDER BY uid ASC"
            )
        } else {
            format!("SELECT uid, channel, value, unix_ts FROM ({filtered}) ORDER BY uid ASC")
        };

        let sql = if let Some(limit) = fetch_limit {
            values.push(Value::Integer(limit));
            format!("{sql} LIMIT ?")
        } else {
            sql
        };

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), |row| {
                Ok(DataRow {
                    uid: row.get(0)?,
                    channel: ChannelId(row.get(1)?),
                    value: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn ring_buffer_threshold(limit: u32) -> f64 {
        (limit as f64) * (1.0 + EPSILON)
    }
}
