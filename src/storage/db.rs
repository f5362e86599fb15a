use std::{path::Path, time::Duration};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{Connection, OpenFlags};

use crate::{
    config::StoreConfig,
    storage::{error::StorageError, schema},
};

pub type MillisSinceUnix = i64;
pub type NanosSinceUnix = i64;

/// Named memdb databases live as long as one connection to them is open.
///
/// memdb takes ordinary file locks, so writers queue on the busy timeout and
/// readers keep reading while a write transaction is open.
fn open_named_in_memory(name: &str) -> Result<Connection, rusqlite::Error> {
    Connection::open_with_flags(
        format!("file:/{name}?vfs=memdb"),
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

fn open_from_file(path: &Path) -> Result<Connection, rusqlite::Error> {
    let db = Connection::open(path)?;
    let mode: String =
        db.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!("opened {} in {mode} journal mode", path.display());
    Ok(db)
}

/// when called, opens a connection to the configured store and makes sure the schema exists
pub fn open(config: &StoreConfig) -> Result<Connection, StorageError> {
    if config.name.is_empty() {
        return Err(StorageError::InvalidConfig(
            "store name must not be empty".to_string(),
        ));
    }
    let db = if config.in_memory {
        open_named_in_memory(&config.name)?
    } else {
        let path = config.database_file().ok_or_else(|| {
            StorageError::InvalidConfig(format!(
                "on-disk store '{}' needs a directory",
                config.name
            ))
        })?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        open_from_file(&path)?
    };
    prepare(&db, config)?;
    Ok(db)
}

/// applies per-connection settings and creates missing tables
pub fn prepare(db: &Connection, config: &StoreConfig) -> Result<(), StorageError> {
    db.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    db.execute_batch("PRAGMA foreign_keys = ON;")?;
    schema::init(db)?;
    Ok(())
}

/// Track times are stored as whole nanoseconds, which covers 1677 to 2262.
pub fn datetime_to_nanos(time: &DateTime<Utc>) -> anyhow::Result<NanosSinceUnix> {
    time.timestamp_nanos_opt()
        .ok_or(anyhow!("timestamp {time} does not fit in nanoseconds"))
}

/// converts number of nanoseconds since unix epoch to utc date time
pub fn nanos_to_datetime(since_unix: NanosSinceUnix) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(since_unix)
}

pub fn duration_to_nanos(duration: Duration) -> anyhow::Result<i64> {
    i64::try_from(duration.as_nanos())
        .with_context(|| format!("duration {duration:?} does not fit in nanoseconds"))
}

pub fn nanos_to_duration(nanos: i64) -> anyhow::Result<Duration> {
    u64::try_from(nanos)
        .map(Duration::from_nanos)
        .with_context(|| format!("negative duration {nanos} ns"))
}

pub fn now_millis() -> MillisSinceUnix {
    Utc::now().timestamp_millis()
}
