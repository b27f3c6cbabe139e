//! Row <-> record mapping shared by the per-entity stores.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use scribe_types::application::Application;
use scribe_types::earning::Earning;
use scribe_types::message::Message;
use scribe_types::user::User;

use crate::StoreError;

/// Records stored as a JSON body plus a revision column.
pub(crate) trait Document: Serialize + DeserializeOwned {
    fn revision_mut(&mut self) -> &mut i64;
    fn touch(&mut self, now: DateTime<Utc>);
}

macro_rules! document {
    ($ty:ty) => {
        impl Document for $ty {
            fn revision_mut(&mut self) -> &mut i64 {
                &mut self.revision
            }

            fn touch(&mut self, now: DateTime<Utc>) {
                self.updated_at = now;
            }
        }
    };
}

document!(User);
document!(Application);
document!(Earning);
document!(Message);

/// Fixed-width UTC timestamp, so string order is time order.
pub(crate) fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn encode<T: Document>(record: &T) -> Result<String> {
    serde_json::to_string(record).context("failed to encode record")
}

fn decode<T: Document>(body: &str, revision: i64) -> Result<T> {
    let mut record: T = serde_json::from_str(body).context("corrupt record body")?;
    *record.revision_mut() = revision;
    Ok(record)
}

/// Run a `SELECT body, revision ...` query and decode every row.
pub(crate) fn load_all<T: Document, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.iter().map(|(body, revision)| decode(body, *revision)).collect()
}

pub(crate) fn load_one<T: Document, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Option<T>> {
    Ok(load_all(conn, sql, params)?.into_iter().next())
}

/// Prepare a record for an update: stamp `updated_at` and encode it.
pub(crate) fn stage<T: Document>(record: &mut T) -> Result<String> {
    record.touch(Utc::now());
    encode(record)
}

/// Interpret the row count of a revision-checked UPDATE.
pub(crate) fn finish_update<T: Document>(
    conn: &Connection,
    table: &str,
    id: &str,
    changed: usize,
    what: &'static str,
    record: &mut T,
) -> Result<()> {
    if changed == 1 {
        *record.revision_mut() += 1;
        return Ok(());
    }

    let exists: bool = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table),
        [id],
        |r| r.get(0),
    )?;
    if exists {
        Err(StoreError::Conflict(format!(
            "{} was modified by someone else, reload and retry",
            what
        ))
        .into())
    } else {
        Err(StoreError::NotFound(what).into())
    }
}

/// Turn a UNIQUE constraint failure into a [`StoreError::Conflict`].
pub(crate) fn unique_conflict(err: rusqlite::Error, msg: &str) -> anyhow::Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            StoreError::Conflict(msg.to_string()).into()
        }
        _ => err.into(),
    }
}
