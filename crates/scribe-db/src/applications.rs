use anyhow::Result;
use rusqlite::{Connection, params};
use tracing::warn;
use uuid::Uuid;

use scribe_types::application::{Application, ApplicationStatus};

use crate::Database;
use crate::codec::{encode, finish_update, load_all, load_one, stage, ts, unique_conflict};

const SELECT: &str = "SELECT body, revision FROM applications";

pub fn insert(conn: &Connection, app: &Application) -> Result<()> {
    conn.execute(
        "INSERT INTO applications (id, writer_id, status, current_step, submitted_at, created_at, revision, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            app.id.to_string(),
            app.writer_id.to_string(),
            app.status.as_str(),
            app.current_step,
            app.submitted_at.as_ref().map(ts),
            ts(&app.created_at),
            app.revision,
            encode(app)?,
        ],
    )
    .map_err(|e| unique_conflict(e, "this writer already has an application"))?;
    Ok(())
}

pub fn update(conn: &Connection, app: &mut Application) -> Result<()> {
    let body = stage(app)?;
    let id = app.id.to_string();
    let changed = conn.execute(
        "UPDATE applications
         SET status = ?1, current_step = ?2, submitted_at = ?3, body = ?4,
             revision = revision + 1
         WHERE id = ?5 AND revision = ?6",
        params![
            app.status.as_str(),
            app.current_step,
            app.submitted_at.as_ref().map(ts),
            body,
            id,
            app.revision,
        ],
    )?;
    finish_update(conn, "applications", &id, changed, "application", app)
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<Application>> {
    load_one(conn, &format!("{} WHERE id = ?1", SELECT), [id.to_string()])
}

pub fn get_by_writer(conn: &Connection, writer_id: Uuid) -> Result<Option<Application>> {
    load_one(conn, &format!("{} WHERE writer_id = ?1", SELECT), [writer_id.to_string()])
}

/// Applications in `status` (or all), newest first.
pub fn list(conn: &Connection, status: Option<ApplicationStatus>) -> Result<Vec<Application>> {
    load_all(
        conn,
        &format!("{} WHERE (?1 IS NULL OR status = ?1) ORDER BY created_at DESC", SELECT),
        [status.map(|s| s.as_str())],
    )
}

/// The review queue: submitted applications, oldest submission first.
pub fn pending_reviews(conn: &Connection) -> Result<Vec<Application>> {
    load_all(
        conn,
        &format!("{} WHERE status = ?1 ORDER BY submitted_at ASC", SELECT),
        [ApplicationStatus::Submitted.as_str()],
    )
}

pub fn count_by_status(conn: &Connection) -> Result<Vec<(ApplicationStatus, u64)>> {
    let mut stmt =
        conn.prepare("SELECT status, COUNT(*) FROM applications GROUP BY status ORDER BY status")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .filter_map(|(status, count)| match ApplicationStatus::parse(&status) {
            Some(s) => Some((s, count as u64)),
            None => {
                warn!("Unknown application status '{}' in {} rows", status, count);
                None
            }
        })
        .collect())
}

impl Database {
    pub fn insert_application(&self, app: &Application) -> Result<()> {
        self.with_conn(|conn| insert(conn, app))
    }

    pub fn update_application(&self, app: &mut Application) -> Result<()> {
        self.with_conn(|conn| update(conn, app))
    }

    pub fn get_application(&self, id: Uuid) -> Result<Option<Application>> {
        self.with_conn(|conn| get(conn, id))
    }

    pub fn get_application_by_writer(&self, writer_id: Uuid) -> Result<Option<Application>> {
        self.with_conn(|conn| get_by_writer(conn, writer_id))
    }

    pub fn list_applications(&self, status: Option<ApplicationStatus>) -> Result<Vec<Application>> {
        self.with_conn(|conn| list(conn, status))
    }

    pub fn pending_reviews(&self) -> Result<Vec<Application>> {
        self.with_conn(pending_reviews)
    }

    pub fn count_applications_by_status(&self) -> Result<Vec<(ApplicationStatus, u64)>> {
        self.with_conn(count_by_status)
    }
}
