use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                email           TEXT NOT NULL UNIQUE,
                role            TEXT NOT NULL,
                status          TEXT NOT NULL,
                reset_digest    TEXT,
                created_at      TEXT NOT NULL,
                revision        INTEGER NOT NULL DEFAULT 0,
                body            TEXT NOT NULL
            );

            CREATE INDEX idx_users_role_status ON users(role, status);
            CREATE INDEX idx_users_reset ON users(reset_digest);

            CREATE TABLE applications (
                id              TEXT PRIMARY KEY,
                writer_id       TEXT NOT NULL UNIQUE REFERENCES users(id),
                status          TEXT NOT NULL,
                current_step    INTEGER NOT NULL,
                submitted_at    TEXT,
                created_at      TEXT NOT NULL,
                revision        INTEGER NOT NULL DEFAULT 0,
                body            TEXT NOT NULL
            );

            CREATE INDEX idx_applications_status ON applications(status, created_at);
            CREATE INDEX idx_applications_submitted ON applications(submitted_at);

            CREATE TABLE earnings (
                id              TEXT PRIMARY KEY,
                writer_id       TEXT NOT NULL REFERENCES users(id),
                job_id          TEXT NOT NULL UNIQUE,
                payment_status  TEXT NOT NULL,
                earned_at       TEXT NOT NULL,
                revision        INTEGER NOT NULL DEFAULT 0,
                body            TEXT NOT NULL
            );

            CREATE INDEX idx_earnings_writer ON earnings(writer_id, earned_at);
            CREATE INDEX idx_earnings_status ON earnings(payment_status, earned_at);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                sender_id       TEXT NOT NULL REFERENCES users(id),
                recipient_id    TEXT NOT NULL REFERENCES users(id),
                parent_id       TEXT REFERENCES messages(id),
                is_read         INTEGER NOT NULL DEFAULT 0,
                is_deleted      INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                revision        INTEGER NOT NULL DEFAULT 0,
                body            TEXT NOT NULL
            );

            CREATE INDEX idx_messages_recipient ON messages(recipient_id, is_read, created_at);
            CREATE INDEX idx_messages_sender ON messages(sender_id, created_at);
            CREATE INDEX idx_messages_parent ON messages(parent_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
