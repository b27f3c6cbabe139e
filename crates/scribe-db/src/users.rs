use anyhow::Result;
use rusqlite::{Connection, params};
use uuid::Uuid;

use scribe_types::user::{AccountStatus, Role, User};

use crate::Database;
use crate::codec::{encode, finish_update, load_all, load_one, stage, ts, unique_conflict};

const SELECT: &str = "SELECT body, revision FROM users";

pub fn insert(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, email, role, status, reset_digest, created_at, revision, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            user.id.to_string(),
            user.email,
            user.role.as_str(),
            user.status.as_str(),
            user.reset_digest(),
            ts(&user.created_at),
            user.revision,
            encode(user)?,
        ],
    )
    .map_err(|e| unique_conflict(e, "a user with this email already exists"))?;
    Ok(())
}

pub fn update(conn: &Connection, user: &mut User) -> Result<()> {
    let body = stage(user)?;
    let id = user.id.to_string();
    let changed = conn
        .execute(
            "UPDATE users
             SET email = ?1, role = ?2, status = ?3, reset_digest = ?4, body = ?5,
                 revision = revision + 1
             WHERE id = ?6 AND revision = ?7",
            params![
                user.email,
                user.role.as_str(),
                user.status.as_str(),
                user.reset_digest(),
                body,
                id,
                user.revision,
            ],
        )
        .map_err(|e| unique_conflict(e, "a user with this email already exists"))?;
    finish_update(conn, "users", &id, changed, "user", user)
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    load_one(conn, &format!("{} WHERE id = ?1", SELECT), [id.to_string()])
}

pub fn get_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    load_one(conn, &format!("{} WHERE email = ?1", SELECT), [email])
}

pub fn get_by_reset_digest(conn: &Connection, digest: &str) -> Result<Option<User>> {
    load_one(conn, &format!("{} WHERE reset_digest = ?1", SELECT), [digest])
}

/// Users filtered by role and/or status, newest first.
pub fn list(
    conn: &Connection,
    role: Option<Role>,
    status: Option<AccountStatus>,
) -> Result<Vec<User>> {
    load_all(
        conn,
        &format!(
            "{} WHERE (?1 IS NULL OR role = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC",
            SELECT
        ),
        params![role.map(|r| r.as_str()), status.map(|s| s.as_str())],
    )
}

impl Database {
    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.with_conn(|conn| insert(conn, user))
    }

    pub fn update_user(&self, user: &mut User) -> Result<()> {
        self.with_conn(|conn| update(conn, user))
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| get(conn, id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.with_conn(|conn| get_by_email(conn, email))
    }

    pub fn get_user_by_reset_digest(&self, digest: &str) -> Result<Option<User>> {
        self.with_conn(|conn| get_by_reset_digest(conn, digest))
    }

    pub fn list_users(
        &self,
        role: Option<Role>,
        status: Option<AccountStatus>,
    ) -> Result<Vec<User>> {
        self.with_conn(|conn| list(conn, role, status))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::Utc;
    use scribe_types::user::NewWriter;

    use super::*;
    use crate::StoreError;

    pub(crate) fn writer(email: &str) -> User {
        User::new_writer(
            NewWriter {
                first_name: "Grace".into(),
                last_name: "Hopper".into(),
                email: email.into(),
                phone: "555-0100".into(),
                country: "US".into(),
            },
            "argon-hash".into(),
        )
        .unwrap()
    }

    #[test]
    fn insert_and_fetch() {
        let db = Database::open_in_memory().unwrap();
        let user = writer("grace@navy.mil");
        db.insert_user(&user).unwrap();

        let by_id = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(by_id.email, "grace@navy.mil");
        assert_eq!(by_id.password_hash, "argon-hash");
        assert_eq!(by_id.revision, 0);

        assert!(db.get_user_by_email("grace@navy.mil").unwrap().is_some());
        assert!(db.get_user_by_email("nobody@navy.mil").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&writer("dup@example.com")).unwrap();
        let err = db.insert_user(&writer("dup@example.com")).unwrap_err();
        assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::Conflict(_))));
    }

    #[test]
    fn stale_update_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let user = writer("stale@example.com");
        db.insert_user(&user).unwrap();

        let mut first = db.get_user(user.id).unwrap().unwrap();
        let mut second = db.get_user(user.id).unwrap().unwrap();

        first.set_status(AccountStatus::Approved);
        db.update_user(&mut first).unwrap();
        assert_eq!(first.revision, 1);

        second.set_status(AccountStatus::Suspended);
        let err = db.update_user(&mut second).unwrap_err();
        assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::Conflict(_))));

        let stored = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(stored.status, AccountStatus::Approved);
    }

    #[test]
    fn updating_missing_user_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let mut ghost = writer("ghost@example.com");
        let err = db.update_user(&mut ghost).unwrap_err();
        assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::NotFound("user"))));
    }

    #[test]
    fn lookup_by_reset_digest() {
        let db = Database::open_in_memory().unwrap();
        let mut user = writer("reset@example.com");
        db.insert_user(&user).unwrap();

        let token = user.issue_password_reset(Utc::now());
        db.update_user(&mut user).unwrap();

        let digest = scribe_types::user::token_digest(&token);
        let found = db.get_user_by_reset_digest(&digest).unwrap().unwrap();
        assert_eq!(found.id, user.id);
    }

    #[test]
    fn list_filters_by_role_and_status() {
        let db = Database::open_in_memory().unwrap();
        let mut approved = writer("a@example.com");
        approved.set_status(AccountStatus::Approved);
        db.insert_user(&approved).unwrap();
        db.insert_user(&writer("b@example.com")).unwrap();

        assert_eq!(db.list_users(Some(Role::Writer), None).unwrap().len(), 2);
        let only = db.list_users(None, Some(AccountStatus::Approved)).unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].email, "a@example.com");
        assert!(db.list_users(Some(Role::Admin), None).unwrap().is_empty());
    }
}
