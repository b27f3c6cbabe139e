use anyhow::Result;
use rusqlite::{Connection, params};
use uuid::Uuid;

use scribe_types::message::Message;

use crate::Database;
use crate::codec::{encode, finish_update, load_all, load_one, stage, ts};

const SELECT: &str = "SELECT body, revision FROM messages";

pub fn insert(conn: &Connection, msg: &Message) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, sender_id, recipient_id, parent_id, is_read, is_deleted, created_at, revision, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            msg.id.to_string(),
            msg.sender_id.to_string(),
            msg.recipient_id.to_string(),
            msg.parent_id.map(|p| p.to_string()),
            msg.is_read,
            msg.is_deleted,
            ts(&msg.created_at),
            msg.revision,
            encode(msg)?,
        ],
    )?;
    Ok(())
}

pub fn update(conn: &Connection, msg: &mut Message) -> Result<()> {
    let body = stage(msg)?;
    let id = msg.id.to_string();
    let changed = conn.execute(
        "UPDATE messages
         SET is_read = ?1, is_deleted = ?2, body = ?3, revision = revision + 1
         WHERE id = ?4 AND revision = ?5",
        params![msg.is_read, msg.is_deleted, body, id, msg.revision],
    )?;
    finish_update(conn, "messages", &id, changed, "message", msg)
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<Message>> {
    load_one(conn, &format!("{} WHERE id = ?1", SELECT), [id.to_string()])
}

pub fn unread_count(conn: &Connection, user: Uuid) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE recipient_id = ?1 AND is_read = 0 AND is_deleted = 0",
        [user.to_string()],
        |r| r.get(0),
    )?;
    Ok(count as u64)
}

/// Messages exchanged between `a` and `b` in either direction, newest first.
pub fn conversation(conn: &Connection, a: Uuid, b: Uuid, limit: u32) -> Result<Vec<Message>> {
    load_all(
        conn,
        &format!(
            "{} WHERE is_deleted = 0
               AND ((sender_id = ?1 AND recipient_id = ?2) OR (sender_id = ?2 AND recipient_id = ?1))
             ORDER BY created_at DESC
             LIMIT ?3",
            SELECT
        ),
        params![a.to_string(), b.to_string(), limit],
    )
}

/// Messages received by `user`, newest first.
pub fn inbox(conn: &Connection, user: Uuid, limit: u32) -> Result<Vec<Message>> {
    load_all(
        conn,
        &format!(
            "{} WHERE recipient_id = ?1 AND is_deleted = 0 ORDER BY created_at DESC LIMIT ?2",
            SELECT
        ),
        params![user.to_string(), limit],
    )
}

/// Direct replies to `parent`, oldest first.
pub fn replies(conn: &Connection, parent: Uuid) -> Result<Vec<Message>> {
    load_all(
        conn,
        &format!("{} WHERE parent_id = ?1 AND is_deleted = 0 ORDER BY created_at ASC", SELECT),
        [parent.to_string()],
    )
}

impl Database {
    pub fn insert_message(&self, msg: &Message) -> Result<()> {
        self.with_conn(|conn| insert(conn, msg))
    }

    pub fn update_message(&self, msg: &mut Message) -> Result<()> {
        self.with_conn(|conn| update(conn, msg))
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| get(conn, id))
    }

    pub fn unread_count(&self, user: Uuid) -> Result<u64> {
        self.with_conn(|conn| unread_count(conn, user))
    }

    pub fn conversation(&self, a: Uuid, b: Uuid, limit: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| conversation(conn, a, b, limit))
    }

    pub fn inbox(&self, user: Uuid, limit: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| inbox(conn, user, limit))
    }

    pub fn replies(&self, parent: Uuid) -> Result<Vec<Message>> {
        self.with_conn(|conn| replies(conn, parent))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use scribe_types::message::Draft;

    use super::*;
    use crate::users::tests::writer;

    struct Pair {
        alice: Uuid,
        bob: Uuid,
    }

    fn setup(db: &Database) -> Pair {
        let alice = writer("alice@example.com");
        let bob = writer("bob@example.com");
        db.insert_user(&alice).unwrap();
        db.insert_user(&bob).unwrap();
        Pair {
            alice: alice.id,
            bob: bob.id,
        }
    }

    fn send(
        db: &Database,
        from: Uuid,
        to: Uuid,
        minutes_ago: i64,
        parent_id: Option<Uuid>,
    ) -> Message {
        let mut msg = Message::compose(
            from,
            Draft {
                recipient_id: to,
                subject: "hi".into(),
                content: "hello".into(),
                parent_id,
                ..Draft::default()
            },
        )
        .unwrap();
        msg.created_at = Utc::now() - Duration::minutes(minutes_ago);
        db.insert_message(&msg).unwrap();
        msg
    }

    #[test]
    fn unread_count_tracks_reads_and_deletes() {
        let db = Database::open_in_memory().unwrap();
        let p = setup(&db);
        let mut first = send(&db, p.alice, p.bob, 3, None);
        let mut second = send(&db, p.alice, p.bob, 2, None);
        send(&db, p.bob, p.alice, 1, None);
        assert_eq!(db.unread_count(p.bob).unwrap(), 2);

        first.mark_as_read();
        db.update_message(&mut first).unwrap();
        second.soft_delete();
        db.update_message(&mut second).unwrap();
        assert_eq!(db.unread_count(p.bob).unwrap(), 0);
        assert_eq!(db.unread_count(p.alice).unwrap(), 1);
    }

    #[test]
    fn conversation_is_symmetric_newest_first_and_limited() {
        let db = Database::open_in_memory().unwrap();
        let p = setup(&db);
        let oldest = send(&db, p.alice, p.bob, 30, None);
        let middle = send(&db, p.bob, p.alice, 20, None);
        let newest = send(&db, p.alice, p.bob, 10, None);
        let mut gone = send(&db, p.bob, p.alice, 5, None);
        gone.soft_delete();
        db.update_message(&mut gone).unwrap();

        let ids: Vec<Uuid> = db
            .conversation(p.bob, p.alice, 50)
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![newest.id, middle.id, oldest.id]);

        let limited = db.conversation(p.alice, p.bob, 2).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].id, newest.id);
    }

    #[test]
    fn inbox_only_has_received_messages() {
        let db = Database::open_in_memory().unwrap();
        let p = setup(&db);
        let received = send(&db, p.alice, p.bob, 2, None);
        send(&db, p.bob, p.alice, 1, None);

        let inbox = db.inbox(p.bob, 50).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, received.id);
    }

    #[test]
    fn replies_are_threaded_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        let p = setup(&db);
        let root = send(&db, p.alice, p.bob, 10, None);
        let later = send(&db, p.alice, p.bob, 1, Some(root.id));
        let earlier = send(&db, p.bob, p.alice, 5, Some(root.id));

        let ids: Vec<Uuid> = db.replies(root.id).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![earlier.id, later.id]);
    }

    #[test]
    fn reply_to_unknown_parent_fails() {
        let db = Database::open_in_memory().unwrap();
        let p = setup(&db);
        let msg = Message::compose(
            p.alice,
            Draft {
                recipient_id: p.bob,
                subject: "re".into(),
                content: "?".into(),
                parent_id: Some(Uuid::new_v4()),
                ..Draft::default()
            },
        )
        .unwrap();
        assert!(db.insert_message(&msg).is_err());
    }
}
