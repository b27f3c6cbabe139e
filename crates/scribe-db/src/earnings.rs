use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use scribe_types::earning::{Earning, PaymentStatus};

use crate::Database;
use crate::codec::{encode, finish_update, load_all, load_one, stage, ts, unique_conflict};

const SELECT: &str = "SELECT body, revision FROM earnings";

pub fn insert(conn: &Connection, earning: &Earning) -> Result<()> {
    conn.execute(
        "INSERT INTO earnings (id, writer_id, job_id, payment_status, earned_at, revision, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            earning.id.to_string(),
            earning.writer_id.to_string(),
            earning.job_id.to_string(),
            earning.payment_status.as_str(),
            ts(&earning.earned_at),
            earning.revision,
            encode(earning)?,
        ],
    )
    .map_err(|e| unique_conflict(e, "an earning for this job already exists"))?;
    Ok(())
}

pub fn update(conn: &Connection, earning: &mut Earning) -> Result<()> {
    let body = stage(earning)?;
    let id = earning.id.to_string();
    let changed = conn.execute(
        "UPDATE earnings
         SET payment_status = ?1, body = ?2, revision = revision + 1
         WHERE id = ?3 AND revision = ?4",
        params![earning.payment_status.as_str(), body, id, earning.revision],
    )?;
    finish_update(conn, "earnings", &id, changed, "earning", earning)
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<Earning>> {
    load_one(conn, &format!("{} WHERE id = ?1", SELECT), [id.to_string()])
}

pub fn get_by_job(conn: &Connection, job_id: Uuid) -> Result<Option<Earning>> {
    load_one(conn, &format!("{} WHERE job_id = ?1", SELECT), [job_id.to_string()])
}

/// A writer's earnings, newest first, optionally bounded by `earned_at`.
/// Both bounds are inclusive.
pub fn for_writer(
    conn: &Connection,
    writer_id: Uuid,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<Vec<Earning>> {
    load_all(
        conn,
        &format!(
            "{} WHERE writer_id = ?1
               AND (?2 IS NULL OR earned_at >= ?2)
               AND (?3 IS NULL OR earned_at <= ?3)
             ORDER BY earned_at DESC",
            SELECT
        ),
        params![writer_id.to_string(), from.as_ref().map(ts), to.as_ref().map(ts)],
    )
}

/// Earnings still waiting on a payout, oldest first.
pub fn pending_payments(conn: &Connection) -> Result<Vec<Earning>> {
    load_all(
        conn,
        &format!("{} WHERE payment_status = ?1 ORDER BY earned_at ASC", SELECT),
        [PaymentStatus::Pending.as_str()],
    )
}

impl Database {
    pub fn insert_earning(&self, earning: &Earning) -> Result<()> {
        self.with_conn(|conn| insert(conn, earning))
    }

    pub fn update_earning(&self, earning: &mut Earning) -> Result<()> {
        self.with_conn(|conn| update(conn, earning))
    }

    pub fn get_earning(&self, id: Uuid) -> Result<Option<Earning>> {
        self.with_conn(|conn| get(conn, id))
    }

    pub fn get_earning_by_job(&self, job_id: Uuid) -> Result<Option<Earning>> {
        self.with_conn(|conn| get_by_job(conn, job_id))
    }

    pub fn earnings_for_writer(
        &self,
        writer_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Earning>> {
        self.with_conn(|conn| for_writer(conn, writer_id, from, to))
    }

    pub fn pending_payments(&self) -> Result<Vec<Earning>> {
        self.with_conn(pending_payments)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use scribe_types::earning::{Currency, PaymentMethod};

    use super::*;
    use crate::StoreError;
    use crate::users::tests::writer;

    fn setup(db: &Database) -> Uuid {
        let user = writer("earner@example.com");
        db.insert_user(&user).unwrap();
        user.id
    }

    fn earning_at(writer_id: Uuid, amount: f64, earned_at: DateTime<Utc>) -> Earning {
        let mut e = Earning::new(writer_id, Uuid::new_v4(), amount, Currency::Usd).unwrap();
        e.earned_at = earned_at;
        e
    }

    #[test]
    fn one_earning_per_job() {
        let db = Database::open_in_memory().unwrap();
        let writer_id = setup(&db);
        let first = Earning::new(writer_id, Uuid::new_v4(), 80.0, Currency::Usd).unwrap();
        db.insert_earning(&first).unwrap();

        let again = Earning::new(writer_id, first.job_id, 90.0, Currency::Usd).unwrap();
        let err = db.insert_earning(&again).unwrap_err();
        assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::Conflict(_))));
        assert_eq!(db.get_earning_by_job(first.job_id).unwrap().unwrap().id, first.id);
    }

    #[test]
    fn payment_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let writer_id = setup(&db);
        let mut e = Earning::new(writer_id, Uuid::new_v4(), 80.0, Currency::Eur).unwrap();
        db.insert_earning(&e).unwrap();

        e.add_bonus(20.0, "fast".into(), Uuid::new_v4()).unwrap();
        e.mark_as_paid(PaymentMethod::Stripe, "ch_1".into(), 2.5).unwrap();
        db.update_earning(&mut e).unwrap();

        let stored = db.get_earning(e.id).unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert_eq!(stored.currency, Currency::Eur);
        assert_eq!(stored.final_amount(), 100.0);
        assert_eq!(stored.payment_details.net_amount, Some(97.5));
        assert!(db.pending_payments().unwrap().is_empty());
    }

    #[test]
    fn writer_range_is_inclusive_and_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let writer_id = setup(&db);
        let now = Utc::now();
        let old = earning_at(writer_id, 10.0, now - Duration::days(40));
        let mid = earning_at(writer_id, 20.0, now - Duration::days(10));
        let new = earning_at(writer_id, 30.0, now);
        for e in [&old, &mid, &new] {
            db.insert_earning(e).unwrap();
        }

        let all: Vec<Uuid> = db
            .earnings_for_writer(writer_id, None, None)
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(all, vec![new.id, mid.id, old.id]);

        let bounded = db
            .earnings_for_writer(writer_id, Some(mid.earned_at), Some(mid.earned_at))
            .unwrap();
        assert_eq!(bounded.len(), 1);
        assert_eq!(bounded[0].id, mid.id);

        assert!(db.earnings_for_writer(Uuid::new_v4(), None, None).unwrap().is_empty());
    }

    #[test]
    fn pending_payments_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        let writer_id = setup(&db);
        let now = Utc::now();
        let newer = earning_at(writer_id, 10.0, now);
        let older = earning_at(writer_id, 10.0, now - Duration::days(2));
        let mut processing = earning_at(writer_id, 10.0, now - Duration::days(5));
        processing.mark_processing().unwrap();
        for e in [&newer, &older, &processing] {
            db.insert_earning(e).unwrap();
        }

        let ids: Vec<Uuid> = db.pending_payments().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![older.id, newer.id]);
    }
}
