//! MySQL backend. Queries are runtime-checked so the crate builds without a
//! live database; see `sql/schema.sql` for the tables.

use std::collections::BTreeSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, Weekday};
use sqlx::MySqlPool;
use tracing::{debug, warn};

use super::{AttendanceStore, CardRegistry, EnrollmentLookup, IdentityResolver, TimetableLookup};
use crate::error::{AttendanceError, Result};
use crate::model::attendance::{AttendanceRecord, NewAttendanceRecord};
use crate::model::card::Card;
use crate::model::role::RoleTag;
use crate::model::session::{NewSession, Session};
use crate::model::timetable::{TimetableSlot, TimetableSlotRow, weekday_number};
use crate::model::user::{User, UserRow};
use crate::utils::card_cache::CardCache;

const RECORD_COLUMNS: &str = r#"
    id, student_id, session_id, course_id, group_id, date,
    check_in, check_out, status, card_id
"#;

const SESSION_COLUMNS: &str = r#"
    id, teacher_id, course_id, group_id, date, start_time, end_time, card_id
"#;

/// Email matching shared by tap resolution and login: trimmed by the caller,
/// compared case-insensitively.
pub fn user_by_email_sql(columns: &str) -> String {
    format!("SELECT {columns} FROM users WHERE LOWER(email) = LOWER(?)")
}

#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
    cards: CardCache,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool, cards: CardCache) -> Self {
        Self { pool, cards }
    }

    async fn lookup_card(&self, uid: &str) -> Result<Option<u64>> {
        if let Some(id) = self.cards.get(uid).await {
            return Ok(Some(id));
        }

        let id = sqlx::query_scalar::<_, u64>("SELECT id FROM cards WHERE uid = ?")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;

        // unknown UIDs are not cached: they may be registered later
        if let Some(id) = id {
            self.cards.insert(uid, id).await;
        }
        Ok(id)
    }
}

#[async_trait]
impl CardRegistry for MySqlStore {
    async fn card_exists(&self, uid: &str) -> Result<bool> {
        Ok(self.lookup_card(uid).await?.is_some())
    }

    async fn card_id(&self, uid: &str) -> Result<Option<u64>> {
        self.lookup_card(uid).await
    }

    async fn card_for_user(&self, user_id: u64) -> Result<Option<u64>> {
        let id = sqlx::query_scalar::<_, u64>(
            "SELECT id FROM cards WHERE user_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn register_card(&self, uid: &str, user_id: Option<u64>) -> Result<Card> {
        if self.lookup_card(uid).await?.is_some() {
            return Err(AttendanceError::conflict("card already registered"));
        }

        // a concurrent registration of the same UID surfaces as 23000 => Conflict
        let result = sqlx::query("INSERT INTO cards (uid, user_id) VALUES (?, ?)")
            .bind(uid)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        let id = result.last_insert_id();
        self.cards.insert(uid, id).await;

        Ok(Card {
            id,
            uid: uid.to_string(),
            user_id,
        })
    }
}

#[async_trait]
impl IdentityResolver for MySqlStore {
    async fn find_user(&self, email: &str) -> Result<Option<User>> {
        let sql = user_by_email_sql("id, email");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let roles = self.roles_of(row.id).await?;
        Ok(Some(User {
            id: row.id,
            email: row.email,
            roles,
        }))
    }

    async fn roles_of(&self, user_id: u64) -> Result<BTreeSet<RoleTag>> {
        let names = sqlx::query_scalar::<_, String>("SELECT role FROM user_roles WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(names
            .iter()
            .filter_map(|name| match RoleTag::from_str(name) {
                Ok(role) => Some(role),
                Err(_) => {
                    debug!(user_id, role = %name, "Ignoring unrecognized role");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl TimetableLookup for MySqlStore {
    async fn slot_near(
        &self,
        teacher_id: u64,
        weekday: Weekday,
        time: NaiveTime,
        tolerance: Duration,
    ) -> Result<Option<TimetableSlot>> {
        let row = sqlx::query_as::<_, TimetableSlotRow>(
            r#"
            SELECT teacher_id, weekday, start_time, end_time, course_id, group_id
            FROM timetable_slots
            WHERE teacher_id = ?
              AND weekday = ?
              AND start_time BETWEEN SUBTIME(?, SEC_TO_TIME(?))
                                 AND ADDTIME(?, SEC_TO_TIME(?))
            ORDER BY ABS(TIME_TO_SEC(TIMEDIFF(start_time, ?)))
            LIMIT 1
            "#,
        )
        .bind(teacher_id)
        .bind(weekday_number(weekday))
        .bind(time)
        .bind(tolerance.num_seconds())
        .bind(time)
        .bind(tolerance.num_seconds())
        .bind(time)
        .fetch_optional(&self.pool)
        .await?;

        match row.map(TimetableSlot::try_from).transpose() {
            Ok(slot) => Ok(slot),
            Err(bad) => {
                warn!(teacher_id, weekday = bad, "Timetable slot with invalid weekday");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl EnrollmentLookup for MySqlStore {
    async fn students_of(&self, course_id: u64, group_id: u64) -> Result<Vec<u64>> {
        let ids = sqlx::query_scalar::<_, u64>(
            "SELECT user_id FROM enrollments WHERE course_id = ? AND group_id = ?",
        )
        .bind(course_id)
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn student_records(&self, student_id: u64, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records \
             WHERE student_id = ? AND date = ? ORDER BY id DESC"
        );
        let records = sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(student_id)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn class_records(
        &self,
        date: NaiveDate,
        course_id: u64,
        group_id: u64,
    ) -> Result<Vec<AttendanceRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records \
             WHERE date = ? AND course_id = ? AND group_id = ? ORDER BY id"
        );
        let records = sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(date)
            .bind(course_id)
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn insert_record(&self, record: NewAttendanceRecord) -> Result<AttendanceRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_records
            (student_id, session_id, course_id, group_id, date, check_in, status, card_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.student_id)
        .bind(record.session_id)
        .bind(record.course_id)
        .bind(record.group_id)
        .bind(record.date)
        .bind(record.check_in)
        .bind(record.status.id())
        .bind(record.card_id)
        .execute(&self.pool)
        .await?;

        Ok(record.into_record(result.last_insert_id()))
    }

    async fn update_record(&self, record: &AttendanceRecord) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE attendance_records
            SET session_id = ?, course_id = ?, group_id = ?,
                check_in = ?, check_out = ?, status = ?, card_id = ?
            WHERE id = ?
            "#,
        )
        .bind(record.session_id)
        .bind(record.course_id)
        .bind(record.group_id)
        .bind(record.check_in)
        .bind(record.check_out)
        .bind(record.status.id())
        .bind(record.card_id)
        .bind(record.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_open_session(&self, teacher_id: u64) -> Result<Option<Session>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE teacher_id = ? AND end_time IS NULL ORDER BY id DESC LIMIT 1"
        );
        let session = sqlx::query_as::<_, Session>(&sql)
            .bind(teacher_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn session(&self, session_id: u64) -> Result<Option<Session>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?");
        let session = sqlx::query_as::<_, Session>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn insert_session(&self, session: NewSession) -> Result<Session> {
        let result = sqlx::query(
            r#"
            INSERT INTO sessions
            (teacher_id, course_id, group_id, date, start_time, card_id)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.teacher_id)
        .bind(session.course_id)
        .bind(session.group_id)
        .bind(session.date)
        .bind(session.start_time)
        .bind(session.card_id)
        .execute(&self.pool)
        .await?;

        Ok(session.into_session(result.last_insert_id()))
    }

    async fn close_session(&self, session_id: u64, end_time: NaiveTime) -> Result<()> {
        let result = sqlx::query("UPDATE sessions SET end_time = ? WHERE id = ? AND end_time IS NULL")
            .bind(end_time)
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AttendanceError::not_found("open session"));
        }
        Ok(())
    }
}
