use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::models::{
    CalendarRoutine, CalendarWindow, CreationDate, DAY_FORMAT, NewRoutine, RoutineStatus,
    RoutineSummary, Session, UpdateRoutine, User, now_timestamp, timestamp,
};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    email TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    password_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS routines (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    url TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS routine_statuses (
                    id TEXT PRIMARY KEY,
                    routine_id TEXT NOT NULL REFERENCES routines(id) ON DELETE CASCADE,
                    date TEXT NOT NULL,
                    completed INTEGER NOT NULL DEFAULT 0,
                    UNIQUE (routine_id, date)
                );

                CREATE INDEX IF NOT EXISTS idx_routines_user ON routines(user_id);
                CREATE INDEX IF NOT EXISTS idx_routine_statuses_date ON routine_statuses(date);

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS sessions (
                    token TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL,
                    expires_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

                PRAGMA user_version = 2;",
            )?;
        }

        if version < 3 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS user_settings (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                );

                PRAGMA user_version = 3;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn day_from_column(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
        NaiveDate::parse_from_str(raw, DAY_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    }

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    // Expects columns:
    // 0: r.id, 1: r.title, 2: r.url, 3: completed (nullable), 4: r.created_at, 5: r.updated_at
    fn summary_from_row(row: &rusqlite::Row) -> rusqlite::Result<RoutineSummary> {
        Ok(RoutineSummary {
            id: row.get(0)?,
            title: row.get(1)?,
            url: row.get(2)?,
            completed: row.get::<_, Option<bool>>(3)?.unwrap_or(false),
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    // Expects columns: 0: id, 1: routine_id, 2: date, 3: completed
    fn status_from_row(row: &rusqlite::Row) -> rusqlite::Result<RoutineStatus> {
        let date: String = row.get(2)?;
        Ok(RoutineStatus {
            id: row.get(0)?,
            routine_id: row.get(1)?,
            date: Self::day_from_column(2, &date)?,
            completed: row.get(3)?,
        })
    }

    // --- Users ---

    pub fn create_user(&self, email: &str, name: &str, password_hash: &str) -> Result<User> {
        if self.get_user_by_email(email)?.is_some() {
            bail!("Email already exists");
        }
        let now = now_timestamp();
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO users (id, email, name, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, email, name, password_hash, now, now],
        )?;
        self.get_user(&id)
    }

    pub fn get_user(&self, id: &str) -> Result<User> {
        self.conn
            .query_row(
                "SELECT id, email, name, created_at FROM users WHERE id = ?1",
                params![id],
                Self::user_from_row,
            )
            .context("User not found")
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, email, name, created_at FROM users WHERE email = ?1",
                params![email],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// The user and their stored password hash, for credential checks.
    pub fn get_credentials(&self, email: &str) -> Result<Option<(User, String)>> {
        let found = self
            .conn
            .query_row(
                "SELECT id, email, name, created_at, password_hash FROM users WHERE email = ?1",
                params![email],
                |row| Ok((Self::user_from_row(row)?, row.get(4)?)),
            )
            .optional()?;
        Ok(found)
    }

    pub fn get_password_hash(&self, user_id: &str) -> Result<String> {
        self.conn
            .query_row(
                "SELECT password_hash FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .context("User not found")
    }

    pub fn update_password(&self, user_id: &str, password_hash: &str) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
            params![password_hash, now_timestamp(), user_id],
        )?;
        if rows == 0 {
            bail!("User not found");
        }
        Ok(())
    }

    // --- Sessions ---

    pub fn create_session(
        &self,
        user_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        let session = Session {
            token: token.to_string(),
            user_id: user_id.to_string(),
            created_at: now_timestamp(),
            expires_at: timestamp(expires_at),
        };
        self.conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                session.token,
                session.user_id,
                session.created_at,
                session.expires_at
            ],
        )?;
        Ok(session)
    }

    /// Resolve a bearer token to its user. Expired sessions resolve to `None`.
    pub fn get_session_user(&self, token: &str, now: DateTime<Utc>) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT u.id, u.email, u.name, u.created_at
                 FROM sessions s
                 JOIN users u ON s.user_id = u.id
                 WHERE s.token = ?1 AND s.expires_at > ?2",
                params![token, timestamp(now)],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(rows > 0)
    }

    /// Drop every session of a user, optionally keeping one.
    pub fn delete_user_sessions(&self, user_id: &str, keep_token: Option<&str>) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM sessions WHERE user_id = ?1 AND token IS NOT ?2",
            params![user_id, keep_token],
        )?;
        Ok(rows)
    }

    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![timestamp(now)],
        )?;
        Ok(rows)
    }

    // --- Routines ---

    /// Create a routine together with its status for `today`.
    pub fn insert_routine(
        &self,
        user_id: &str,
        routine: &NewRoutine,
        today: NaiveDate,
    ) -> Result<RoutineSummary> {
        let now = now_timestamp();
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO routines (id, user_id, title, url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, user_id, routine.title, routine.url, now, now],
        )?;
        self.set_status(&id, today, routine.completed)?;
        self.get_routine_summary(&id, today)
    }

    pub fn get_routine_summary(&self, id: &str, today: NaiveDate) -> Result<RoutineSummary> {
        self.conn
            .query_row(
                "SELECT r.id, r.title, r.url, s.completed, r.created_at, r.updated_at
                 FROM routines r
                 LEFT JOIN routine_statuses s ON s.routine_id = r.id AND s.date = ?2
                 WHERE r.id = ?1",
                params![id, today.format(DAY_FORMAT).to_string()],
                Self::summary_from_row,
            )
            .context("Routine not found")
    }

    /// Owner of a routine, or `None` when the routine does not exist.
    pub fn get_routine_owner(&self, id: &str) -> Result<Option<String>> {
        let owner = self
            .conn
            .query_row(
                "SELECT user_id FROM routines WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    pub fn list_routines(&self, user_id: &str, today: NaiveDate) -> Result<Vec<RoutineSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.title, r.url, s.completed, r.created_at, r.updated_at
             FROM routines r
             LEFT JOIN routine_statuses s ON s.routine_id = r.id AND s.date = ?2
             WHERE r.user_id = ?1
             ORDER BY r.created_at, r.id",
        )?;
        let routines = stmt
            .query_map(
                params![user_id, today.format(DAY_FORMAT).to_string()],
                Self::summary_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(routines)
    }

    pub fn update_routine(
        &self,
        id: &str,
        update: &UpdateRoutine,
        today: NaiveDate,
    ) -> Result<RoutineSummary> {
        let rows = self.conn.execute(
            "UPDATE routines SET title = ?1, url = ?2, updated_at = ?3 WHERE id = ?4",
            params![update.title, update.url, now_timestamp(), id],
        )?;
        if rows == 0 {
            bail!("Routine not found");
        }
        self.get_routine_summary(id, today)
    }

    /// Delete a routine and all of its statuses.
    pub fn delete_routine(&self, id: &str) -> Result<bool> {
        self.conn.execute(
            "DELETE FROM routine_statuses WHERE routine_id = ?1",
            params![id],
        )?;
        let rows = self
            .conn
            .execute("DELETE FROM routines WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // --- Statuses ---

    /// Record completion for one day, replacing any earlier record for that day.
    pub fn set_status(&self, routine_id: &str, day: NaiveDate, completed: bool) -> Result<RoutineStatus> {
        let date = day.format(DAY_FORMAT).to_string();
        self.conn.execute(
            "INSERT INTO routine_statuses (id, routine_id, date, completed)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(routine_id, date) DO UPDATE SET completed = excluded.completed",
            params![Uuid::new_v4().to_string(), routine_id, date, completed],
        )?;
        self.conn.execute(
            "UPDATE routines SET updated_at = ?1 WHERE id = ?2",
            params![now_timestamp(), routine_id],
        )?;
        self.get_status(routine_id, day)?
            .context("Routine status not found after upsert")
    }

    pub fn get_status(&self, routine_id: &str, day: NaiveDate) -> Result<Option<RoutineStatus>> {
        let status = self
            .conn
            .query_row(
                "SELECT id, routine_id, date, completed FROM routine_statuses
                 WHERE routine_id = ?1 AND date = ?2",
                params![routine_id, day.format(DAY_FORMAT).to_string()],
                Self::status_from_row,
            )
            .optional()?;
        Ok(status)
    }

    // --- Calendar queries ---

    /// Every routine of a user with the statuses recorded inside `window`,
    /// statuses ascending by day. Routines without statuses in the window are
    /// included with an empty list.
    pub fn list_calendar_routines(
        &self,
        user_id: &str,
        window: CalendarWindow,
    ) -> Result<Vec<CalendarRoutine>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title FROM routines WHERE user_id = ?1 ORDER BY created_at, id",
        )?;
        let mut routines = stmt
            .query_map(params![user_id], |row| {
                Ok(CalendarRoutine {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    statuses: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut status_stmt = self.conn.prepare(
            "SELECT id, routine_id, date, completed FROM routine_statuses
             WHERE routine_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date",
        )?;
        let start = window.start.format(DAY_FORMAT).to_string();
        let end = window.end.format(DAY_FORMAT).to_string();
        for routine in &mut routines {
            routine.statuses = status_stmt
                .query_map(params![routine.id, start, end], Self::status_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
        }
        Ok(routines)
    }

    pub fn list_creation_dates(&self, user_id: &str) -> Result<Vec<CreationDate>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, created_at FROM routines WHERE user_id = ?1 ORDER BY created_at")?;
        let dates = stmt
            .query_map(params![user_id], |row| {
                Ok(CreationDate {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(dates)
    }

    // --- Device settings ---

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO user_settings (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now_timestamp()],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM user_settings WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM user_settings WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn db_with_user() -> (Database, User) {
        let db = Database::open_in_memory().unwrap();
        let user = db
            .create_user("ann@example.com", "Ann", "pbkdf2-sha256$1$00$00")
            .unwrap();
        (db, user)
    }

    fn new_routine(title: &str) -> NewRoutine {
        NewRoutine {
            title: title.to_string(),
            url: None,
            completed: false,
        }
    }

    #[test]
    fn test_create_user_rejects_duplicate_email() {
        let (db, _) = db_with_user();
        let err = db
            .create_user("ann@example.com", "Other", "hash")
            .unwrap_err();
        assert_eq!(err.to_string(), "Email already exists");
    }

    #[test]
    fn test_get_credentials() {
        let (db, user) = db_with_user();
        let (found, hash) = db.get_credentials("ann@example.com").unwrap().unwrap();
        assert_eq!(found, user);
        assert_eq!(hash, "pbkdf2-sha256$1$00$00");
        assert!(db.get_credentials("bob@example.com").unwrap().is_none());
    }

    #[test]
    fn test_update_password() {
        let (db, user) = db_with_user();
        db.update_password(&user.id, "new-hash").unwrap();
        assert_eq!(db.get_password_hash(&user.id).unwrap(), "new-hash");
        assert!(db.update_password("missing", "x").is_err());
    }

    #[test]
    fn test_session_lookup_and_expiry() {
        let (db, user) = db_with_user();
        let now = Utc::now();
        db.create_session(&user.id, "tok-1", now + Duration::days(1))
            .unwrap();
        db.create_session(&user.id, "tok-old", now - Duration::days(1))
            .unwrap();

        assert_eq!(db.get_session_user("tok-1", now).unwrap(), Some(user));
        assert!(db.get_session_user("tok-old", now).unwrap().is_none());
        assert!(db.get_session_user("nope", now).unwrap().is_none());

        assert_eq!(db.purge_expired_sessions(now).unwrap(), 1);
        assert!(db.delete_session("tok-1").unwrap());
        assert!(!db.delete_session("tok-1").unwrap());
    }

    #[test]
    fn test_delete_user_sessions_keeps_current() {
        let (db, user) = db_with_user();
        let expires = Utc::now() + Duration::days(1);
        db.create_session(&user.id, "a", expires).unwrap();
        db.create_session(&user.id, "b", expires).unwrap();
        db.create_session(&user.id, "c", expires).unwrap();

        assert_eq!(db.delete_user_sessions(&user.id, Some("b")).unwrap(), 2);
        assert!(db.get_session_user("b", Utc::now()).unwrap().is_some());
    }

    #[test]
    fn test_insert_routine_creates_today_status() {
        let (db, user) = db_with_user();
        let today = day(2024, 5, 10);
        let routine = db
            .insert_routine(
                &user.id,
                &NewRoutine {
                    title: "Read".to_string(),
                    url: Some("https://example.com".to_string()),
                    completed: true,
                },
                today,
            )
            .unwrap();

        assert_eq!(routine.title, "Read");
        assert_eq!(routine.url.as_deref(), Some("https://example.com"));
        assert!(routine.completed);
        assert!(Uuid::parse_str(&routine.id).is_ok());

        let status = db.get_status(&routine.id, today).unwrap().unwrap();
        assert!(status.completed);
        assert_eq!(status.date, today);
    }

    #[test]
    fn test_list_routines_reflects_today_only() {
        let (db, user) = db_with_user();
        let yesterday = day(2024, 5, 9);
        let today = day(2024, 5, 10);
        let routine = db
            .insert_routine(&user.id, &new_routine("Walk"), yesterday)
            .unwrap();
        db.set_status(&routine.id, yesterday, true).unwrap();

        let listed = db.list_routines(&user.id, today).unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].completed);

        db.set_status(&routine.id, today, true).unwrap();
        let listed = db.list_routines(&user.id, today).unwrap();
        assert!(listed[0].completed);
    }

    #[test]
    fn test_list_routines_scoped_to_user() {
        let (db, user) = db_with_user();
        let other = db.create_user("bob@example.com", "Bob", "h").unwrap();
        let today = day(2024, 5, 10);
        db.insert_routine(&user.id, &new_routine("Mine"), today)
            .unwrap();
        db.insert_routine(&other.id, &new_routine("Theirs"), today)
            .unwrap();

        let mine = db.list_routines(&user.id, today).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "Mine");
    }

    #[test]
    fn test_set_status_upserts_single_row_per_day() {
        let (db, user) = db_with_user();
        let today = day(2024, 5, 10);
        let routine = db
            .insert_routine(&user.id, &new_routine("Walk"), today)
            .unwrap();

        let first = db.get_status(&routine.id, today).unwrap().unwrap();
        let updated = db.set_status(&routine.id, today, true).unwrap();
        assert_eq!(first.id, updated.id);
        assert!(updated.completed);

        let window = CalendarWindow::new(today, today);
        let calendar = db.list_calendar_routines(&user.id, window).unwrap();
        assert_eq!(calendar[0].statuses.len(), 1);
    }

    #[test]
    fn test_update_routine() {
        let (db, user) = db_with_user();
        let today = day(2024, 5, 10);
        let routine = db
            .insert_routine(&user.id, &new_routine("Walk"), today)
            .unwrap();
        let updated = db
            .update_routine(
                &routine.id,
                &UpdateRoutine {
                    title: "Long walk".to_string(),
                    url: None,
                },
                today,
            )
            .unwrap();
        assert_eq!(updated.title, "Long walk");
        assert!(
            db.update_routine(
                "missing",
                &UpdateRoutine {
                    title: "x".to_string(),
                    url: None
                },
                today
            )
            .is_err()
        );
    }

    #[test]
    fn test_delete_routine_removes_statuses() {
        let (db, user) = db_with_user();
        let today = day(2024, 5, 10);
        let routine = db
            .insert_routine(&user.id, &new_routine("Walk"), today)
            .unwrap();

        assert!(db.delete_routine(&routine.id).unwrap());
        assert!(db.get_status(&routine.id, today).unwrap().is_none());
        assert!(db.get_routine_owner(&routine.id).unwrap().is_none());
        assert!(!db.delete_routine(&routine.id).unwrap());
    }

    #[test]
    fn test_get_routine_owner() {
        let (db, user) = db_with_user();
        let routine = db
            .insert_routine(&user.id, &new_routine("Walk"), day(2024, 5, 10))
            .unwrap();
        assert_eq!(
            db.get_routine_owner(&routine.id).unwrap().as_deref(),
            Some(user.id.as_str())
        );
    }

    #[test]
    fn test_list_calendar_routines_filters_window() {
        let (db, user) = db_with_user();
        let routine = db
            .insert_routine(&user.id, &new_routine("Walk"), day(2024, 1, 1))
            .unwrap();
        db.set_status(&routine.id, day(2024, 1, 5), true).unwrap();
        db.set_status(&routine.id, day(2024, 1, 3), false).unwrap();
        db.set_status(&routine.id, day(2024, 2, 1), true).unwrap();
        let empty = db
            .insert_routine(&user.id, &new_routine("Stretch"), day(2023, 12, 1))
            .unwrap();

        let window = CalendarWindow::new(day(2024, 1, 2), day(2024, 1, 31));
        let calendar = db.list_calendar_routines(&user.id, window).unwrap();
        assert_eq!(calendar.len(), 2);

        let walk = calendar.iter().find(|r| r.id == routine.id).unwrap();
        let dates: Vec<NaiveDate> = walk.statuses.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![day(2024, 1, 3), day(2024, 1, 5)]);

        let stretch = calendar.iter().find(|r| r.id == empty.id).unwrap();
        assert!(stretch.statuses.is_empty());
    }

    #[test]
    fn test_list_creation_dates() {
        let (db, user) = db_with_user();
        let routine = db
            .insert_routine(&user.id, &new_routine("Walk"), day(2024, 1, 1))
            .unwrap();
        let dates = db.list_creation_dates(&user.id).unwrap();
        assert_eq!(dates.len(), 1);
        assert_eq!(dates[0].id, routine.id);
        assert_eq!(dates[0].created_at, routine.created_at);
    }

    #[test]
    fn test_settings_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_setting("k").unwrap().is_none());
        db.set_setting("k", "v1").unwrap();
        db.set_setting("k", "v2").unwrap();
        assert_eq!(db.get_setting("k").unwrap().as_deref(), Some("v2"));
        assert!(db.delete_setting("k").unwrap());
        assert!(!db.delete_setting("k").unwrap());
    }

    #[test]
    fn test_migration_sets_user_version() {
        let db = Database::open_in_memory().unwrap();
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 3);
    }

    #[test]
    fn test_open_on_disk_reopens_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routinest.db");
        {
            let db = Database::open(&path).unwrap();
            db.create_user("ann@example.com", "Ann", "h").unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert!(db.get_user_by_email("ann@example.com").unwrap().is_some());
    }
}
