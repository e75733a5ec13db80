use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::db::Database;
use crate::gateway::RoutineGateway;
use crate::models::{
    CalendarRoutine, CalendarWindow, CreationDate, NewRoutine, RoutineSummary, normalize_url,
    validate_title,
};

/// The UTC calendar day right now. Read once per request or pass and
/// threaded through from there.
#[must_use]
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Direct database access to one user's routines.
///
/// The server uses this wherever core logic needs a gateway without going
/// back out over HTTP, e.g. importing local routines at signup.
pub struct UserRoutines {
    db: Arc<Mutex<Database>>,
    user_id: String,
    today: NaiveDate,
}

impl UserRoutines {
    #[must_use]
    pub fn new(db: Arc<Mutex<Database>>, user_id: &str, today: NaiveDate) -> Self {
        Self {
            db,
            user_id: user_id.to_string(),
            today,
        }
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl RoutineGateway for UserRoutines {
    async fn list_routines(&self) -> Result<Vec<RoutineSummary>> {
        self.db().list_routines(&self.user_id, self.today)
    }

    async fn list_calendar_routines(&self, window: CalendarWindow) -> Result<Vec<CalendarRoutine>> {
        self.db().list_calendar_routines(&self.user_id, window)
    }

    async fn list_routine_creation_dates(&self) -> Result<Vec<CreationDate>> {
        self.db().list_creation_dates(&self.user_id)
    }

    /// Titles go through the same validation as the HTTP create path, so
    /// blank labels fail and padded ones are stored trimmed.
    async fn create_routine(&self, routine: &NewRoutine) -> Result<RoutineSummary> {
        let routine = NewRoutine {
            title: validate_title(&routine.title)?,
            url: normalize_url(routine.url.as_deref()),
            completed: routine.completed,
        };
        self.db().insert_routine(&self.user_id, &routine, self.today)
    }
}
