use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CalendarRoutine, CalendarWindow, CreationDate, NewRoutine, RoutineSummary};

/// Server-side routine persistence as seen by the reconciler and the
/// calendar reconstructor.
///
/// The CLI implements this over HTTP with reqwest, the server directly over
/// the database for a single user.
#[async_trait]
pub trait RoutineGateway: Send + Sync {
    async fn list_routines(&self) -> Result<Vec<RoutineSummary>>;

    /// Routines with the statuses recorded inside `window`.
    async fn list_calendar_routines(&self, window: CalendarWindow) -> Result<Vec<CalendarRoutine>>;

    async fn list_routine_creation_dates(&self) -> Result<Vec<CreationDate>>;

    async fn create_routine(&self, routine: &NewRoutine) -> Result<RoutineSummary>;
}
