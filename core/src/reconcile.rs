use anyhow::Result;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::gateway::RoutineGateway;
use crate::local_store::LocalRoutineStore;
use crate::models::{LocalRoutine, NewRoutine, RoutineSummary};

/// Decides whether a local routine already exists on the server.
pub trait RoutineMatcher: Send + Sync {
    fn matches(&self, remote: &RoutineSummary, local: &LocalRoutine) -> bool;
}

/// Case-insensitive title equality, ignoring surrounding whitespace the same
/// way titles are trimmed when a routine is created.
#[derive(Debug, Default, Clone, Copy)]
pub struct TitleMatcher;

impl RoutineMatcher for TitleMatcher {
    fn matches(&self, remote: &RoutineSummary, local: &LocalRoutine) -> bool {
        remote.title.trim().to_lowercase() == local.text.trim().to_lowercase()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: usize,
    pub matched: usize,
    pub failed: usize,
}

impl ReconcileReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.matched + self.failed
    }
}

/// Merges device-local routines into the server list and empties local
/// storage afterwards.
pub struct Reconciler {
    gateway: Box<dyn RoutineGateway>,
    store: LocalRoutineStore,
    matcher: Box<dyn RoutineMatcher>,
    in_flight: Mutex<()>,
}

impl Reconciler {
    #[must_use]
    pub fn new(gateway: Box<dyn RoutineGateway>, store: LocalRoutineStore) -> Self {
        Self::with_matcher(gateway, store, Box::new(TitleMatcher))
    }

    #[must_use]
    pub fn with_matcher(
        gateway: Box<dyn RoutineGateway>,
        store: LocalRoutineStore,
        matcher: Box<dyn RoutineMatcher>,
    ) -> Self {
        Self {
            gateway,
            store,
            matcher,
            in_flight: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn store(&self) -> &LocalRoutineStore {
        &self.store
    }

    /// Run one pass. `snapshot` is the caller's current view of the server
    /// list; it is fetched when absent.
    ///
    /// Creation failures are logged and counted, never propagated. Local
    /// storage is cleared once the loop finishes, whatever the outcome of
    /// the individual creates.
    pub async fn reconcile(&self, snapshot: Option<Vec<RoutineSummary>>) -> Result<ReconcileReport> {
        let _pass = self.in_flight.lock().await;

        let local = self.store.read_routines()?;
        let mut report = ReconcileReport::default();
        if local.is_empty() {
            return Ok(report);
        }

        let mut remote = match snapshot {
            Some(routines) => routines,
            None => self.gateway.list_routines().await?,
        };

        for routine in &local {
            if remote.iter().any(|r| self.matcher.matches(r, routine)) {
                report.matched += 1;
                continue;
            }

            let new = NewRoutine {
                title: routine.text.clone(),
                url: None,
                completed: routine.completed,
            };
            match self.gateway.create_routine(&new).await {
                Ok(created) => {
                    tracing::debug!(id = %created.id, title = %created.title, "created routine from local copy");
                    report.created += 1;
                    remote.push(created);
                }
                Err(e) => {
                    tracing::warn!(title = %routine.text, error = %e, "failed to create routine from local copy");
                    report.failed += 1;
                }
            }
        }

        self.store.clear_routines()?;
        tracing::info!(
            created = report.created,
            matched = report.matched,
            failed = report.failed,
            "reconciled local routines"
        );
        Ok(report)
    }
}
