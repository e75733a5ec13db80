use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::gateway::RoutineGateway;
use crate::models::{
    CalendarEntry, CalendarRoutine, CalendarWindow, CreationDate, RoutineStatus, canonical_day,
    parse_day,
};

pub const COMPLETE_COLOR: &str = "#22c55e";
pub const INCOMPLETE_COLOR: &str = "#ef4444";
pub const COMPLETE_GLYPH: &str = "✓";
pub const INCOMPLETE_GLYPH: &str = "⨯";
pub const ENTRY_DISPLAY: &str = "block";

/// Every day from `start` through `end`, inclusive. Empty when `start > end`.
#[must_use]
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|day| *day <= end).collect()
}

/// One status per day for a single routine.
///
/// A routine with no statuses in the window gets a synthetic status for every
/// day from `window_start` through `today`. Otherwise the walk starts at the
/// routine's creation day, which must be known; real statuses are reused for
/// their exact day and every other day is synthesized as incomplete.
pub fn fill_routine(
    routine: &CalendarRoutine,
    window_start: NaiveDate,
    created: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<Vec<RoutineStatus>> {
    if routine.statuses.is_empty() {
        return Ok(date_range(window_start, today)
            .into_iter()
            .map(|day| RoutineStatus::synthetic(&routine.id, day))
            .collect());
    }

    let created =
        created.with_context(|| format!("Missing creation date for routine {}", routine.id))?;

    let mut recorded: HashMap<NaiveDate, &RoutineStatus> = HashMap::new();
    for status in &routine.statuses {
        recorded.entry(status.date).or_insert(status);
    }

    Ok(date_range(created, today)
        .into_iter()
        .map(|day| match recorded.get(&day) {
            Some(status) => RoutineStatus {
                routine_id: routine.id.clone(),
                ..(*status).clone()
            },
            None => RoutineStatus::synthetic(&routine.id, day),
        })
        .collect())
}

/// Fill every routine of a window. Fails as a whole when a routine with
/// statuses has no known creation date.
pub fn reconstruct(
    routines: Vec<CalendarRoutine>,
    creation_dates: &[CreationDate],
    window_start: NaiveDate,
    today: NaiveDate,
) -> Result<Vec<CalendarRoutine>> {
    let created = creation_dates
        .iter()
        .map(|c| {
            parse_day(&c.created_at)
                .with_context(|| format!("Bad creation date for routine {}", c.id))
                .map(|day| (c.id.as_str(), day))
        })
        .collect::<Result<HashMap<_, _>>>()?;

    routines
        .into_iter()
        .map(|routine| {
            let statuses = fill_routine(
                &routine,
                window_start,
                created.get(routine.id.as_str()).copied(),
                today,
            )?;
            Ok(CalendarRoutine { statuses, ..routine })
        })
        .collect()
}

#[must_use]
pub fn to_entry(title: &str, status: &RoutineStatus) -> CalendarEntry {
    let (color, glyph) = if status.completed {
        (COMPLETE_COLOR, COMPLETE_GLYPH)
    } else {
        (INCOMPLETE_COLOR, INCOMPLETE_GLYPH)
    };
    CalendarEntry {
        id: status.id.clone(),
        title: format!("{title} {glyph}"),
        date: canonical_day(status.date),
        background_color: color.to_string(),
        border_color: color.to_string(),
        display: ENTRY_DISPLAY.to_string(),
    }
}

/// Flatten routines into entries, routine by routine, each in day order.
#[must_use]
pub fn to_calendar_entries(routines: &[CalendarRoutine]) -> Vec<CalendarEntry> {
    routines
        .iter()
        .flat_map(|routine| {
            routine
                .statuses
                .iter()
                .map(|status| to_entry(&routine.title, status))
        })
        .collect()
}

/// Fetch a window through the gateway and turn it into calendar entries.
pub async fn load_calendar(
    gateway: &dyn RoutineGateway,
    window: CalendarWindow,
    today: NaiveDate,
) -> Result<Vec<CalendarEntry>> {
    let routines = gateway
        .list_calendar_routines(window)
        .await
        .context("Failed to fetch calendar routines")?;
    let creation_dates = gateway
        .list_routine_creation_dates()
        .await
        .context("Failed to fetch routine creation dates")?;

    let filled = reconstruct(routines, &creation_dates, window.start, today)?;
    Ok(to_calendar_entries(&filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn status(id: &str, date: NaiveDate, completed: bool) -> RoutineStatus {
        RoutineStatus {
            id: id.to_string(),
            routine_id: "r1".to_string(),
            date,
            completed,
        }
    }

    fn routine(statuses: Vec<RoutineStatus>) -> CalendarRoutine {
        CalendarRoutine {
            id: "r1".to_string(),
            title: "Walk".to_string(),
            statuses,
        }
    }

    #[test]
    fn test_date_range() {
        assert_eq!(date_range(day(2024, 2, 28), day(2024, 3, 1)).len(), 3);
        assert_eq!(date_range(day(2024, 1, 1), day(2024, 1, 1)), vec![day(2024, 1, 1)]);
        assert!(date_range(day(2024, 1, 2), day(2024, 1, 1)).is_empty());
    }

    #[test]
    fn test_empty_routine_fills_from_window_start() {
        let filled = fill_routine(&routine(vec![]), day(2024, 1, 1), None, day(2024, 1, 3)).unwrap();
        assert_eq!(filled.len(), 3);
        assert!(filled.iter().all(|s| s.is_synthetic() && !s.completed));
        assert_eq!(filled[0].id, "temp-r1-2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_window_start_after_today_is_empty() {
        let filled = fill_routine(&routine(vec![]), day(2024, 2, 1), None, day(2024, 1, 3)).unwrap();
        assert!(filled.is_empty());
    }

    #[test]
    fn test_existing_routine_covers_creation_through_today() {
        let created = day(2024, 1, 10);
        let today = day(2024, 1, 20);
        let r = routine(vec![
            status("s2", day(2024, 1, 15), true),
            status("s1", day(2024, 1, 12), false),
        ]);
        let filled = fill_routine(&r, day(2024, 1, 1), Some(created), today).unwrap();

        // (today - created) + 1 days, strictly ascending and unique
        assert_eq!(filled.len(), 11);
        assert!(filled.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(filled.first().unwrap().date, created);
        assert_eq!(filled.last().unwrap().date, today);
    }

    #[test]
    fn test_real_status_never_overwritten() {
        let r = routine(vec![status("real-1", day(2024, 1, 2), true)]);
        let filled = fill_routine(&r, day(2024, 1, 1), Some(day(2024, 1, 1)), day(2024, 1, 3)).unwrap();
        let jan2 = filled.iter().find(|s| s.date == day(2024, 1, 2)).unwrap();
        assert_eq!(jan2.id, "real-1");
        assert!(jan2.completed);
        assert!(!jan2.is_synthetic());
    }

    #[test]
    fn test_three_day_scenario() {
        let routines = vec![routine(vec![status("s-real", day(2024, 1, 2), true)])];
        let creation = vec![CreationDate {
            id: "r1".to_string(),
            created_at: "2024-01-01T09:30:00.000Z".to_string(),
        }];
        let filled = reconstruct(routines, &creation, day(2024, 1, 1), day(2024, 1, 3)).unwrap();
        let entries = to_calendar_entries(&filled);

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].id, "temp-r1-2024-01-01T00:00:00.000Z");
        assert_eq!(entries[0].title, "Walk ⨯");
        assert_eq!(entries[0].background_color, INCOMPLETE_COLOR);
        assert_eq!(entries[1].id, "s-real");
        assert_eq!(entries[1].title, "Walk ✓");
        assert_eq!(entries[1].border_color, COMPLETE_COLOR);
        assert_eq!(entries[1].date, "2024-01-02T00:00:00.000Z");
        assert_eq!(entries[2].id, "temp-r1-2024-01-03T00:00:00.000Z");
        assert!(entries.iter().all(|e| e.display == "block"));
    }

    #[test]
    fn test_missing_creation_date_fails_window() {
        let routines = vec![routine(vec![status("s1", day(2024, 1, 2), true)])];
        let err = reconstruct(routines, &[], day(2024, 1, 1), day(2024, 1, 3)).unwrap_err();
        assert!(err.to_string().contains("Missing creation date"));
    }

    #[test]
    fn test_creation_after_today_is_empty() {
        let r = routine(vec![status("s1", day(2024, 1, 2), true)]);
        let filled = fill_routine(&r, day(2024, 1, 1), Some(day(2024, 2, 1)), day(2024, 1, 3)).unwrap();
        assert!(filled.is_empty());
    }

    #[test]
    fn test_statuses_outside_creation_range_dropped() {
        let r = routine(vec![
            status("early", day(2023, 12, 30), true),
            status("ok", day(2024, 1, 2), true),
        ]);
        let filled = fill_routine(&r, day(2023, 12, 1), Some(day(2024, 1, 1)), day(2024, 1, 2)).unwrap();
        assert_eq!(filled.len(), 2);
        assert!(filled.iter().all(|s| s.id != "early"));
    }

    #[test]
    fn test_duplicate_day_keeps_first() {
        let r = routine(vec![
            status("first", day(2024, 1, 1), true),
            status("second", day(2024, 1, 1), false),
        ]);
        let filled = fill_routine(&r, day(2024, 1, 1), Some(day(2024, 1, 1)), day(2024, 1, 1)).unwrap();
        assert_eq!(filled.len(), 1);
        assert_eq!(filled[0].id, "first");
    }

    #[test]
    fn test_entries_keep_routine_order() {
        let mut second = routine(vec![]);
        second.id = "r2".to_string();
        second.title = "Read".to_string();
        let filled = reconstruct(
            vec![routine(vec![]), second],
            &[],
            day(2024, 1, 1),
            day(2024, 1, 2),
        )
        .unwrap();
        let titles: Vec<String> = to_calendar_entries(&filled)
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["Walk ⨯", "Walk ⨯", "Read ⨯", "Read ⨯"]);
    }
}
