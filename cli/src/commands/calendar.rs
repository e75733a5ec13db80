use anyhow::{Result, bail};
use chrono::{Datelike, NaiveDate};
use tabled::{Table, Tabled, settings::Style};

use routinest_core::calendar::load_calendar;
use routinest_core::models::{CalendarEntry, CalendarWindow};
use routinest_core::service::today_utc;

use super::ClientContext;
use super::helpers::parse_date;

/// Default window: the first of the current month through today.
fn default_window(today: NaiveDate) -> CalendarWindow {
    CalendarWindow::new(today.with_day(1).unwrap_or(today), today)
}

fn resolve_window(
    start: Option<&str>,
    end: Option<&str>,
    today: NaiveDate,
) -> Result<CalendarWindow> {
    let default = default_window(today);
    let start = match start {
        Some(s) => parse_date(Some(s))?,
        None => default.start,
    };
    let end = match end {
        Some(s) => parse_date(Some(s))?,
        None => default.end.max(start),
    };
    if start > end {
        bail!("--start must not be after --end");
    }
    Ok(CalendarWindow::new(start, end))
}

fn print_calendar(entries: &[CalendarEntry]) {
    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Routine")]
        title: String,
    }

    let mut sorted: Vec<&CalendarEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.date.cmp(&b.date));

    let rows: Vec<EntryRow> = sorted
        .iter()
        .map(|e| EntryRow {
            date: e.date.get(..10).unwrap_or(&e.date).to_string(),
            title: e.title.clone(),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) async fn cmd_calendar(
    ctx: &ClientContext,
    start: Option<&str>,
    end: Option<&str>,
    server_side: bool,
    json: bool,
) -> Result<()> {
    let today = today_utc();
    let window = resolve_window(start, end, today)?;
    let client = ctx.client()?;

    let entries = if server_side {
        client.calendar_events(window).await?
    } else {
        load_calendar(&client, window, today).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        eprintln!("No calendar entries between {} and {}.", window.start, window.end);
    } else {
        print_calendar(&entries);
    }
    Ok(())
}
