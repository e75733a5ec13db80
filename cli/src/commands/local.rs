use anyhow::Result;
use chrono::Utc;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use routinest_core::local_store::LocalRoutineStore;
use routinest_core::models::LocalRoutine;

use super::helpers::{check_mark, json_error, parse_date, truncate};

fn print_local_table(routines: &[LocalRoutine]) {
    #[derive(Tabled)]
    struct LocalRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Done")]
        done: &'static str,
        #[tabled(rename = "Routine")]
        text: String,
        #[tabled(rename = "Added")]
        added: String,
    }

    let rows: Vec<LocalRow> = routines
        .iter()
        .map(|r| LocalRow {
            id: r.id.clone(),
            done: check_mark(r.completed),
            text: truncate(&r.text, 40),
            added: r.created_at.format("%Y-%m-%d %H:%M").to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(1)).with(Alignment::center()))
        .to_string();
    println!("{table}");
}

pub(crate) fn cmd_local_add(store: &LocalRoutineStore, text: &str, json: bool) -> Result<()> {
    let routine = store.add(text, Utc::now())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&routine)?);
    } else {
        println!("Added local routine '{}' (id {})", routine.text, routine.id);
    }
    Ok(())
}

pub(crate) fn cmd_local_list(store: &LocalRoutineStore, json: bool) -> Result<()> {
    let routines = store.read_routines()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&routines)?);
    } else if routines.is_empty() {
        eprintln!("No local routines. Use `routinest local add <text>` to add one.");
    } else {
        print_local_table(&routines);
    }
    Ok(())
}

pub(crate) fn cmd_local_toggle(store: &LocalRoutineStore, id: &str, json: bool) -> Result<()> {
    let routine = store.toggle(id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&routine)?);
    } else {
        let state = if routine.completed { "done" } else { "not done" };
        println!("'{}' marked {state}", routine.text);
    }
    Ok(())
}

pub(crate) fn cmd_local_edit(
    store: &LocalRoutineStore,
    id: &str,
    text: &str,
    json: bool,
) -> Result<()> {
    let routine = store.rename(id, text)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&routine)?);
    } else {
        println!("Renamed local routine {} to '{}'", routine.id, routine.text);
    }
    Ok(())
}

pub(crate) fn cmd_local_delete(store: &LocalRoutineStore, id: &str, json: bool) -> Result<()> {
    let deleted = store.remove(id)?;
    if json {
        if deleted {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("{}", json_error(&format!("Local routine {id} not found")));
        }
    } else if deleted {
        println!("Deleted local routine {id}");
    } else {
        eprintln!("Local routine {id} not found");
    }
    Ok(())
}

/// Daily refresh: archive today's list and uncheck everything.
pub(crate) fn cmd_local_rollover(
    store: &LocalRoutineStore,
    date: Option<&str>,
    json: bool,
) -> Result<()> {
    let day = parse_date(date)?;
    let carried = store.roll_over(day)?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "date": day.format("%Y-%m-%d").to_string(), "routines": carried })
        );
    } else {
        println!(
            "Saved {carried} routine(s) to history for {} and unchecked them",
            day.format("%Y-%m-%d")
        );
    }
    Ok(())
}

pub(crate) fn cmd_local_history(store: &LocalRoutineStore, json: bool) -> Result<()> {
    let history = store.read_history()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }
    if history.is_empty() {
        eprintln!("No history yet. `routinest local rollover` records one day.");
        return Ok(());
    }
    for (day, routines) in &history {
        let done = routines.iter().filter(|r| r.completed).count();
        println!("{day}: {done}/{} done", routines.len());
    }
    Ok(())
}
