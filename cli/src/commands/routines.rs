use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use routinest_core::gateway::RoutineGateway;
use routinest_core::models::{NewRoutine, RoutineSummary, normalize_url, validate_title};

use super::ClientContext;
use super::helpers::{check_mark, short_timestamp, truncate};

fn print_routine_table(routines: &[RoutineSummary]) {
    #[derive(Tabled)]
    struct RoutineRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Today")]
        done: &'static str,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "URL")]
        url: String,
        #[tabled(rename = "Created")]
        created: String,
    }

    let rows: Vec<RoutineRow> = routines
        .iter()
        .map(|r| RoutineRow {
            id: r.id.clone(),
            done: check_mark(r.completed),
            title: truncate(&r.title, 35),
            url: r
                .url
                .as_deref()
                .map(|u| truncate(u, 30))
                .unwrap_or_default(),
            created: short_timestamp(&r.created_at),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(1)).with(Alignment::center()))
        .to_string();
    println!("{table}");
}

fn print_routine(routine: &RoutineSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(routine)?);
    } else {
        print_routine_table(std::slice::from_ref(routine));
    }
    Ok(())
}

pub(crate) async fn cmd_routines_list(ctx: &ClientContext, json: bool) -> Result<()> {
    let routines = ctx.client()?.list_routines().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&routines)?);
    } else if routines.is_empty() {
        eprintln!("No routines yet. Use `routinest routines add <title>` to create one.");
    } else {
        print_routine_table(&routines);
    }
    Ok(())
}

pub(crate) async fn cmd_routines_add(
    ctx: &ClientContext,
    title: &str,
    url: Option<&str>,
    completed: bool,
    json: bool,
) -> Result<()> {
    let routine = NewRoutine {
        title: validate_title(title)?,
        url: normalize_url(url),
        completed,
    };
    let created = ctx.client()?.create_routine(&routine).await?;
    print_routine(&created, json)
}

pub(crate) async fn cmd_routines_edit(
    ctx: &ClientContext,
    id: &str,
    title: &str,
    url: Option<&str>,
    json: bool,
) -> Result<()> {
    let title = validate_title(title)?;
    let updated = ctx
        .client()?
        .update_routine(id, &title, normalize_url(url))
        .await?;
    print_routine(&updated, json)
}

pub(crate) async fn cmd_routines_set_completed(
    ctx: &ClientContext,
    id: &str,
    completed: bool,
    json: bool,
) -> Result<()> {
    let updated = ctx.client()?.set_completed(id, completed).await?;
    print_routine(&updated, json)
}

pub(crate) async fn cmd_routines_delete(ctx: &ClientContext, id: &str, json: bool) -> Result<()> {
    ctx.client()?.delete_routine(id).await?;
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted routine {id}");
    }
    Ok(())
}
