use anyhow::Result;

use routinest_core::reconcile::Reconciler;

use super::ClientContext;
use super::account::print_sync_summary;

pub(crate) async fn cmd_sync(ctx: &ClientContext, json: bool) -> Result<()> {
    let reconciler = Reconciler::new(Box::new(ctx.client()?), ctx.local_store()?);
    let report = reconciler.reconcile(None).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.total() == 0 {
        println!("Nothing to sync.");
    } else {
        print_sync_summary(&report);
    }
    Ok(())
}
