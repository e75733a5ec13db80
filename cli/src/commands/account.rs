use anyhow::Result;

use routinest_core::reconcile::{ReconcileReport, Reconciler};

use super::ClientContext;
use super::helpers::value_or_prompt;
use crate::config::ClientSession;
use crate::remote::RemoteClient;

async fn start_session(
    ctx: &ClientContext,
    anonymous: &RemoteClient,
    email: &str,
    password: &str,
) -> Result<ClientSession> {
    let login = anonymous.login(email, password).await?;
    let session = ClientSession {
        server_url: anonymous.base_url().to_string(),
        token: login.token,
        email: login.email,
        expires_at: login.expires_at,
    };
    ctx.config.save_session(&session)?;
    tracing::info!(email = %session.email, "signed in");
    Ok(session)
}

pub(crate) async fn cmd_signup(
    ctx: &ClientContext,
    email: &str,
    name: &str,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let password = value_or_prompt(password, "Password")?;
    let store = ctx.local_store()?;
    let local = store.read_routines()?;
    let anonymous = ctx.anonymous_client()?;

    let created = anonymous
        .signup(email, &password, name, local.clone())
        .await?;
    if !local.is_empty() {
        store.clear_routines()?;
    }
    let session = start_session(ctx, &anonymous, email, &password).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "userId": created.user_id,
                "email": session.email,
                "imported": created.imported,
            })
        );
    } else {
        println!("{} Signed in as {}.", created.message, session.email);
        if !local.is_empty() {
            println!(
                "Imported {} of {} local routine(s).",
                created.imported,
                local.len()
            );
        }
    }
    Ok(())
}

pub(crate) async fn cmd_login(
    ctx: &ClientContext,
    email: &str,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let password = value_or_prompt(password, "Password")?;
    let anonymous = ctx.anonymous_client()?;
    let session = start_session(ctx, &anonymous, email, &password).await?;

    let client = RemoteClient::new(&session.server_url, Some(session.token.clone()))?;
    let reconciler = Reconciler::new(Box::new(client), ctx.local_store()?);
    let report = reconciler.reconcile(None).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "email": session.email,
                "expiresAt": session.expires_at,
                "sync": report,
            })
        );
    } else {
        println!("Signed in as {}.", session.email);
        print_sync_summary(&report);
    }
    Ok(())
}

pub(crate) fn print_sync_summary(report: &ReconcileReport) {
    if report.total() == 0 {
        return;
    }
    println!(
        "Synced local routines: {} created, {} already on server, {} failed.",
        report.created, report.matched, report.failed
    );
}

pub(crate) async fn cmd_logout(ctx: &ClientContext, json: bool) -> Result<()> {
    let Some(session) = ctx.config.load_session()? else {
        if json {
            println!("{}", serde_json::json!({ "loggedOut": false }));
        } else {
            eprintln!("Not logged in.");
        }
        return Ok(());
    };

    let client = RemoteClient::new(&session.server_url, Some(session.token))?;
    if let Err(e) = client.logout().await {
        tracing::warn!("server logout failed: {e:#}");
    }
    ctx.config.clear_session()?;

    if json {
        println!("{}", serde_json::json!({ "loggedOut": true }));
    } else {
        println!("Signed out {}.", session.email);
    }
    Ok(())
}

pub(crate) async fn cmd_whoami(ctx: &ClientContext, json: bool) -> Result<()> {
    let check = ctx.client()?.check().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&check)?);
    } else {
        println!("{} <{}>", check.name, check.email);
    }
    Ok(())
}

pub(crate) async fn cmd_change_password(
    ctx: &ClientContext,
    current: Option<String>,
    new: Option<String>,
    json: bool,
) -> Result<()> {
    let current = value_or_prompt(current, "Current password")?;
    let new = value_or_prompt(new, "New password")?;
    let result = ctx.client()?.change_password(&current, &new).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.message);
    }
    Ok(())
}
