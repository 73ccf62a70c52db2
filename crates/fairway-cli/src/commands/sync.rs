use chrono::Utc;
use fairway_core::sync::{SyncTrigger, COURSES_COLLECTION};

use crate::commands::common::{
    format_sync_conflict_lines, format_sync_report, format_sync_status_lines, print_json,
    print_lines, AppContext,
};
use crate::error::CliError;

pub async fn run_sync(ctx: &AppContext) -> Result<(), CliError> {
    if !ctx.client.session().is_authenticated() {
        println!("Not signed in; refreshing the course catalog only.");
    }

    let report = ctx
        .engine()
        .sync_now(SyncTrigger::Manual)
        .await?
        .ok_or(CliError::SyncInProgress)?;

    if let Some(error) = report.error_summary() {
        return Err(CliError::SyncFailed(error));
    }
    println!("{}", format_sync_report(&report));
    Ok(())
}

pub async fn run_sync_status(as_json: bool, ctx: &AppContext) -> Result<(), CliError> {
    let status = ctx.client.sync_status().await?;
    if as_json {
        return print_json(&status);
    }

    let checkpoint = ctx
        .client
        .database()
        .get_checkpoint(COURSES_COLLECTION)
        .await?;
    print_lines(
        &format_sync_status_lines(&status, checkpoint, Utc::now()),
        "",
    );
    Ok(())
}

pub async fn run_sync_conflicts(
    limit: usize,
    as_json: bool,
    ctx: &AppContext,
) -> Result<(), CliError> {
    let conflicts = ctx.client.sync_conflicts(limit).await?;

    if as_json {
        return print_json(&conflicts);
    }

    print_lines(
        &format_sync_conflict_lines(&conflicts),
        "No sync conflicts recorded.",
    );
    Ok(())
}
