//! triaged - scheduled sync and classification for configured accounts
//!
//! Usage:
//!   triaged [--full] [--force] [--cleanup]
//!   triaged --chat "delete spam"
//!   triaged --write-config
//!
//! Without `--chat`, every account in `accounts.json` whose cooldown has
//! passed (or all of them with `--force`) is synced and then classified.

use anyhow::{Result, bail};
use chrono::Utc;
use log::{error, info, warn};
use std::process::ExitCode;
use std::sync::Arc;
use triage::{
    AccountContext, CancellationToken, IntentOutcome, Selector, SyncMode, TaskStatus,
    TriageConfig, TriageService, intent,
};

#[derive(Debug, Default)]
struct Args {
    full: bool,
    force: bool,
    cleanup: bool,
    write_config: bool,
    chat: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--full" => args.full = true,
            "--force" => args.force = true,
            "--cleanup" => args.cleanup = true,
            "--write-config" => args.write_config = true,
            "--chat" => match iter.next() {
                Some(message) => args.chat = Some(message),
                None => bail!("--chat needs a message"),
            },
            other => bail!("unknown argument: {}", other),
        }
    }
    Ok(args)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = parse_args()?;
    if args.write_config {
        if TriageConfig::write_default_if_missing()? {
            info!("Wrote default settings to {:?}", config::config_path("triage.json"));
        } else {
            info!("Settings file already exists; left unchanged");
        }
        return Ok(());
    }

    let config = TriageConfig::load()?;
    let accounts = triage::load_accounts()?;
    let service = Arc::new(TriageService::open(config)?);

    if let Some(message) = &args.chat {
        let intent = intent::parse(message);
        info!("Parsed intent: {:?}", intent);
        for ctx in &accounts {
            let outcome = service.handle_intent(ctx, &intent, &CancellationToken::new())?;
            report_outcome(ctx, &outcome)?;
        }
        return Ok(());
    }

    let mode = if args.full { SyncMode::Full } else { SyncMode::Incremental };
    for ctx in accounts {
        run_account(&service, ctx, mode, &args)?;
    }
    Ok(())
}

fn run_account(
    service: &Arc<TriageService>,
    ctx: AccountContext,
    mode: SyncMode,
    args: &Args,
) -> Result<()> {
    let account_id = ctx.account_id.clone();
    if !args.force && !service.sync_due(&account_id, Utc::now())? {
        info!("Skipping {}: sync cooldown not elapsed", account_id);
        return Ok(());
    }

    let sync = match service.spawn_sync(ctx, mode)?.wait() {
        TaskStatus::Finished(result) => result,
        TaskStatus::Failed(e) => bail!("sync of {} failed: {}", account_id, e),
        TaskStatus::Running => bail!("sync of {} did not finish", account_id),
    };
    info!(
        "Synced {}: {} new, {} updated, {} unchanged, {} errors ({:?}, {}ms)",
        account_id,
        sync.new_count,
        sync.updated_count,
        sync.unchanged_count,
        sync.error_count,
        sync.status,
        sync.duration_ms
    );
    if !sync.is_complete() {
        warn!("Sync of {} stopped early: {:?}", account_id, sync.last_error);
    }

    match service
        .spawn_classification(account_id.clone(), Selector::unprocessed())?
        .wait()
    {
        TaskStatus::Finished(result) => info!(
            "Classified {}: {} processed, {} succeeded, {} failed, {} API calls ({:?})",
            account_id,
            result.processed,
            result.succeeded,
            result.failed,
            result.api_calls,
            result.status
        ),
        TaskStatus::Failed(e) => warn!("Classification of {} failed: {}", account_id, e),
        TaskStatus::Running => warn!("Classification of {} did not finish", account_id),
    }

    if args.cleanup {
        let retention = service.cleanup_content(&account_id, Utc::now())?;
        info!("Retention cleanup for {}: {} emails", account_id, retention.cleaned);
    }
    Ok(())
}

fn report_outcome(ctx: &AccountContext, outcome: &IntentOutcome) -> Result<()> {
    let account_id = &ctx.account_id;
    match outcome {
        IntentOutcome::Synced(sync) => info!(
            "{}: sync {:?}, {} new, {} updated",
            account_id, sync.status, sync.new_count, sync.updated_count
        ),
        IntentOutcome::Classified(result) => info!(
            "{}: classified {} of {} ({:?})",
            account_id, result.succeeded, result.processed, result.status
        ),
        IntentOutcome::Bulk(result) => info!("{}: {}", account_id, result.summary()),
        IntentOutcome::Spam(entries) => {
            println!("{}", serde_json::to_string_pretty(entries)?)
        }
        IntentOutcome::Summary(counts) => {
            println!("{}", serde_json::to_string_pretty(counts)?)
        }
        IntentOutcome::Unrecognized => {
            warn!("Not understood. Try: sync, classify, show spam, delete spam, summary")
        }
    }
    Ok(())
}
