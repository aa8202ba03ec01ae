use anyhow::Result;
use chrono::Utc;
use cita_watch::config::{Cli, Config};
use cita_watch::error::{StepError, StepFailure};
use cita_watch::notifier::{self, Notifier, StdoutNotifier, TelegramNotifier};
use cita_watch::{RunOutcome, RunReport, Step, check_availability, time_gate};
use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env(!cli.dry_run)?;

    let now = Utc::now().with_timezone(&config.timezone);
    if !cli.force && !time_gate::allowed(&now) {
        info!(local_time = %now.format("%H:%M"), "outside operating window, skipping run");
        return Ok(());
    }

    let notifier: Box<dyn Notifier> = match (&config.telegram, cli.dry_run) {
        (Some(tg), false) => Box::new(TelegramNotifier::new(&tg.token, &tg.chat_id)?),
        _ => Box::new(StdoutNotifier),
    };

    info!(start_url = %config.start_url, "starting check");

    // headless_chrome blocks; keep it off the async workers.
    let run_config = config.clone();
    let headless = !cli.headed;
    let outcome = tokio::task::spawn_blocking(move || check_availability(&run_config, headless))
        .await
        .unwrap_or_else(|e| {
            error!("check aborted: {}", e);
            RunOutcome::StepFailed(StepError::new(
                Step::Start,
                StepFailure::Browser(format!("check aborted: {}", e)),
            ))
        });

    let report = RunReport::new(outcome, Utc::now().with_timezone(&config.timezone));
    info!(outcome = report.outcome.label(), "check finished");
    notifier::dispatch(notifier.as_ref(), &report, config.min_date).await;

    Ok(())
}
