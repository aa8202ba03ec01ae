//! Outbound operator notifications.
//!
//! Delivery is best effort. A notifier never returns an error to its
//! caller: a failed message must not turn into a failed check.

use std::future::Future;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

use crate::report::RunReport;

pub const TELEGRAM_API: &str = "https://api.telegram.org";
pub const SEND_ATTEMPTS: u32 = 3;
pub const BACKOFF_STEP: Duration = Duration::from_secs(2);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str);
}

/// Sends through a Telegram bot's `sendMessage`.
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    token: String,
    chat_id: String,
    attempts: u32,
    backoff: Duration,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_base: TELEGRAM_API.to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
            attempts: SEND_ATTEMPTS,
            backoff: BACKOFF_STEP,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    async fn post(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let response = self
            .client
            .post(url)
            .json(&json!({
                "chat_id": self.chat_id,
                "text": text,
                "disable_web_page_preview": true,
            }))
            .send()
            .await
            // The URL embeds the bot token; keep it out of logs.
            .map_err(|e| anyhow!("request failed: {}", e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("telegram answered {}", status));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) {
        if let Err(e) = retry_with_backoff(self.attempts, self.backoff, || self.post(text)).await {
            warn!("notification dropped: {:#}", e);
        }
    }
}

/// Prints messages instead of sending them. Used for dry runs.
pub struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn send(&self, text: &str) {
        println!("{}", text);
    }
}

/// Run `op` up to `attempts` times, sleeping `backoff * n` after the n-th
/// failure. Returns the last error if every attempt fails.
pub async fn retry_with_backoff<F, Fut>(attempts: u32, backoff: Duration, mut op: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                warn!(attempt, "send failed, retrying: {:#}", e);
                tokio::time::sleep(backoff * attempt).await;
                attempt += 1;
            }
        }
    }
}

/// Hand the report to `notifier` if it carries a message. Returns whether
/// anything was sent.
pub async fn dispatch(notifier: &dyn Notifier, report: &RunReport, min_date: NaiveDate) -> bool {
    match report.message(min_date) {
        Some(text) => {
            info!(outcome = report.outcome.label(), "notifying operator");
            notifier.send(&text).await;
            true
        }
        None => {
            info!(outcome = report.outcome.label(), "nothing to report");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunOutcome;
    use chrono::TimeZone;
    use chrono_tz::Europe::Madrid;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl Notifier for Recorder {
        async fn send(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    fn min_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 4).unwrap()
    }

    fn report(outcome: RunOutcome) -> RunReport {
        RunReport::new(outcome, Madrid.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_with_backoff(3, Duration::ZERO, || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow!("503"))
            } else {
                Ok(())
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_last_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_with_backoff(3, Duration::ZERO, || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("connection refused"))
        })
        .await;
        assert_eq!(result.unwrap_err().to_string(), "connection refused");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backs_off_two_then_four_seconds() {
        let start = tokio::time::Instant::now();
        let attempts = Mutex::new(Vec::new());
        let log = &attempts;
        let result = retry_with_backoff(SEND_ATTEMPTS, BACKOFF_STEP, || async move {
            log.lock().unwrap().push(start.elapsed());
            Err(anyhow!("502"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(
            *attempts.lock().unwrap(),
            vec![Duration::ZERO, Duration::from_secs(2), Duration::from_secs(6)]
        );
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn telegram_failures_are_swallowed() {
        // Nothing listens on port 9 locally; every attempt fails fast.
        let notifier = TelegramNotifier::new("123:abc", "42")
            .unwrap()
            .with_api_base("http://127.0.0.1:9")
            .with_retry(2, Duration::ZERO);
        notifier.send("hello").await;
    }

    #[tokio::test]
    async fn dispatch_skips_quiet_outcomes() {
        let recorder = Recorder::default();
        assert!(!dispatch(&recorder, &report(RunOutcome::NoSlots), min_date()).await);
        assert!(
            !dispatch(
                &recorder,
                &report(RunOutcome::NoQualifyingSlots { seen: 1 }),
                min_date()
            )
            .await
        );
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dispatch_sends_challenge_once() {
        let recorder = Recorder::default();
        assert!(dispatch(&recorder, &report(RunOutcome::ChallengeDetected), min_date()).await);
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }
}
