//! Unattended checker for free slots on the appointment portal.
//!
//! A run drives one headless browser page through the booking form,
//! classifies the final page and turns the result into a [`RunReport`] for
//! the operator.

pub mod chrome;
pub mod classifier;
pub mod config;
pub mod error;
pub mod navigator;
pub mod notifier;
pub mod page;
pub mod report;
pub mod resource_filter;
pub mod selector;
pub mod time_gate;
pub mod types;

use tracing::error;

use crate::chrome::{BrowserSession, LaunchConfig};
use crate::classifier::ResultClassifier;
use crate::config::Config;
use crate::error::StepError;
use crate::page::Timeouts;
use crate::resource_filter::ResourceFilter;

pub use crate::report::RunReport;
pub use crate::types::{RunOutcome, Slot, Step};

/// Launch Chrome, walk the form and classify the result.
///
/// Blocking. The browser is closed before this returns, whatever happened.
pub fn check_availability(config: &Config, headless: bool) -> RunOutcome {
    let launch = LaunchConfig {
        headless,
        chrome_path: config.chrome_path.clone(),
        timezone: config.timezone.name().to_string(),
        filter: ResourceFilter::default(),
    };

    let session = match BrowserSession::launch(&launch) {
        Ok(session) => session,
        Err(e) => {
            error!("could not start browser: {:#}", e);
            return RunOutcome::StepFailed(StepError::new(Step::Start, e));
        }
    };

    navigator::check(
        &session,
        &config.start_url,
        &config.form,
        Timeouts::default(),
        config.artifacts_dir.as_deref(),
        &ResultClassifier::new(config.min_date),
    )
}
