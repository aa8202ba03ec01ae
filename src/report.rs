use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;

use crate::error::StepError;
use crate::types::{DATE_FORMAT, RunOutcome};

/// The single summary of a run, handed once to the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub timestamp: DateTime<Tz>,
}

impl RunReport {
    pub fn new(outcome: RunOutcome, timestamp: DateTime<Tz>) -> Self {
        Self { outcome, timestamp }
    }

    /// Operator message for this run, or `None` when nothing is worth
    /// sending.
    pub fn message(&self, min_date: NaiveDate) -> Option<String> {
        let text = match &self.outcome {
            RunOutcome::NoSlots | RunOutcome::NoQualifyingSlots { .. } => return None,
            RunOutcome::SlotsFound(slots) => {
                let mut text = format!(
                    "✅ Appointments available (after {}):",
                    min_date.format(DATE_FORMAT)
                );
                for slot in slots {
                    text.push('\n');
                    text.push_str(&slot.to_string());
                }
                text
            }
            RunOutcome::ChallengeDetected => {
                "🧩 CAPTCHA/verification page: reached the end but could not read the appointment list. Check manually."
                    .to_string()
            }
            RunOutcome::Unrecognized { snippet } => {
                let mut text =
                    "⚠️ Status not recognized (no slots and no 'No hay citas'). Check manually."
                        .to_string();
                if !snippet.is_empty() {
                    text.push_str("\n\n");
                    text.push_str(snippet);
                }
                text
            }
            RunOutcome::StepFailed(StepError { step, failure }) if failure.is_timeout() => {
                format!("⏱️ Timeout at step: {}. Check manually.", step)
            }
            RunOutcome::StepFailed(StepError { step, failure }) => {
                format!(
                    "⚠️ Error at step: {} ({}). Check manually.",
                    step,
                    failure.kind()
                )
            }
        };
        Some(text)
    }
}
