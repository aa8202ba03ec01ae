use std::time::Duration;

use thiserror::Error;

use crate::types::Step;

/// A field or option could not be pinned down to a single element.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("nothing matches {0:?}")]
    NotFound(String),

    #[error("{count} entries match {target:?} exactly")]
    Ambiguous { target: String, count: usize },

    #[error("entry {0:?} has no value")]
    NoValue(String),
}

impl ResolveError {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::NotFound(_) => "NotFound",
            ResolveError::Ambiguous { .. } => "Ambiguous",
            ResolveError::NoValue(_) => "NoValue",
        }
    }
}

/// Why a step could not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepFailure {
    #[error("timed out after {}ms waiting for {what}", .after.as_millis())]
    Timeout { what: String, after: Duration },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("browser error: {0}")]
    Browser(String),
}

impl StepFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StepFailure::Timeout { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StepFailure::Timeout { .. } => "Timeout",
            StepFailure::Resolve(e) => e.kind(),
            StepFailure::Browser(_) => "Browser",
        }
    }
}

impl From<anyhow::Error> for StepFailure {
    fn from(e: anyhow::Error) -> Self {
        StepFailure::Browser(format!("{:#}", e))
    }
}

/// A failure attributed to the step it happened in.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("step {step}: {failure}")]
pub struct StepError {
    pub step: Step,
    pub failure: StepFailure,
}

impl StepError {
    pub fn new(step: Step, failure: impl Into<StepFailure>) -> Self {
        Self {
            step,
            failure: failure.into(),
        }
    }
}

/// Startup configuration problems. These abort the process before a run.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} not set in environment")]
    Missing(&'static str),

    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}
