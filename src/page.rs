//! Page-state provider and the bounded waits built on top of it.
//!
//! Every suspension point of a run goes through [`wait_until`], so each one
//! has an explicit bound, and running past it is always reported as
//! [`StepFailure::Timeout`].

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::debug;

use crate::error::{ResolveError, StepFailure};
use crate::selector::{Control, ControlKind, FieldSpec};

/// Minimal view of a live page the navigator needs.
///
/// Indices passed to `select`, `fill` and `click` refer to the most recent
/// `controls` listing of the matching kind.
pub trait PageDriver {
    fn navigate(&self, url: &str) -> Result<()>;

    /// `document.readyState` of the current document.
    fn ready_state(&self) -> Result<String>;

    /// Opaque marker that changes whenever a new document is loaded.
    fn document_token(&self) -> Result<String>;

    /// Visible controls of one kind, in document order.
    fn controls(&self, kind: ControlKind) -> Result<Vec<Control>>;

    fn select(&self, index: usize, value: &str) -> Result<()>;

    fn fill(&self, index: usize, text: &str) -> Result<()>;

    fn click(&self, index: usize) -> Result<()>;

    /// Visible text of the whole page.
    fn body_text(&self) -> Result<String>;

    fn screenshot(&self, path: &Path) -> Result<()>;

    /// Release the session. Called exactly once per run.
    fn close(&self);
}

/// How long each kind of wait may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Full page loads.
    pub navigation: Duration,
    /// Selects filling their options asynchronously.
    pub populate: Duration,
    /// Any other element becoming present.
    pub element: Duration,
    /// First poll interval. Doubles up to [`MAX_POLL_INTERVAL`].
    pub poll: Duration,
}

pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(45),
            populate: Duration::from_secs(20),
            element: Duration::from_secs(15),
            poll: Duration::from_millis(100),
        }
    }
}

/// Poll `probe` until it yields a value or `timeout` elapses.
///
/// Probe errors count as "not ready yet": pages in the middle of a
/// navigation routinely fail evaluation.
pub fn wait_until<T>(
    what: &str,
    timeout: Duration,
    poll: Duration,
    mut probe: impl FnMut() -> Result<Option<T>>,
) -> Result<T, StepFailure> {
    let start = Instant::now();
    let mut interval = poll.max(Duration::from_millis(1));

    loop {
        match probe() {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => debug!(what, error = %format!("{:#}", e), "probe failed, still waiting"),
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(StepFailure::Timeout {
                what: what.to_string(),
                after: timeout,
            });
        }

        std::thread::sleep(interval.min(timeout - elapsed));
        interval = (interval * 2).min(MAX_POLL_INTERVAL);
    }
}

/// Wait until at least `n` selects are visible and each of the first `n`
/// offers more than its placeholder entry.
pub fn wait_for_selects(
    page: &dyn PageDriver,
    n: usize,
    timeouts: &Timeouts,
) -> Result<Vec<Control>, StepFailure> {
    let what = format!("{} populated select(s)", n);
    wait_until(&what, timeouts.populate, timeouts.poll, || {
        let selects = page.controls(ControlKind::Select)?;
        let ready = selects.len() >= n && selects.iter().take(n).all(Control::is_populated);
        Ok(ready.then_some(selects))
    })
}

/// Wait until `spec` resolves on the page and return its index.
///
/// Only absence is waited out. A spec that resolves to several controls
/// fails at once: more markup arriving will not make it unique.
pub fn wait_for_field(
    page: &dyn PageDriver,
    spec: &FieldSpec,
    timeout: Duration,
    poll: Duration,
) -> Result<usize, StepFailure> {
    let resolved = wait_until(&spec.describe(), timeout, poll, || {
        let controls = page.controls(spec.kind())?;
        match spec.resolve(&controls) {
            Err(ResolveError::NotFound(_)) => Ok(None),
            other => Ok(Some(other)),
        }
    })?;
    Ok(resolved?)
}

/// Wait for a parsed document, optionally one different from `previous`.
pub fn wait_for_document(
    page: &dyn PageDriver,
    previous: Option<&str>,
    timeout: Duration,
    poll: Duration,
) -> Result<(), StepFailure> {
    let what = if previous.is_some() {
        "next page to load"
    } else {
        "page to load"
    };
    wait_until(what, timeout, poll, || {
        if let Some(previous) = previous {
            if page.document_token()? == previous {
                return Ok(None);
            }
        }
        let state = page.ready_state()?;
        Ok((state != "loading").then_some(()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn wait_until_returns_once_probe_succeeds() {
        let calls = Cell::new(0);
        let got = wait_until("value", Duration::from_secs(1), Duration::from_millis(1), || {
            calls.set(calls.get() + 1);
            Ok((calls.get() == 3).then_some(42))
        })
        .unwrap();
        assert_eq!(got, 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn wait_until_times_out_with_description() {
        let err = wait_until::<()>(
            "phone input",
            Duration::from_millis(20),
            Duration::from_millis(5),
            || Ok(None),
        )
        .unwrap_err();
        assert_eq!(
            err,
            StepFailure::Timeout {
                what: "phone input".into(),
                after: Duration::from_millis(20)
            }
        );
    }

    #[test]
    fn probe_errors_are_retried() {
        let calls = Cell::new(0);
        let got = wait_until("body", Duration::from_secs(1), Duration::from_millis(1), || {
            calls.set(calls.get() + 1);
            if calls.get() < 2 {
                anyhow::bail!("Execution context was destroyed");
            }
            Ok(Some("ok"))
        })
        .unwrap();
        assert_eq!(got, "ok");
    }
}
