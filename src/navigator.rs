//! The booking-form state machine.
//!
//! Steps run strictly in order and never revisit a page. Each step returns a
//! [`StepFailure`] that the driver tags with the step it happened in, so the
//! current position never lives in mutable state.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use tracing::{info, warn};

use crate::classifier::ResultClassifier;
use crate::error::{StepError, StepFailure};
use crate::page::{PageDriver, Timeouts, wait_for_document, wait_for_field, wait_for_selects};
use crate::selector::{FieldSpec, OptionMatch};
use crate::types::{RunOutcome, Step};

static SUBMIT: LazyLock<FieldSpec> = LazyLock::new(|| spec(FieldSpec::button(r"\bAceptar\b")));
static REQUEST_APPOINTMENT: LazyLock<FieldSpec> =
    LazyLock::new(|| spec(FieldSpec::button(r"Solicitar Cita")));
static NIE_INPUT: LazyLock<FieldSpec> = LazyLock::new(|| spec(FieldSpec::label(r"N\.I\.E\.")));
static NAME_INPUT: LazyLock<FieldSpec> =
    LazyLock::new(|| spec(FieldSpec::label(r"Nombre y apellidos")));
static PHONE_INPUT: LazyLock<FieldSpec> = LazyLock::new(|| spec(FieldSpec::label(r"Tel[eé]fono")));
// Anchored at the start so the "Repite ..." label never matches it.
static EMAIL_INPUT: LazyLock<FieldSpec> =
    LazyLock::new(|| spec(FieldSpec::label(r"^[^\p{L}]*Correo electr[oó]nico")));
static EMAIL_REPEAT_INPUT: LazyLock<FieldSpec> =
    LazyLock::new(|| spec(FieldSpec::label(r"Repite Correo electr[oó]nico")));

fn spec(built: Result<FieldSpec, regex::Error>) -> FieldSpec {
    built.expect("built-in field pattern is valid")
}

pub const LOADED_SCREENSHOT: &str = "step_loaded.png";
pub const PERSONAL_SCREENSHOT: &str = "before_personal.png";

/// What gets typed and chosen on the way through the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormInput {
    /// Exact province entry, e.g. "Madrid".
    pub province: String,
    /// Exact office entry.
    pub office: String,
    /// Text contained in the wanted procedure entry.
    pub procedure: String,
    pub nie: String,
    pub full_name: String,
    pub phone: String,
    pub email: String,
}

/// Drives one page through the form and reads the result.
pub struct FormNavigator<'a> {
    page: &'a dyn PageDriver,
    start_url: &'a str,
    form: &'a FormInput,
    timeouts: Timeouts,
    artifacts: Option<PathBuf>,
}

impl<'a> FormNavigator<'a> {
    pub fn new(page: &'a dyn PageDriver, start_url: &'a str, form: &'a FormInput) -> Self {
        Self {
            page,
            start_url,
            form,
            timeouts: Timeouts::default(),
            artifacts: None,
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Write checkpoint screenshots into `dir`.
    pub fn with_artifacts(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts = Some(dir.into());
        self
    }

    /// Walk every step and classify the final page. Never panics on page
    /// trouble; failures come back as [`RunOutcome::StepFailed`].
    pub fn run(&self, classifier: &ResultClassifier) -> RunOutcome {
        match self.drive() {
            Ok(text) => classifier.classify(&text),
            Err(e) => {
                warn!(step = %e.step, kind = e.failure.kind(), "run stopped: {}", e.failure);
                RunOutcome::StepFailed(e)
            }
        }
    }

    /// Every step up to and including the final read, returning page text.
    pub fn drive(&self) -> Result<String, StepError> {
        self.step(Step::Start, || self.open_landing())?;
        self.step(Step::ProvinceSelect, || self.choose_province())?;
        self.step(Step::OfficeAndProcedureSelect, || self.choose_office_and_procedure())?;
        self.step(Step::PersonalInfoEntry, || self.enter_personal_info())?;
        self.step(Step::MenuSelection, || self.request_appointment())?;
        let token = self.step(Step::ContactInfoEntry, || self.enter_contact_info())?;
        self.step(Step::FinalRead, || self.read_result(&token))
    }

    fn step<T>(&self, step: Step, body: impl FnOnce() -> Result<T, StepFailure>) -> Result<T, StepError> {
        info!(%step, "step");
        body().map_err(|failure| StepError::new(step, failure))
    }

    fn open_landing(&self) -> Result<(), StepFailure> {
        // A fresh tab may have no readable document yet.
        let blank = self.page.document_token().ok();
        self.page.navigate(self.start_url)?;
        wait_for_document(
            self.page,
            blank.as_deref(),
            self.timeouts.navigation,
            self.timeouts.poll,
        )?;
        self.checkpoint(LOADED_SCREENSHOT);
        Ok(())
    }

    fn choose_province(&self) -> Result<(), StepFailure> {
        let selects = wait_for_selects(self.page, 1, &self.timeouts)?;
        let index = FieldSpec::nth_select(0).resolve(&selects)?;
        let entry = OptionMatch::exact(&self.form.province).resolve(&selects[index].options)?;
        self.page.select(index, &entry.value)?;
        self.submit()
    }

    fn choose_office_and_procedure(&self) -> Result<(), StepFailure> {
        let selects = wait_for_selects(self.page, 2, &self.timeouts)?;

        let office_idx = FieldSpec::nth_select(0).resolve(&selects)?;
        let procedure_idx = FieldSpec::nth_select(1).resolve(&selects)?;
        let office = OptionMatch::exact(&self.form.office).resolve(&selects[office_idx].options)?;
        let procedure =
            OptionMatch::containing(&self.form.procedure).resolve(&selects[procedure_idx].options)?;
        info!(office = %office.text, procedure = %procedure.text, "matched office and procedure");

        self.page.select(office_idx, &office.value)?;
        self.page.select(procedure_idx, &procedure.value)?;
        self.submit()
    }

    fn enter_personal_info(&self) -> Result<(), StepFailure> {
        let nie = self.field(&NIE_INPUT)?;
        self.checkpoint(PERSONAL_SCREENSHOT);
        self.page.fill(nie, &self.form.nie)?;

        let name = self.field(&NAME_INPUT)?;
        self.page.fill(name, &self.form.full_name)?;
        self.submit()
    }

    fn request_appointment(&self) -> Result<(), StepFailure> {
        let button = self.field(&REQUEST_APPOINTMENT)?;
        self.page.click(button)?;
        Ok(())
    }

    /// Returns the document token of the contact page, so the final read
    /// can tell when the result page has replaced it.
    fn enter_contact_info(&self) -> Result<String, StepFailure> {
        let phone = self.field(&PHONE_INPUT)?;
        self.page.fill(phone, &self.form.phone)?;
        let email = self.field(&EMAIL_INPUT)?;
        self.page.fill(email, &self.form.email)?;
        let repeat = self.field(&EMAIL_REPEAT_INPUT)?;
        self.page.fill(repeat, &self.form.email)?;

        let token = self.page.document_token()?;
        self.submit()?;
        Ok(token)
    }

    fn read_result(&self, previous_token: &str) -> Result<String, StepFailure> {
        wait_for_document(
            self.page,
            Some(previous_token),
            self.timeouts.navigation,
            self.timeouts.poll,
        )?;
        Ok(self.page.body_text()?)
    }

    /// The one way every step moves forward: press "Aceptar".
    fn submit(&self) -> Result<(), StepFailure> {
        let button = self.field(&SUBMIT)?;
        self.page.click(button)?;
        Ok(())
    }

    fn field(&self, spec: &FieldSpec) -> Result<usize, StepFailure> {
        wait_for_field(self.page, spec, self.timeouts.element, self.timeouts.poll)
    }

    fn checkpoint(&self, name: &str) {
        let Some(dir) = &self.artifacts else {
            return;
        };
        let path = dir.join(name);
        match self.page.screenshot(&path) {
            Ok(()) => info!(path = %path.display(), "saved screenshot"),
            Err(e) => warn!(path = %path.display(), "screenshot failed: {:#}", e),
        }
    }
}

/// Closes the page when dropped, so every exit path releases the session.
struct SessionGuard<'a>(&'a dyn PageDriver);

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Run the whole flow on `page` and release it afterwards.
pub fn check(
    page: &dyn PageDriver,
    start_url: &str,
    form: &FormInput,
    timeouts: Timeouts,
    artifacts: Option<&Path>,
    classifier: &ResultClassifier,
) -> RunOutcome {
    let _guard = SessionGuard(page);
    let mut navigator = FormNavigator::new(page, start_url, form).with_timeouts(timeouts);
    if let Some(dir) = artifacts {
        navigator = navigator.with_artifacts(dir);
    }
    navigator.run(classifier)
}
