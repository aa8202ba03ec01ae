use std::fmt;

use chrono::{NaiveDate, NaiveTime};

use crate::error::StepError;

/// Date format used by the portal and by operator messages.
pub const DATE_FORMAT: &str = "%d/%m/%Y";
pub const TIME_FORMAT: &str = "%H:%M";

/// Default lower bound for an acceptable appointment date.
pub const DEFAULT_MIN_DATE: &str = "04/03/2026";

pub const DEFAULT_START_URL: &str = "https://icp.administracionelectronica.gob.es/icpplus/index.html";
pub const DEFAULT_TIMEZONE: &str = "Europe/Madrid";

/// Upper bound on the number of slots carried into a report.
pub const MAX_REPORTED_SLOTS: usize = 10;
pub const UNRECOGNIZED_SNIPPET_MAX_CHARS: usize = 500;

/// One stage of the linear booking flow. Only used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Start,
    ProvinceSelect,
    OfficeAndProcedureSelect,
    PersonalInfoEntry,
    MenuSelection,
    ContactInfoEntry,
    FinalRead,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::Start,
        Step::ProvinceSelect,
        Step::OfficeAndProcedureSelect,
        Step::PersonalInfoEntry,
        Step::MenuSelection,
        Step::ContactInfoEntry,
        Step::FinalRead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Start => "start",
            Step::ProvinceSelect => "province_select",
            Step::OfficeAndProcedureSelect => "office_and_procedure_select",
            Step::PersonalInfoEntry => "personal_info_entry",
            Step::MenuSelection => "menu_selection",
            Step::ContactInfoEntry => "contact_info_entry",
            Step::FinalRead => "final_read",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bookable (date, time) pair read off the final page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl Slot {
    pub fn new(date: NaiveDate, time: NaiveTime) -> Self {
        Self { date, time }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.date.format(DATE_FORMAT),
            self.time.format(TIME_FORMAT)
        )
    }
}

/// Parse a portal-style `DD/MM/YYYY` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
}

/// What a single run concluded. Exactly one is produced per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Slots after the minimum date, in page order, at most [`MAX_REPORTED_SLOTS`].
    SlotsFound(Vec<Slot>),
    /// Slots were listed but none was after the minimum date.
    NoQualifyingSlots { seen: usize },
    NoSlots,
    ChallengeDetected,
    Unrecognized { snippet: String },
    StepFailed(StepError),
}

impl RunOutcome {
    /// Quiet outcomes end the run without notifying anyone.
    pub fn is_quiet(&self) -> bool {
        matches!(self, RunOutcome::NoSlots | RunOutcome::NoQualifyingSlots { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::SlotsFound(_) => "slots_found",
            RunOutcome::NoQualifyingSlots { .. } => "no_qualifying_slots",
            RunOutcome::NoSlots => "no_slots",
            RunOutcome::ChallengeDetected => "challenge_detected",
            RunOutcome::Unrecognized { .. } => "unrecognized",
            RunOutcome::StepFailed(_) => "step_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_formats_as_portal_date_and_time() {
        let slot = Slot::new(
            NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        );
        assert_eq!(slot.to_string(), "10/03/2026 09:30");
    }

    #[test]
    fn parse_date_accepts_padded_input() {
        assert_eq!(
            parse_date(" 04/03/2026 ").unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 4).unwrap()
        );
        assert!(parse_date("2026-03-04").is_err());
    }

    #[test]
    fn only_no_slot_outcomes_are_quiet() {
        assert!(RunOutcome::NoSlots.is_quiet());
        assert!(RunOutcome::NoQualifyingSlots { seen: 2 }.is_quiet());
        assert!(!RunOutcome::ChallengeDetected.is_quiet());
        assert!(!RunOutcome::SlotsFound(Vec::new()).is_quiet());
    }

    #[test]
    fn steps_are_listed_in_flow_order() {
        assert_eq!(Step::ALL.first(), Some(&Step::Start));
        assert_eq!(Step::ALL.last(), Some(&Step::FinalRead));
        assert_eq!(Step::OfficeAndProcedureSelect.to_string(), "office_and_procedure_select");
    }
}
