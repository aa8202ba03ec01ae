//! Triage of the final page's visible text.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use tracing::debug;

use crate::types::{
    MAX_REPORTED_SLOTS, RunOutcome, Slot, TIME_FORMAT, UNRECOGNIZED_SNIPPET_MAX_CHARS, parse_date,
};

static SLOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)D[ií]a:\s*([0-9]{2}/[0-9]{2}/[0-9]{4}).*?Hora:\s*([0-9]{2}:[0-9]{2})")
        .expect("slot pattern is valid")
});
static NO_SLOTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)No hay citas").expect("no-slots pattern is valid"));
static CHALLENGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)captcha").expect("captcha pattern is valid"));

/// Turns page text into a [`RunOutcome`]. Pure: same text, same outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultClassifier {
    min_date: NaiveDate,
}

impl ResultClassifier {
    /// Only slots strictly after `min_date` qualify.
    pub fn new(min_date: NaiveDate) -> Self {
        Self { min_date }
    }

    pub fn min_date(&self) -> NaiveDate {
        self.min_date
    }

    pub fn classify(&self, page_text: &str) -> RunOutcome {
        // Slot listings win over the markers below: "captcha" can show up in
        // boilerplate on a page that does list appointments.
        let slots = extract_slots(page_text);
        if !slots.is_empty() {
            let seen = slots.len();
            let qualifying: Vec<Slot> = slots
                .into_iter()
                .filter(|s| s.date > self.min_date)
                .take(MAX_REPORTED_SLOTS)
                .collect();
            if qualifying.is_empty() {
                return RunOutcome::NoQualifyingSlots { seen };
            }
            return RunOutcome::SlotsFound(qualifying);
        }

        if NO_SLOTS_RE.is_match(page_text) {
            return RunOutcome::NoSlots;
        }

        if CHALLENGE_RE.is_match(page_text) {
            return RunOutcome::ChallengeDetected;
        }

        RunOutcome::Unrecognized {
            snippet: snippet(page_text),
        }
    }
}

/// Every "Día: DD/MM/YYYY ... Hora: HH:MM" pair, in page order.
///
/// Pairs that are not real calendar values are dropped.
pub fn extract_slots(text: &str) -> Vec<Slot> {
    SLOT_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let (date, time) = (&caps[1], &caps[2]);
            match (parse_date(date), NaiveTime::parse_from_str(time, TIME_FORMAT)) {
                (Ok(date), Ok(time)) => Some(Slot::new(date, time)),
                _ => {
                    debug!(date, time, "skipping malformed slot");
                    None
                }
            }
        })
        .collect()
}

fn snippet(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(UNRECOGNIZED_SNIPPET_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ResultClassifier {
        ResultClassifier::new(NaiveDate::from_ymd_opt(2026, 3, 4).unwrap())
    }

    #[test]
    fn slots_before_minimum_date_are_not_reported() {
        let page = "Día: 01/03/2026 Hora: 10:00\nDía: 04/03/2026 Hora: 11:15";
        assert_eq!(
            classifier().classify(page),
            RunOutcome::NoQualifyingSlots { seen: 2 }
        );
    }

    #[test]
    fn keeps_only_slots_after_minimum_date() {
        let page = "CITA 1 Día: 10/03/2026\nOficina X\nHora: 09:30\nCITA 2 Día: 01/03/2026 Hora: 10:00";
        let RunOutcome::SlotsFound(slots) = classifier().classify(page) else {
            panic!("expected slots");
        };
        assert_eq!(
            slots.iter().map(Slot::to_string).collect::<Vec<_>>(),
            vec!["10/03/2026 09:30".to_string()]
        );
    }

    #[test]
    fn slot_span_crosses_lines_and_accepts_unaccented_dia() {
        let page = "Dia: 12/03/2026\n\n  Lugar: Comisaría\n  Hora: 08:05";
        let slots = extract_slots(page);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].to_string(), "12/03/2026 08:05");
    }

    #[test]
    fn at_most_ten_slots_are_kept_in_page_order() {
        let page: String = (10..25)
            .map(|d| format!("Día: {d:02}/04/2026 Hora: 09:00\n"))
            .collect();
        let RunOutcome::SlotsFound(slots) = classifier().classify(&page) else {
            panic!("expected slots");
        };
        assert_eq!(slots.len(), MAX_REPORTED_SLOTS);
        assert_eq!(slots[0].to_string(), "10/04/2026 09:00");
        assert_eq!(slots[9].to_string(), "19/04/2026 09:00");
    }

    #[test]
    fn invalid_calendar_dates_are_skipped() {
        let page = "Día: 31/02/2026 Hora: 09:00 Día: 11/03/2026 Hora: 25:00 Día: 12/03/2026 Hora: 10:30";
        let slots = extract_slots(page);
        assert_eq!(slots.iter().map(Slot::to_string).collect::<Vec<_>>(), vec!["12/03/2026 10:30".to_string()]);
    }

    #[test]
    fn no_appointments_marker() {
        assert_eq!(classifier().classify("No hay citas disponibles"), RunOutcome::NoSlots);
        assert_eq!(
            classifier().classify("En este momento NO HAY CITAS disponibles."),
            RunOutcome::NoSlots
        );
    }

    #[test]
    fn captcha_marker_without_slots() {
        assert_eq!(
            classifier().classify("Verifique el captcha para continuar"),
            RunOutcome::ChallengeDetected
        );
    }

    #[test]
    fn slots_take_priority_over_captcha_boilerplate() {
        let page = "Protegido por reCAPTCHA. Día: 20/03/2026 Hora: 12:00";
        assert!(matches!(classifier().classify(page), RunOutcome::SlotsFound(_)));
    }

    #[test]
    fn no_appointments_takes_priority_over_captcha() {
        let page = "No hay citas disponibles. Este sitio usa captcha.";
        assert_eq!(classifier().classify(page), RunOutcome::NoSlots);
    }

    #[test]
    fn anything_else_is_unrecognized_with_collapsed_snippet() {
        let outcome = classifier().classify("  Sesión\n\n caducada   vuelva a empezar ");
        assert_eq!(
            outcome,
            RunOutcome::Unrecognized {
                snippet: "Sesión caducada vuelva a empezar".into()
            }
        );
    }

    #[test]
    fn unrecognized_snippet_is_bounded() {
        let page = "x".repeat(UNRECOGNIZED_SNIPPET_MAX_CHARS * 3);
        let RunOutcome::Unrecognized { snippet } = classifier().classify(&page) else {
            panic!("expected unrecognized");
        };
        assert_eq!(snippet.chars().count(), UNRECOGNIZED_SNIPPET_MAX_CHARS);
    }

    #[test]
    fn classification_is_repeatable() {
        let c = classifier();
        for page in [
            "Día: 10/03/2026 Hora: 09:30",
            "No hay citas",
            "captcha",
            "???",
        ] {
            assert_eq!(c.classify(page), c.classify(page));
        }
    }
}
