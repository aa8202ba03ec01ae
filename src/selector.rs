//! Pattern-based element resolution.
//!
//! The portal's markup is not ours, so controls are found by what a user
//! sees (label text, button name, position among visible selects) instead of
//! by DOM structure. Everything here is pure: it works on [`Control`]
//! snapshots taken by a [`crate::page::PageDriver`] and returns indices back
//! into that snapshot.

use regex::Regex;
use serde::Deserialize;

use crate::error::ResolveError;

/// Which family of visible controls a snapshot lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Select,
    TextInput,
    Button,
}

impl ControlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlKind::Select => "select",
            ControlKind::TextInput => "input",
            ControlKind::Button => "button",
        }
    }
}

/// One `<option>` of a select.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OptionEntry {
    pub text: String,
    #[serde(default)]
    pub value: String,
}

impl OptionEntry {
    pub fn new(text: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            value: value.into(),
        }
    }
}

/// A visible control as seen at snapshot time.
///
/// `name` is the accessible label for inputs and selects, and the accessible
/// name for buttons. `options` is only filled for selects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Control {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub options: Vec<OptionEntry>,
}

impl Control {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Vec::new(),
        }
    }

    pub fn select(options: Vec<OptionEntry>) -> Self {
        Self {
            name: String::new(),
            options,
        }
    }

    /// More than the lone placeholder entry a select shows while loading.
    pub fn is_populated(&self) -> bool {
        self.options.len() > 1
    }
}

/// Declarative description of one control to act on.
#[derive(Debug, Clone)]
pub enum FieldSpec {
    /// Text input whose accessible label matches. Must be unique.
    Label(Regex),
    /// Button whose accessible name matches. The first match wins.
    Button(Regex),
    /// Zero-based position among visible controls of one kind.
    Positional { kind: ControlKind, index: usize },
}

impl FieldSpec {
    /// Case-insensitive label pattern.
    pub fn label(pattern: &str) -> Result<Self, regex::Error> {
        Ok(FieldSpec::Label(case_insensitive(pattern)?))
    }

    /// Case-insensitive button name pattern.
    pub fn button(pattern: &str) -> Result<Self, regex::Error> {
        Ok(FieldSpec::Button(case_insensitive(pattern)?))
    }

    pub fn nth_select(index: usize) -> Self {
        FieldSpec::Positional {
            kind: ControlKind::Select,
            index,
        }
    }

    pub fn kind(&self) -> ControlKind {
        match self {
            FieldSpec::Label(_) => ControlKind::TextInput,
            FieldSpec::Button(_) => ControlKind::Button,
            FieldSpec::Positional { kind, .. } => *kind,
        }
    }

    /// Human-readable target, used in errors and logs.
    pub fn describe(&self) -> String {
        match self {
            FieldSpec::Label(re) => format!("input labelled /{}/", re.as_str()),
            FieldSpec::Button(re) => format!("button named /{}/", re.as_str()),
            FieldSpec::Positional { kind, index } => {
                format!("visible {} #{}", kind.as_str(), index + 1)
            }
        }
    }

    /// Pick the one control this spec refers to.
    pub fn resolve(&self, controls: &[Control]) -> Result<usize, ResolveError> {
        match self {
            FieldSpec::Label(re) => {
                let mut hits = controls
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| re.is_match(&c.name))
                    .map(|(i, _)| i);
                let first = hits
                    .next()
                    .ok_or_else(|| ResolveError::NotFound(self.describe()))?;
                let extra = hits.count();
                if extra > 0 {
                    return Err(ResolveError::Ambiguous {
                        target: self.describe(),
                        count: extra + 1,
                    });
                }
                Ok(first)
            }
            FieldSpec::Button(re) => controls
                .iter()
                .position(|c| re.is_match(&c.name))
                .ok_or_else(|| ResolveError::NotFound(self.describe())),
            FieldSpec::Positional { index, .. } => {
                if *index < controls.len() {
                    Ok(*index)
                } else {
                    Err(ResolveError::NotFound(self.describe()))
                }
            }
        }
    }
}

/// How an option's visible text must relate to the wanted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionMatch {
    pub text: String,
    pub exact: bool,
}

impl OptionMatch {
    /// Whole-text, case-insensitive match.
    pub fn exact(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exact: true,
        }
    }

    /// Case-insensitive containment.
    pub fn containing(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exact: false,
        }
    }

    /// Exact specs are anchored to the whole option text, others match
    /// anywhere in it. Both ignore case and surrounding whitespace.
    pub fn matches(&self, option_text: &str) -> bool {
        let wanted = self.text.trim().to_lowercase();
        let candidate = option_text.trim().to_lowercase();
        if self.exact {
            candidate == wanted
        } else {
            candidate.contains(&wanted)
        }
    }

    /// Resolve against a select's options.
    ///
    /// Exact matches must be unique; containment takes the first hit. The
    /// chosen entry must carry a value, otherwise it is a placeholder.
    pub fn resolve<'a>(&self, options: &'a [OptionEntry]) -> Result<&'a OptionEntry, ResolveError> {
        let hits: Vec<&OptionEntry> = options.iter().filter(|o| self.matches(&o.text)).collect();

        let chosen = match hits.as_slice() {
            [] => return Err(ResolveError::NotFound(self.text.clone())),
            [one] => *one,
            [first, ..] if !self.exact => *first,
            many => {
                return Err(ResolveError::Ambiguous {
                    target: self.text.clone(),
                    count: many.len(),
                });
            }
        };

        if chosen.value.trim().is_empty() {
            return Err(ResolveError::NoValue(chosen.text.clone()));
        }
        Ok(chosen)
    }
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("(?i){}", pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(entries: &[(&str, &str)]) -> Vec<OptionEntry> {
        entries
            .iter()
            .map(|(text, value)| OptionEntry::new(*text, *value))
            .collect()
    }

    #[test]
    fn exact_match_without_candidates_is_not_found() {
        let opts = options(&[("Seleccione", ""), ("Barcelona", "8"), ("Madrid Centro", "28")]);
        let err = OptionMatch::exact("Madrid").resolve(&opts).unwrap_err();
        assert_eq!(err, ResolveError::NotFound("Madrid".into()));
    }

    #[test]
    fn exact_match_with_two_equal_entries_is_ambiguous() {
        let opts = options(&[("MADRID", "1"), ("madrid", "2")]);
        let err = OptionMatch::exact("Madrid").resolve(&opts).unwrap_err();
        assert_eq!(
            err,
            ResolveError::Ambiguous {
                target: "Madrid".into(),
                count: 2
            }
        );
    }

    #[test]
    fn exact_match_ignores_case_but_not_extra_text() {
        let opts = options(&[("Madrid Centro", "1"), ("madrid", "2")]);
        let hit = OptionMatch::exact("Madrid").resolve(&opts).unwrap();
        assert_eq!(hit.value, "2");
    }

    #[test]
    fn substring_match_picks_containing_option() {
        let opts = options(&[("Madrid Centro", "mc"), ("Ávila", "av")]);
        let hit = OptionMatch::containing("Madrid").resolve(&opts).unwrap();
        assert_eq!(hit.text, "Madrid Centro");
    }

    #[test]
    fn substring_match_takes_first_of_many() {
        let opts = options(&[
            ("POLICIA-TOMA DE HUELLAS (EXPEDICIÓN DE TARJETA)", "4010"),
            ("POLICIA-TOMA DE HUELLAS Y RENOVACIÓN", "4036"),
        ]);
        let hit = OptionMatch::containing("toma de huellas").resolve(&opts).unwrap();
        assert_eq!(hit.value, "4010");
    }

    #[test]
    fn placeholder_without_value_is_rejected() {
        let opts = options(&[("Seleccione oficina", ""), ("CNP Madrid", "16")]);
        let err = OptionMatch::containing("seleccione").resolve(&opts).unwrap_err();
        assert_eq!(err, ResolveError::NoValue("Seleccione oficina".into()));
    }

    #[test]
    fn pattern_metacharacters_are_literal() {
        let opts = options(&[("C/ Ejemplo (1)", "1"), ("C/ Ejemplo 1", "2")]);
        let hit = OptionMatch::exact("c/ ejemplo (1)").resolve(&opts).unwrap();
        assert_eq!(hit.value, "1");
    }

    #[test]
    fn label_spec_requires_a_unique_match() {
        let inputs = vec![
            Control::named("Teléfono"),
            Control::named("Correo electrónico"),
            Control::named("Repite Correo electrónico"),
        ];
        let email = FieldSpec::label(r"^[^\p{L}]*correo electr[oó]nico").unwrap();
        assert_eq!(email.resolve(&inputs).unwrap(), 1);

        let loose = FieldSpec::label(r"correo electr[oó]nico$").unwrap();
        assert!(matches!(
            loose.resolve(&inputs),
            Err(ResolveError::Ambiguous { count: 2, .. })
        ));

        let missing = FieldSpec::label(r"N\.I\.E\.").unwrap();
        assert!(matches!(missing.resolve(&inputs), Err(ResolveError::NotFound(_))));
    }

    #[test]
    fn button_spec_takes_first_named_match() {
        let buttons = vec![
            Control::named("Volver"),
            Control::named("Aceptar"),
            Control::named("ACEPTAR y continuar"),
        ];
        let spec = FieldSpec::button(r"\bAceptar\b").unwrap();
        assert_eq!(spec.resolve(&buttons).unwrap(), 1);
        assert_eq!(spec.kind(), ControlKind::Button);
    }

    #[test]
    fn positional_spec_fails_past_the_end() {
        let selects = vec![Control::select(Vec::new())];
        assert_eq!(FieldSpec::nth_select(0).resolve(&selects).unwrap(), 0);
        let err = FieldSpec::nth_select(1).resolve(&selects).unwrap_err();
        assert_eq!(err, ResolveError::NotFound("visible select #2".into()));
    }

    #[test]
    fn populated_means_more_than_placeholder() {
        assert!(!Control::select(options(&[("Seleccione", "")])).is_populated());
        assert!(Control::select(options(&[("Seleccione", ""), ("Madrid", "28")])).is_populated());
    }
}
