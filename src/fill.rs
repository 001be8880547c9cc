//! Per-field fill state machine and post-fill verification tolerance.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{FieldStatus, FieldType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEvent {
    /// Value dispatched to the element.
    Dispatched,
    /// Dispatch itself failed (element gone, not interactable, ...).
    DispatchFailed,
    VerifyPassed,
    VerifyFailed,
    Skip,
}

impl FieldEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FieldEvent::Dispatched => "dispatched",
            FieldEvent::DispatchFailed => "dispatch_failed",
            FieldEvent::VerifyPassed => "verify_passed",
            FieldEvent::VerifyFailed => "verify_failed",
            FieldEvent::Skip => "skip",
        }
    }

    fn is_attempt(&self) -> bool {
        matches!(self, FieldEvent::Dispatched | FieldEvent::DispatchFailed)
    }
}

/// The transition table. `None` means the event is not allowed in `from`.
///
/// ```text
/// pending --dispatched--> filled --verify_passed--> verified
///    |                      |
///    |                 verify_failed
///    |                      v
///    +--dispatch_failed--> failed --dispatched--> filled   (while attempts remain)
/// pending --skip--> skipped
/// ```
pub fn next_status(from: FieldStatus, event: FieldEvent) -> Option<FieldStatus> {
    use FieldEvent::*;
    use FieldStatus::*;
    match (from, event) {
        (Pending | Failed, Dispatched) => Some(Filled),
        (Pending | Failed, DispatchFailed) => Some(Failed),
        (Filled, VerifyPassed) => Some(Verified),
        (Filled, VerifyFailed) => Some(Failed),
        (Pending, Skip) => Some(Skipped),
        _ => None,
    }
}

/// Tracks one field through the transition table, capping attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMachine {
    status: FieldStatus,
    attempts: u32,
    max_attempts: u32,
}

impl FieldMachine {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            status: FieldStatus::Pending,
            attempts: 0,
            max_attempts,
        }
    }

    pub fn status(&self) -> FieldStatus {
        self.status
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn can_attempt(&self) -> bool {
        matches!(self.status, FieldStatus::Pending | FieldStatus::Failed) && self.attempts < self.max_attempts
    }

    /// Verified, skipped, or failed with no attempts left.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            FieldStatus::Verified | FieldStatus::Skipped => true,
            FieldStatus::Failed => self.attempts >= self.max_attempts,
            FieldStatus::Pending | FieldStatus::Filled => false,
        }
    }

    pub fn apply(&mut self, event: FieldEvent) -> Result<FieldStatus> {
        let invalid = || Error::InvalidTransition {
            from: self.status,
            event: event.name(),
        };
        if event.is_attempt() && !self.can_attempt() {
            return Err(invalid());
        }
        let next = next_status(self.status, event).ok_or_else(invalid)?;
        if event.is_attempt() {
            self.attempts += 1;
        }
        self.status = next;
        Ok(next)
    }
}

// ── Verification ────────────────────────────────────────────────────

/// Minimum length for accepting a value cut short by `maxlength`.
const TRUNCATION_MIN_CHARS: usize = 5;
const PHONE_MIN_DIGITS: usize = 7;
const RECOGNIZED_OVERLAP: f64 = 0.7;

fn normalize_value(value: &str, case_sensitive: bool) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if case_sensitive {
        collapsed
    } else {
        collapsed.to_lowercase()
    }
}

fn digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Compare a DOM-observed value against the intended one: whitespace is
/// trimmed and collapsed, case is ignored for non-sensitive types, phone
/// numbers compare by digits, and maxlength truncation is accepted.
pub fn values_match(field_type: FieldType, observed: &str, intended: &str) -> bool {
    let observed = normalize_value(observed, field_type.is_case_sensitive());
    let intended = normalize_value(intended, field_type.is_case_sensitive());
    if observed.is_empty() {
        return intended.is_empty();
    }
    if observed == intended {
        return true;
    }
    if field_type == FieldType::Phone {
        let (od, id) = (digits(&observed), digits(&intended));
        if id.len() >= PHONE_MIN_DIGITS && (od.ends_with(&id) || (id.ends_with(&od) && od.len() >= PHONE_MIN_DIGITS)) {
            return true;
        }
    }
    observed.chars().count() >= TRUNCATION_MIN_CHARS && intended.starts_with(&observed)
}

/// Compare recognized text around a non-DOM input with the intended value.
pub fn recognized_text_matches(recognized: &str, intended: &str) -> bool {
    let recognized = normalize_value(recognized, false);
    let intended = normalize_value(intended, false);
    if recognized.is_empty() || intended.is_empty() {
        return false;
    }
    if recognized.contains(&intended) || intended.contains(&recognized) {
        return true;
    }
    let wanted: std::collections::HashSet<char> = intended.chars().filter(|c| !c.is_whitespace()).collect();
    let seen: std::collections::HashSet<char> = recognized.chars().filter(|c| !c.is_whitespace()).collect();
    if wanted.is_empty() {
        return false;
    }
    wanted.intersection(&seen).count() as f64 / wanted.len() as f64 >= RECOGNIZED_OVERLAP
}

// ── Select elements ─────────────────────────────────────────────────

/// One `<option>` of a select element.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

/// Option to pick for `wanted`. An exact label or value (ignoring case)
/// wins outright; otherwise the last option whose label or value contains
/// it.
pub fn choose_option(options: &[SelectOption], wanted: &str) -> Option<usize> {
    let wanted = normalize_value(wanted, false);
    if wanted.is_empty() {
        return None;
    }
    let mut partial = None;
    for (i, option) in options.iter().enumerate() {
        let label = normalize_value(&option.label, false);
        let value = normalize_value(&option.value, false);
        if label == wanted || value == wanted {
            return Some(i);
        }
        if label.contains(&wanted) || value.contains(&wanted) {
            partial = Some(i);
        }
    }
    partial
}

/// Whether the selected option's label stands for the intended value.
pub fn selection_matches(selected_label: &str, intended: &str) -> bool {
    let selected = normalize_value(selected_label, false);
    let intended = normalize_value(intended, false);
    !selected.is_empty() && !intended.is_empty() && (selected == intended || selected.contains(&intended))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut m = FieldMachine::new(3);
        assert_eq!(m.apply(FieldEvent::Dispatched).unwrap(), FieldStatus::Filled);
        assert_eq!(m.apply(FieldEvent::VerifyPassed).unwrap(), FieldStatus::Verified);
        assert!(m.is_terminal());
        assert_eq!(m.attempts(), 1);
    }

    #[test]
    fn attempts_are_capped_and_failure_is_permanent() {
        let mut m = FieldMachine::new(2);
        m.apply(FieldEvent::Dispatched).unwrap();
        m.apply(FieldEvent::VerifyFailed).unwrap();
        m.apply(FieldEvent::DispatchFailed).unwrap();
        assert_eq!(m.status(), FieldStatus::Failed);
        assert_eq!(m.attempts(), 2);
        assert!(m.is_terminal());
        assert!(!m.can_attempt());
        assert!(matches!(
            m.apply(FieldEvent::Dispatched),
            Err(Error::InvalidTransition { from: FieldStatus::Failed, .. })
        ));
        assert_eq!(m.attempts(), 2);
        assert_eq!(m.status(), FieldStatus::Failed);
    }

    #[test]
    fn verified_fields_cannot_be_refilled() {
        let mut m = FieldMachine::new(3);
        m.apply(FieldEvent::Dispatched).unwrap();
        m.apply(FieldEvent::VerifyPassed).unwrap();
        assert!(m.apply(FieldEvent::Dispatched).is_err());
        assert!(next_status(FieldStatus::Failed, FieldEvent::Skip).is_none());
    }

    #[test]
    fn tolerance_rules() {
        assert!(values_match(FieldType::Email, "  Ada@Example.com ", "ada@example.com"));
        assert!(!values_match(FieldType::Message, "hello world", "Hello world"));
        assert!(values_match(FieldType::Message, "Hello   world\n", "Hello world"));
        assert!(values_match(FieldType::Phone, "+1 (234) 567-8900", "234 567 8900"));
        assert!(values_match(FieldType::Message, "Hello, we would", "Hello, we would like a quote"));
        assert!(!values_match(FieldType::Name, "", "Ada"));
        assert!(!values_match(FieldType::Name, "Ad", "Ada"));
    }

    fn options(pairs: &[(&str, &str)]) -> Vec<SelectOption> {
        pairs
            .iter()
            .map(|(value, label)| SelectOption {
                value: value.to_string(),
                label: label.to_string(),
            })
            .collect()
    }

    #[test]
    fn select_prefers_exact_label_then_value_then_substring() {
        let opts = options(&[
            ("", "Choose a topic"),
            ("sales", "Talk to Sales"),
            ("support", "Technical Support"),
            ("general", "General inquiry"),
        ]);
        assert_eq!(choose_option(&opts, "technical support"), Some(2));
        assert_eq!(choose_option(&opts, "sales"), Some(1));
        assert_eq!(choose_option(&opts, "Inquiry"), Some(3));
        assert_eq!(choose_option(&opts, "billing"), None);
        assert_eq!(choose_option(&opts, "  "), None);
    }

    #[test]
    fn select_read_back_compares_labels() {
        assert!(selection_matches("General inquiry", "general inquiry"));
        assert!(selection_matches("Talk to Sales", "sales"));
        assert!(!selection_matches("Choose a topic", "sales"));
        assert!(!selection_matches("", "sales"));
    }

    #[test]
    fn recognized_text_tolerance() {
        assert!(recognized_text_matches("Email ada@example.com", "ada@example.com"));
        assert!(recognized_text_matches("ada@exampie.com", "ada@example.com"));
        assert!(!recognized_text_matches("", "ada@example.com"));
        assert!(!recognized_text_matches("zzz", "ada@example.com"));
    }
}
