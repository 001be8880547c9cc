//! Submit dispatch and the decision whether it worked.

use tracing::{debug, info, warn};

use crate::config::FillConfig;
use crate::driver::{FillTarget, PageDriver, SubmitSignal};
use crate::error::Result;
use crate::fill::{FieldEvent, FieldMachine};
use crate::model::{ClassifiedField, FieldStatus, FieldType};
use crate::ocr::{joined_text, OcrAdapter};

const SUCCESS_PATTERNS: &[(&str, u32)] = &[
    ("thank you", 3),
    ("thanks for contacting", 3),
    ("thanks for reaching out", 3),
    ("message sent", 3),
    ("message has been sent", 3),
    ("form submitted", 3),
    ("form has been submitted", 3),
    ("submission received", 3),
    ("we will be in touch", 3),
    ("we'll be in touch", 3),
    ("we will contact you", 3),
    ("successfully", 2),
    ("submitted", 1),
];

const FAILURE_PATTERNS: &[(&str, u32)] = &[
    ("this field is required", 3),
    ("one or more fields have an error", 4),
    ("required field", 2),
    ("please enter a valid", 2),
    ("invalid", 2),
    ("please check and try again", 3),
    ("something went wrong", 3),
    ("verification failed", 3),
    ("captcha", 4),
];

/// Weighted pattern hits over the page text after a submit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextScore {
    pub success: u32,
    pub failure: u32,
    pub success_matches: Vec<&'static str>,
    pub failure_matches: Vec<&'static str>,
}

impl TextScore {
    pub fn is_positive(&self) -> bool {
        self.success >= 3 && self.success > self.failure
    }

    pub fn is_rejection(&self) -> bool {
        self.failure >= 3 && self.failure >= self.success
    }
}

fn normalize_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
}

pub fn score_page_text(text: &str) -> TextScore {
    let haystack = normalize_text(text);
    let mut score = TextScore::default();
    for &(pattern, weight) in SUCCESS_PATTERNS {
        if haystack.contains(&format!(" {pattern} ")) {
            score.success += weight;
            score.success_matches.push(pattern);
        }
    }
    for &(pattern, weight) in FAILURE_PATTERNS {
        if haystack.contains(&format!(" {pattern} ")) {
            score.failure += weight;
            score.failure_matches.push(pattern);
        }
    }
    score
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Submit was never dispatched.
    NotAttempted(String),
    /// The click itself failed.
    DispatchFailed(String),
    /// A positive signal was observed; carries its description.
    Confirmed(String),
    /// The page answered with validation or error messages.
    Rejected(String),
    /// Dispatched, but nothing positive observed within the timeout.
    Unresolved,
}

impl SubmitOutcome {
    pub fn attempted(&self) -> bool {
        !matches!(self, SubmitOutcome::NotAttempted(_))
    }
}

fn describe(signal: &SubmitSignal) -> String {
    match signal {
        SubmitSignal::Navigation { .. } => "navigation".into(),
        SubmitSignal::SuccessText(_) => "success message".into(),
        SubmitSignal::DomChange { .. } => "form changed".into(),
    }
}

/// Click the submit-classified field and wait for a positive signal.
///
/// The submit field's status is updated in place: verified on a positive
/// signal, failed otherwise. Errors only on state machine misuse.
pub async fn submit(
    driver: &dyn PageDriver,
    ocr: &OcrAdapter<'_>,
    config: &FillConfig,
    fields: &mut [ClassifiedField],
    target_of: impl Fn(&ClassifiedField) -> FillTarget,
) -> Result<SubmitOutcome> {
    if !fields.iter().any(|f| f.status == FieldStatus::Verified) {
        let reason = if fields.iter().any(|f| f.field_type.is_fillable()) {
            "no field could be verified"
        } else {
            "no fillable fields found"
        };
        return Ok(SubmitOutcome::NotAttempted(reason.into()));
    }
    let Some(field) = fields.iter_mut().find(|f| f.field_type == FieldType::Submit) else {
        return Ok(SubmitOutcome::NotAttempted("submit button not found".into()));
    };

    let from_url = driver.current_url().await.unwrap_or_default();
    let fingerprint = match driver.form_fingerprint().await {
        Ok(fp) => Some(fp),
        Err(e) => {
            debug!(error = %e, "form fingerprint unavailable");
            None
        }
    };
    let mut signals = vec![
        SubmitSignal::Navigation { from_url },
        SubmitSignal::SuccessText(config.success_phrases.clone()),
    ];
    signals.extend(fingerprint.map(|fingerprint| SubmitSignal::DomChange { fingerprint }));

    let target = target_of(field);
    if field.candidate.offscreen {
        if let Err(e) = driver.scroll_into_view(&target).await {
            debug!(error = %e, "scroll to submit failed");
        }
    }

    let mut machine = FieldMachine::new(1);
    if let Err(e) = driver.click(&target).await {
        warn!(error = %e, "submit click failed");
        machine.apply(FieldEvent::DispatchFailed)?;
        record(field, &machine, Some(e.to_string()));
        return Ok(SubmitOutcome::DispatchFailed(e.to_string()));
    }
    machine.apply(FieldEvent::Dispatched)?;
    info!(candidate = %field.candidate.id, "submit dispatched");

    let observed = match driver.wait_for_signal(&signals, config.submit_timeout).await {
        Ok(signal) => signal,
        Err(e) => {
            warn!(error = %e, "waiting for submit signal failed");
            None
        }
    };

    let text_score = match post_submit_text(driver, ocr).await {
        Some(text) => score_page_text(&text),
        None => TextScore::default(),
    };
    debug!(
        success = text_score.success,
        failure = text_score.failure,
        "post-submit text score"
    );

    let outcome = if text_score.is_rejection() {
        SubmitOutcome::Rejected(text_score.failure_matches.join(", "))
    } else if let Some(signal) = &observed {
        SubmitOutcome::Confirmed(describe(signal))
    } else if text_score.is_positive() {
        SubmitOutcome::Confirmed(format!("success text: {}", text_score.success_matches.join(", ")))
    } else {
        SubmitOutcome::Unresolved
    };

    let event = match outcome {
        SubmitOutcome::Confirmed(_) => FieldEvent::VerifyPassed,
        _ => FieldEvent::VerifyFailed,
    };
    machine.apply(event)?;
    let note = match &outcome {
        SubmitOutcome::Confirmed(_) => None,
        SubmitOutcome::Rejected(m) => Some(format!("rejected: {m}")),
        _ => Some("no positive signal".into()),
    };
    record(field, &machine, note);
    Ok(outcome)
}

fn record(field: &mut ClassifiedField, machine: &FieldMachine, note: Option<String>) {
    field.status = machine.status();
    field.attempts = machine.attempts();
    field.last_error = note;
}

async fn post_submit_text(driver: &dyn PageDriver, ocr: &OcrAdapter<'_>) -> Option<String> {
    if !ocr.is_available() {
        return None;
    }
    let snapshot = match driver.snapshot().await {
        Ok(s) => s,
        Err(e) => {
            debug!(error = %e, "post-submit snapshot failed");
            return None;
        }
    };
    match ocr.recognize_full(&snapshot.screenshot).await {
        Ok(tokens) => Some(joined_text(&tokens)),
        Err(e) => {
            debug!(error = %e, "post-submit recognition failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::Error;
    use crate::model::{CandidateElement, CandidateSource, DomElement, PageSnapshot, Rect};

    /// Page whose only behaviours are the submit click and the signal wait.
    struct SubmitPage {
        click_fails: bool,
    }

    #[async_trait]
    impl PageDriver for SubmitPage {
        async fn navigate(&self, _url: &str) -> Result<()> {
            Ok(())
        }

        async fn snapshot(&self) -> Result<PageSnapshot> {
            Err(Error::ScreenshotError("not captured".into()))
        }

        async fn current_url(&self) -> Result<String> {
            Ok("https://acme.example/contact".into())
        }

        async fn form_fingerprint(&self) -> Result<String> {
            Ok("1|3|0|".into())
        }

        async fn scroll_into_view(&self, _target: &FillTarget) -> Result<()> {
            Ok(())
        }

        async fn set_value(&self, _target: &FillTarget, _value: &str) -> Result<()> {
            Ok(())
        }

        async fn read_value(&self, _target: &FillTarget) -> Result<Option<String>> {
            Ok(None)
        }

        async fn click(&self, _target: &FillTarget) -> Result<()> {
            if self.click_fails {
                Err(Error::ElementNotFound("#send detached".into()))
            } else {
                Ok(())
            }
        }

        async fn wait_for_signal(&self, signals: &[SubmitSignal], _timeout: Duration) -> Result<Option<SubmitSignal>> {
            Ok(signals.first().cloned())
        }
    }

    fn field(id: usize, field_type: FieldType, status: FieldStatus) -> ClassifiedField {
        let bounds = Rect::new(0.0, 40.0 * id as f64, 200.0, 30.0);
        let mut field = ClassifiedField::new(CandidateElement {
            id: format!("dom-{id}"),
            source: CandidateSource::Dom(DomElement {
                element_ref: format!("#f{id}"),
                tag: "input".into(),
                bounds,
                ..Default::default()
            }),
            page_box: bounds,
            pixel_box: bounds,
            offscreen: false,
            nearby_text: Vec::new(),
            raw_confidence: 1.0,
        });
        field.field_type = field_type;
        field.status = status;
        field
    }

    async fn run_submit(page: &SubmitPage, fields: &mut [ClassifiedField]) -> SubmitOutcome {
        let ocr = OcrAdapter::new(None, 0.6);
        submit(page, &ocr, &FillConfig::default(), fields, |f| {
            FillTarget::Element(f.candidate.id.clone())
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn observed_signal_verifies_the_button() {
        let mut fields = vec![
            field(0, FieldType::Email, FieldStatus::Verified),
            field(1, FieldType::Submit, FieldStatus::Pending),
        ];
        let outcome = run_submit(&SubmitPage { click_fails: false }, &mut fields).await;
        assert_eq!(outcome, SubmitOutcome::Confirmed("navigation".into()));
        assert_eq!(fields[1].status, FieldStatus::Verified);
        assert_eq!(fields[1].attempts, 1);
    }

    #[tokio::test]
    async fn failed_click_marks_the_button_failed() {
        let mut fields = vec![
            field(0, FieldType::Email, FieldStatus::Verified),
            field(1, FieldType::Submit, FieldStatus::Pending),
        ];
        let outcome = run_submit(&SubmitPage { click_fails: true }, &mut fields).await;
        assert!(matches!(outcome, SubmitOutcome::DispatchFailed(_)));
        assert!(outcome.attempted());
        assert_eq!(fields[1].status, FieldStatus::Failed);
        assert_eq!(fields[1].attempts, 1);
        assert!(fields[1].last_error.as_deref().is_some_and(|e| e.contains("detached")));
    }

    #[tokio::test]
    async fn nothing_verified_means_no_click() {
        let mut fields = vec![
            field(0, FieldType::Email, FieldStatus::Failed),
            field(1, FieldType::Submit, FieldStatus::Pending),
        ];
        let outcome = run_submit(&SubmitPage { click_fails: true }, &mut fields).await;
        assert_eq!(outcome, SubmitOutcome::NotAttempted("no field could be verified".into()));
        assert_eq!(fields[1].status, FieldStatus::Pending);
    }

    #[test]
    fn thank_you_page_is_positive() {
        let score = score_page_text("Thank you! Your message has been sent.");
        assert!(score.is_positive());
        assert!(!score.is_rejection());
        assert_eq!(score.success_matches, vec!["thank you", "message has been sent"]);
    }

    #[test]
    fn validation_errors_are_a_rejection() {
        let score = score_page_text("Email: this field is required. Phone: invalid number");
        assert!(score.is_rejection());
        assert!(!score.is_positive());
        assert_eq!(score.failure, 5);
    }

    #[test]
    fn patterns_match_whole_words_only() {
        let score = score_page_text("Resubmitted invalidation");
        assert_eq!(score, TextScore::default());
    }

    #[test]
    fn neutral_text_is_neither() {
        let score = score_page_text("Contact us. Name Email Message Send");
        assert!(!score.is_positive());
        assert!(!score.is_rejection());
    }
}
