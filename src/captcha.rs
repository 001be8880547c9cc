//! Captcha gate. Once a page is blocked nothing else on it is touched.

use crate::classifier::{dom_has_captcha_marker, CAPTCHA_ATTRIBUTE_MARKERS};
use crate::model::{ClassifiedField, DomElement, FieldType};

pub const CAPTCHA_REASON: &str = "captcha detected";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaVerdict {
    pub blocked: bool,
    pub reason: String,
    /// What tripped the gate, for logs.
    pub evidence: Option<String>,
}

impl CaptchaVerdict {
    fn clear() -> Self {
        Self {
            blocked: false,
            reason: "no captcha".into(),
            evidence: None,
        }
    }

    fn blocked(evidence: String) -> Self {
        Self {
            blocked: true,
            reason: CAPTCHA_REASON.into(),
            evidence: Some(evidence),
        }
    }
}

/// Pure predicate over the classified fields and the raw DOM element list.
pub fn detect(fields: &[ClassifiedField], elements: &[DomElement]) -> CaptchaVerdict {
    if let Some(field) = fields.iter().find(|f| f.field_type == FieldType::Captcha) {
        return CaptchaVerdict::blocked(format!("candidate {} classified as captcha", field.candidate.id));
    }
    if let Some(el) = elements.iter().find(|el| is_challenge_signature(el)) {
        let what = el.src.as_deref().or(el.class.as_deref()).unwrap_or(el.tag.as_str());
        return CaptchaVerdict::blocked(format!("challenge widget signature <{}> {}", el.tag(), what));
    }
    CaptchaVerdict::clear()
}

/// Known challenge widgets: reCAPTCHA / hCaptcha / Turnstile frames, their
/// container classes, response fields and captcha images.
fn is_challenge_signature(el: &DomElement) -> bool {
    let src = el.src.as_deref().unwrap_or("").to_lowercase();
    match el.tag().as_str() {
        "iframe" => {
            CAPTCHA_ATTRIBUTE_MARKERS.iter().any(|m| src.contains(m))
                || src.contains("challenges.cloudflare.com")
        }
        "img" => src.contains("captcha"),
        _ => dom_has_captcha_marker(el),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recaptcha_iframe_blocks() {
        let elements = vec![DomElement {
            tag: "iframe".into(),
            src: Some("https://www.google.com/recaptcha/api2/anchor?k=abc".into()),
            ..Default::default()
        }];
        let verdict = detect(&[], &elements);
        assert!(verdict.blocked);
        assert_eq!(verdict.reason, "captcha detected");
    }

    #[test]
    fn turnstile_container_blocks() {
        let elements = vec![DomElement {
            tag: "div".into(),
            class: Some("cf-turnstile".into()),
            ..Default::default()
        }];
        assert!(detect(&[], &elements).blocked);
    }

    #[test]
    fn ordinary_form_passes() {
        let elements = vec![
            DomElement {
                tag: "iframe".into(),
                src: Some("https://maps.example.com/embed".into()),
                ..Default::default()
            },
            DomElement {
                tag: "input".into(),
                name: Some("email".into()),
                ..Default::default()
            },
        ];
        let verdict = detect(&[], &elements);
        assert!(!verdict.blocked);
        assert!(verdict.evidence.is_none());
    }
}
