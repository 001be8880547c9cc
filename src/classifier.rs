//! Semantic typing of candidates by fusing DOM attributes, nearby
//! recognized text and structural heuristics.
//!
//! Each scorer is a pure function producing weighted [`Evidence`]. Per
//! candidate, evidence for the same type is combined noisy-OR style; the
//! best type wins, with ties broken by [`Signal`] priority and then by
//! [`FieldType`] order. Captcha evidence overrides everything else.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::config::FillConfig;
use crate::model::{
    CandidateElement, CandidateSource, ClassifiedField, DomElement, FieldType, Rect, Signal, SkipReason,
    TextToken, VisionKind,
};
use crate::ocr::joined_text;

const WEIGHT_DOM: f64 = 0.95;
const WEIGHT_TEXT: f64 = 0.85;
const WEIGHT_STRUCTURAL: f64 = 0.8;
const WEIGHT_CAPTCHA: f64 = 1.0;

/// Slack, in pixels, for labels that touch or slightly overlap their input.
const EDGE_TOLERANCE: f64 = 4.0;

const VOCABULARY: &[(FieldType, &[&str])] = &[
    (
        FieldType::Name,
        &[
            "name", "full name", "fullname", "your name", "contact name", "customer name",
            "contact person", "first name", "firstname", "fname", "last name", "lastname", "lname",
        ],
    ),
    (
        FieldType::Email,
        &["email", "e mail", "mail", "email address", "emailaddress", "your email", "work email"],
    ),
    (
        FieldType::Phone,
        &[
            "phone", "telephone", "tel", "mobile", "cell", "phone number", "phonenumber",
            "contact number", "mobile number",
        ],
    ),
    (
        FieldType::Company,
        &[
            "company", "organization", "organisation", "business", "employer", "company name",
            "companyname", "business name", "organization name",
        ],
    ),
    (
        FieldType::Subject,
        &["subject", "topic", "regarding", "reason", "title", "inquiry type", "reason for contact"],
    ),
    (
        FieldType::Message,
        &[
            "message", "comment", "comments", "inquiry", "enquiry", "details", "description",
            "your message", "how can we help", "tell us more", "additional information",
        ],
    ),
];

const AUTOCOMPLETE: &[(&str, FieldType)] = &[
    ("name", FieldType::Name),
    ("given-name", FieldType::Name),
    ("family-name", FieldType::Name),
    ("email", FieldType::Email),
    ("tel", FieldType::Phone),
    ("tel-national", FieldType::Phone),
    ("organization", FieldType::Company),
];

const SUBMIT_WORDS: &[&str] = &[
    "send", "submit", "contact", "get in touch", "request quote", "send message", "contact us",
];

/// Substrings in DOM attributes that identify challenge widgets.
pub const CAPTCHA_ATTRIBUTE_MARKERS: &[&str] = &[
    "captcha", "recaptcha", "hcaptcha", "h-captcha", "g-recaptcha", "cf-turnstile", "turnstile",
];

/// Recognized phrases that identify challenge widgets.
pub const CAPTCHA_TEXT_MARKERS: &[&str] = &[
    "captcha",
    "i'm not a robot",
    "im not a robot",
    "not a robot",
    "security code",
    "verify you are human",
    "prove you are human",
    "anti-spam",
];

#[derive(Debug, Clone, Copy, PartialEq)]
struct Evidence {
    field_type: FieldType,
    signal: Signal,
    /// Weighted, in `[0, 1]`.
    score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Verdict {
    field_type: FieldType,
    confidence: f64,
    signal: Signal,
}

/// Classify candidates against recognized text tokens.
///
/// `known_types` limits which semantic types may be assigned (captcha is
/// always recognized). Output order follows input order; identical inputs
/// always produce identical assignments.
pub fn classify(
    candidates: Vec<CandidateElement>,
    tokens: &[TextToken],
    known_types: &[FieldType],
    config: &FillConfig,
) -> Vec<ClassifiedField> {
    let known: HashSet<FieldType> = known_types.iter().copied().collect();

    let mut fields: Vec<ClassifiedField> = Vec::with_capacity(candidates.len());
    let mut verdicts: Vec<Option<Verdict>> = Vec::with_capacity(candidates.len());
    let mut ranked: Vec<usize> = Vec::new();
    for (i, mut candidate) in candidates.into_iter().enumerate() {
        candidate.nearby_text = nearby_tokens(&candidate, tokens, config.text_proximity_px);
        let evidence: Vec<Evidence> = score_candidate(&candidate)
            .into_iter()
            .filter(|e| e.field_type == FieldType::Captcha || known.contains(&e.field_type))
            .filter(|e| admissible(&candidate, e.field_type))
            .collect();

        // The threshold applies to the evidence; the candidate's baseline
        // only scales the reported confidence used for ranking.
        let verdict = fuse(&evidence);
        let passes = verdict.is_some_and(|v| v.confidence >= config.min_classification_confidence);
        let verdict = verdict.map(|v| Verdict {
            confidence: v.confidence * candidate.raw_confidence,
            ..v
        });

        let mut field = ClassifiedField::new(candidate);
        if let Some(v) = verdict {
            field.confidence = v.confidence;
            field.signal = Some(v.signal);
        }
        if passes {
            ranked.push(i);
        } else if field.candidate.accepts_text() || field.candidate.is_button_like() {
            field.skip(SkipReason::LowConfidence);
        } else {
            field.skip(SkipReason::NotFillable);
        }
        verdicts.push(verdict);
        fields.push(field);
    }

    // One candidate per semantic type: highest confidence, then strongest
    // signal, then document order.
    ranked.sort_by(|&a, &b| {
        let (va, vb) = (verdicts[a].unwrap_or(NO_VERDICT), verdicts[b].unwrap_or(NO_VERDICT));
        vb.confidence
            .total_cmp(&va.confidence)
            .then(va.signal.cmp(&vb.signal))
            .then(a.cmp(&b))
    });
    let mut taken: HashSet<FieldType> = HashSet::new();
    for i in ranked {
        let Some(verdict) = verdicts[i] else { continue };
        if taken.insert(verdict.field_type) {
            fields[i].field_type = verdict.field_type;
        } else {
            fields[i].skip(SkipReason::Duplicate(verdict.field_type));
        }
    }

    debug!(
        assigned = taken.len(),
        total = fields.len(),
        "classified candidates"
    );
    fields
}

const NO_VERDICT: Verdict = Verdict {
    field_type: FieldType::Unknown,
    confidence: 0.0,
    signal: Signal::Structural,
};

/// True when every DOM-sourced field classified below `threshold`.
pub fn dom_confidence_low(fields: &[ClassifiedField], threshold: f64) -> bool {
    fields
        .iter()
        .filter(|f| f.candidate.dom().is_some())
        .all(|f| f.field_type == FieldType::Unknown || f.confidence < threshold)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Inside,
    Left,
    Above,
}

fn placement(b: &Rect, t: &TextToken, proximity: f64) -> Option<Placement> {
    let (cx, cy) = t.bbox.center();
    if cx >= b.x && cx <= b.right() && cy >= b.y && cy <= b.bottom() {
        return Some(Placement::Inside);
    }
    let gap_left = b.x - t.bbox.right();
    if (-EDGE_TOLERANCE..=proximity).contains(&gap_left) && cy >= b.y - b.height / 2.0 && cy <= b.bottom() {
        return Some(Placement::Left);
    }
    let gap_above = b.y - t.bbox.bottom();
    if (-EDGE_TOLERANCE..=proximity).contains(&gap_above)
        && t.bbox.x < b.right()
        && t.bbox.right() > b.x - proximity / 2.0
    {
        return Some(Placement::Above);
    }
    None
}

/// Label text for a candidate: tokens inside it, plus either the tokens on
/// its row to the left or, failing those, the single text line closest
/// above it. Lines further up belong to the field above and are ignored.
pub fn nearby_tokens(candidate: &CandidateElement, tokens: &[TextToken], proximity: f64) -> Vec<TextToken> {
    let b = &candidate.pixel_box;
    let placed: Vec<(&TextToken, Placement)> = tokens
        .iter()
        .filter_map(|t| placement(b, t, proximity).map(|p| (t, p)))
        .collect();

    let has_left = placed.iter().any(|(_, p)| *p == Placement::Left);
    let closest_above = placed
        .iter()
        .filter(|(_, p)| *p == Placement::Above)
        .map(|(t, _)| t.bbox)
        .max_by(|a, b| a.bottom().total_cmp(&b.bottom()));

    placed
        .into_iter()
        .filter(|(t, p)| match p {
            Placement::Inside | Placement::Left => true,
            Placement::Above => match closest_above {
                Some(line) if !has_left => {
                    let (_, cy) = t.bbox.center();
                    cy >= line.y && cy <= line.bottom()
                }
                _ => false,
            },
        })
        .map(|(t, _)| t.clone())
        .collect()
}

/// Button-like candidates can only submit (or be a challenge); fillable
/// types need a control that takes text.
fn admissible(candidate: &CandidateElement, field_type: FieldType) -> bool {
    match field_type {
        FieldType::Captcha => true,
        FieldType::Submit => candidate.is_button_like(),
        FieldType::Unknown => false,
        _ => candidate.accepts_text(),
    }
}

fn score_candidate(candidate: &CandidateElement) -> Vec<Evidence> {
    const SCORERS: [fn(&CandidateElement) -> Vec<Evidence>; 4] =
        [captcha_signal, dom_attribute_signal, nearby_text_signal, structural_signal];
    SCORERS.iter().flat_map(|scorer| scorer(candidate)).collect()
}

fn fuse(evidence: &[Evidence]) -> Option<Verdict> {
    let captcha = evidence
        .iter()
        .filter(|e| e.signal == Signal::Captcha)
        .map(|e| e.score)
        .max_by(f64::total_cmp);
    if let Some(score) = captcha {
        return Some(Verdict {
            field_type: FieldType::Captcha,
            confidence: score,
            signal: Signal::Captcha,
        });
    }

    // BTreeMap keeps iteration in FieldType order for the final tie-break.
    let mut by_type: BTreeMap<FieldType, (f64, Evidence)> = BTreeMap::new();
    for e in evidence {
        let entry = by_type.entry(e.field_type).or_insert((1.0, *e));
        entry.0 *= 1.0 - e.score;
        let best = &mut entry.1;
        if e.score > best.score || (e.score == best.score && e.signal < best.signal) {
            *best = *e;
        }
    }

    by_type
        .into_iter()
        .map(|(field_type, (miss, primary))| Verdict {
            field_type,
            confidence: 1.0 - miss,
            signal: primary.signal,
        })
        .reduce(|best, v| {
            let better = v.confidence > best.confidence
                || (v.confidence == best.confidence && v.signal < best.signal);
            if better {
                v
            } else {
                best
            }
        })
}

// ── Scorers ─────────────────────────────────────────────────────────

fn captcha_signal(candidate: &CandidateElement) -> Vec<Evidence> {
    let hit = |score: f64| {
        vec![Evidence {
            field_type: FieldType::Captcha,
            signal: Signal::Captcha,
            score: WEIGHT_CAPTCHA * score,
        }]
    };
    match &candidate.source {
        CandidateSource::Dom(el) if dom_has_captcha_marker(el) => return hit(1.0),
        CandidateSource::Vision(VisionKind::ChallengeWidget) => return hit(0.9),
        _ => {}
    }
    let text = joined_text(&candidate.nearby_text).to_lowercase();
    if CAPTCHA_TEXT_MARKERS.iter().any(|m| text.contains(m)) {
        return hit(mean_confidence(&candidate.nearby_text));
    }
    Vec::new()
}

pub(crate) fn dom_has_captcha_marker(el: &DomElement) -> bool {
    [&el.name, &el.id, &el.class, &el.src, &el.aria_label, &el.placeholder, &el.label_text]
        .iter()
        .filter_map(|v| v.as_deref())
        .map(str::to_lowercase)
        .any(|v| CAPTCHA_ATTRIBUTE_MARKERS.iter().any(|m| v.contains(m)))
}

fn dom_attribute_signal(candidate: &CandidateElement) -> Vec<Evidence> {
    let Some(el) = candidate.dom() else {
        return Vec::new();
    };
    let mut evidence = Vec::new();

    if let Some(auto) = el.autocomplete.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
        let token = auto.split_whitespace().last().unwrap_or("");
        if let Some((_, t)) = AUTOCOMPLETE.iter().find(|(k, _)| *k == token) {
            evidence.push(Evidence {
                field_type: *t,
                signal: Signal::DomAttribute,
                score: WEIGHT_DOM,
            });
        }
    }

    let blob = [&el.name, &el.id, &el.placeholder, &el.aria_label, &el.label_text]
        .iter()
        .filter_map(|v| v.as_deref())
        .map(normalize)
        .collect::<Vec<_>>()
        .join(" ");
    for (field_type, score) in vocabulary_matches(&blob) {
        evidence.push(Evidence {
            field_type,
            signal: Signal::DomAttribute,
            score: WEIGHT_DOM * score,
        });
    }
    evidence
}

fn nearby_text_signal(candidate: &CandidateElement) -> Vec<Evidence> {
    if candidate.nearby_text.is_empty() {
        return Vec::new();
    }
    let text = normalize(&joined_text(&candidate.nearby_text));
    let confidence = mean_confidence(&candidate.nearby_text);
    vocabulary_matches(&text)
        .into_iter()
        .map(|(field_type, score)| Evidence {
            field_type,
            signal: Signal::NearbyText,
            score: WEIGHT_TEXT * score * confidence,
        })
        .collect()
}

fn structural_signal(candidate: &CandidateElement) -> Vec<Evidence> {
    let structural = |field_type: FieldType, score: f64| {
        vec![Evidence {
            field_type,
            signal: Signal::Structural,
            score: WEIGHT_STRUCTURAL * score,
        }]
    };
    match &candidate.source {
        CandidateSource::Dom(el) => {
            if el.is_button_like() {
                let label = [&el.text, &el.aria_label, &el.name, &el.id]
                    .iter()
                    .filter_map(|v| v.as_deref())
                    .map(normalize)
                    .collect::<Vec<_>>()
                    .join(" ");
                if has_submit_word(&label) {
                    return structural(FieldType::Submit, 1.0);
                }
                if el.input_type() == "submit" {
                    return structural(FieldType::Submit, 0.9);
                }
                return Vec::new();
            }
            match (el.tag().as_str(), el.input_type().as_str()) {
                ("input", "email") => structural(FieldType::Email, 1.0),
                ("input", "tel") => structural(FieldType::Phone, 1.0),
                ("textarea", _) if el.is_unlabelled() => structural(FieldType::Message, 0.7),
                _ => Vec::new(),
            }
        }
        CandidateSource::Vision(VisionKind::Textarea) => structural(FieldType::Message, 0.6),
        CandidateSource::Vision(VisionKind::Button) => {
            let label = normalize(&joined_text(&candidate.nearby_text));
            if has_submit_word(&label) {
                structural(FieldType::Submit, 0.9)
            } else {
                Vec::new()
            }
        }
        CandidateSource::Vision(_) => Vec::new(),
    }
}

// ── Text helpers ────────────────────────────────────────────────────

/// Lowercase, split camelCase and replace punctuation with spaces.
fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    let mut prev_lower = false;
    for c in raw.chars() {
        if c.is_uppercase() && prev_lower {
            out.push(' ');
        }
        prev_lower = c.is_lowercase();
        if c.is_alphanumeric() || c == '\'' {
            out.extend(c.to_lowercase());
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn contains_phrase(text: &str, phrase: &str) -> bool {
    format!(" {text} ").contains(&format!(" {phrase} "))
}

/// Best phrase score per field type; longer phrases are more specific.
fn vocabulary_matches(text: &str) -> Vec<(FieldType, f64)> {
    if text.is_empty() {
        return Vec::new();
    }
    VOCABULARY
        .iter()
        .filter_map(|(field_type, phrases)| {
            phrases
                .iter()
                .filter(|p| contains_phrase(text, p))
                .map(|p| (0.85 + 0.05 * p.split(' ').count() as f64).min(1.0))
                .max_by(f64::total_cmp)
                .map(|score| (*field_type, score))
        })
        .collect()
}

fn has_submit_word(text: &str) -> bool {
    SUBMIT_WORDS.iter().any(|w| contains_phrase(text, w))
}

fn mean_confidence(tokens: &[TextToken]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    tokens.iter().map(|t| t.confidence).sum::<f64>() / tokens.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldStatus;

    const ALL: &[FieldType] = &[
        FieldType::Name,
        FieldType::Email,
        FieldType::Phone,
        FieldType::Company,
        FieldType::Subject,
        FieldType::Message,
        FieldType::Submit,
    ];

    fn dom(id: usize, el: DomElement, pixel_box: Rect) -> CandidateElement {
        CandidateElement {
            id: format!("dom-{id}"),
            source: CandidateSource::Dom(el),
            page_box: pixel_box,
            pixel_box,
            offscreen: false,
            nearby_text: Vec::new(),
            raw_confidence: 1.0,
        }
    }

    fn el(tag: &str, input_type: Option<&str>, name: Option<&str>) -> DomElement {
        DomElement {
            element_ref: format!("{tag}-{}", name.unwrap_or("anon")),
            tag: tag.into(),
            input_type: input_type.map(Into::into),
            name: name.map(Into::into),
            ..Default::default()
        }
    }

    fn token(text: &str, bbox: Rect, confidence: f64) -> TextToken {
        TextToken {
            text: text.into(),
            bbox,
            confidence,
        }
    }

    #[test]
    fn email_input_with_label_is_email() {
        let input = dom(0, el("input", Some("email"), None), Rect::new(100.0, 100.0, 300.0, 30.0));
        let label = token("Email Address", Rect::new(100.0, 76.0, 120.0, 16.0), 0.9);
        let fields = classify(vec![input], &[label], ALL, &FillConfig::default());
        assert_eq!(fields[0].field_type, FieldType::Email);
        assert!(fields[0].confidence > 0.9);
        assert_eq!(fields[0].candidate.nearby_text.len(), 1);
    }

    #[test]
    fn unlabelled_textarea_uses_text_above() {
        let textarea = dom(0, el("textarea", None, None), Rect::new(100.0, 200.0, 400.0, 120.0));
        let label = token("Your message", Rect::new(100.0, 176.0, 110.0, 16.0), 0.75);
        let fields = classify(vec![textarea], &[label], ALL, &FillConfig::default());
        assert_eq!(fields[0].field_type, FieldType::Message);
        assert_eq!(fields[0].signal, Some(Signal::NearbyText));
    }

    #[test]
    fn captcha_overrides_other_signals() {
        let mut input = el("input", Some("text"), Some("email"));
        input.class = Some("g-recaptcha-response".into());
        let fields = classify(
            vec![dom(0, input, Rect::new(0.0, 0.0, 100.0, 20.0))],
            &[],
            ALL,
            &FillConfig::default(),
        );
        assert_eq!(fields[0].field_type, FieldType::Captcha);
        assert_eq!(fields[0].signal, Some(Signal::Captcha));
    }

    #[test]
    fn each_type_goes_to_one_candidate() {
        let a = dom(0, el("input", Some("text"), Some("email")), Rect::new(0.0, 0.0, 200.0, 30.0));
        let b = dom(1, el("input", Some("email"), Some("email")), Rect::new(0.0, 100.0, 200.0, 30.0));
        let fields = classify(vec![a, b], &[], ALL, &FillConfig::default());
        assert_eq!(fields[1].field_type, FieldType::Email);
        assert_eq!(fields[0].field_type, FieldType::Unknown);
        assert_eq!(fields[0].status, FieldStatus::Skipped);
        assert_eq!(fields[0].skip_reason, Some(SkipReason::Duplicate(FieldType::Email)));
    }

    #[test]
    fn classification_is_deterministic() {
        let build = || {
            vec![
                dom(0, el("input", Some("text"), Some("name")), Rect::new(0.0, 0.0, 200.0, 30.0)),
                dom(1, el("input", Some("text"), Some("your_name")), Rect::new(0.0, 50.0, 200.0, 30.0)),
                dom(2, el("textarea", None, Some("comments")), Rect::new(0.0, 100.0, 200.0, 90.0)),
                dom(3, el("button", Some("submit"), None), Rect::new(0.0, 200.0, 80.0, 30.0)),
            ]
        };
        let first: Vec<_> = classify(build(), &[], ALL, &FillConfig::default())
            .iter()
            .map(|f| (f.field_type, f.status))
            .collect();
        for _ in 0..5 {
            let again: Vec<_> = classify(build(), &[], ALL, &FillConfig::default())
                .iter()
                .map(|f| (f.field_type, f.status))
                .collect();
            assert_eq!(first, again);
        }
        assert_eq!(first[0].0, FieldType::Unknown);
        assert_eq!(first[1].0, FieldType::Name);
        assert_eq!(first[2].0, FieldType::Message);
        assert_eq!(first[3].0, FieldType::Submit);
    }

    #[test]
    fn button_text_never_becomes_a_fillable_type() {
        let mut button = el("button", None, None);
        button.text = Some("Send message".into());
        let fields = classify(
            vec![dom(0, button, Rect::new(0.0, 0.0, 120.0, 36.0))],
            &[],
            ALL,
            &FillConfig::default(),
        );
        assert_eq!(fields[0].field_type, FieldType::Submit);
    }

    #[test]
    fn company_name_prefers_the_longer_phrase() {
        let input = dom(0, el("input", Some("text"), Some("company_name")), Rect::new(0.0, 0.0, 200.0, 30.0));
        let fields = classify(vec![input], &[], ALL, &FillConfig::default());
        assert_eq!(fields[0].field_type, FieldType::Company);
    }

    #[test]
    fn weak_evidence_is_unknown() {
        let input = dom(0, el("input", Some("text"), Some("q7")), Rect::new(0.0, 0.0, 200.0, 30.0));
        let fields = classify(vec![input], &[], ALL, &FillConfig::default());
        assert_eq!(fields[0].field_type, FieldType::Unknown);
        assert_eq!(fields[0].skip_reason, Some(SkipReason::LowConfidence));
    }

    #[test]
    fn vision_candidates_classify_but_lose_to_dom() {
        let vision = CandidateElement {
            id: "vision-0".into(),
            source: CandidateSource::Vision(VisionKind::Input),
            page_box: Rect::new(100.0, 300.0, 300.0, 30.0),
            pixel_box: Rect::new(100.0, 300.0, 300.0, 30.0),
            offscreen: false,
            nearby_text: Vec::new(),
            raw_confidence: 0.6,
        };
        let label = token("Email", Rect::new(100.0, 276.0, 50.0, 16.0), 0.9);

        let alone = classify(vec![vision.clone()], &[label.clone()], ALL, &FillConfig::default());
        assert_eq!(alone[0].field_type, FieldType::Email);
        assert!(alone[0].confidence < 0.5);

        let input = dom(0, el("input", Some("email"), Some("email")), Rect::new(100.0, 100.0, 300.0, 30.0));
        let both = classify(vec![input, vision], &[label], ALL, &FillConfig::default());
        assert_eq!(both[0].field_type, FieldType::Email);
        assert_eq!(both[1].skip_reason, Some(SkipReason::Duplicate(FieldType::Email)));
    }

    #[test]
    fn stacked_fields_read_only_their_own_label() {
        let name = dom(0, el("input", Some("text"), None), Rect::new(100.0, 100.0, 300.0, 30.0));
        let email = dom(1, el("input", Some("text"), None), Rect::new(100.0, 160.0, 300.0, 30.0));
        let tokens = [
            token("Full Name", Rect::new(100.0, 80.0, 80.0, 16.0), 0.9),
            token("Email", Rect::new(100.0, 140.0, 50.0, 16.0), 0.9),
        ];
        let fields = classify(vec![name, email], &tokens, ALL, &FillConfig::default());

        assert_eq!(fields[0].field_type, FieldType::Name);
        assert_eq!(fields[1].field_type, FieldType::Email);
        assert_eq!(fields[1].status, FieldStatus::Pending);
        let label: Vec<&str> = fields[1].candidate.nearby_text.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(label, ["Email"]);
    }

    #[test]
    fn left_label_wins_over_the_row_above() {
        let phone = dom(0, el("input", Some("text"), None), Rect::new(200.0, 160.0, 300.0, 30.0));
        let tokens = [
            token("Company", Rect::new(100.0, 110.0, 80.0, 16.0), 0.9),
            token("Phone", Rect::new(120.0, 167.0, 60.0, 16.0), 0.9),
        ];
        let fields = classify(vec![phone], &tokens, ALL, &FillConfig::default());
        assert_eq!(fields[0].field_type, FieldType::Phone);
        assert_eq!(fields[0].candidate.nearby_text.len(), 1);
    }

    #[test]
    fn checkbox_is_never_a_fillable_type() {
        let mut consent = el("input", Some("checkbox"), Some("phone_consent"));
        consent.label_text = Some("I agree to be contacted by phone".into());
        let label = token("I agree to be contacted by phone", Rect::new(30.0, 2.0, 240.0, 16.0), 0.9);
        let fields = classify(
            vec![dom(0, consent, Rect::new(0.0, 0.0, 20.0, 20.0))],
            &[label],
            ALL,
            &FillConfig::default(),
        );
        assert_eq!(fields[0].field_type, FieldType::Unknown);
        assert_eq!(fields[0].status, FieldStatus::Skipped);
        assert_eq!(fields[0].skip_reason, Some(SkipReason::NotFillable));
    }

    #[test]
    fn normalize_splits_camel_case_and_punctuation() {
        assert_eq!(normalize("contactEmail"), "contact email");
        assert_eq!(normalize("your-e_mail"), "your e mail");
    }
}
