use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

// ── Geometry ────────────────────────────────────────────────────────

/// Axis-aligned box. Used both for page (CSS document) coordinates and
/// for screenshot pixel coordinates; which one is meant depends on the field.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    pub fn intersection_area(&self, other: &Rect) -> f64 {
        let w = self.right().min(other.right()) - self.x.max(other.x);
        let h = self.bottom().min(other.bottom()) - self.y.max(other.y);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    /// Intersection over union.
    pub fn iou(&self, other: &Rect) -> f64 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Intersection relative to the smaller of the two boxes. A box nested
    /// inside another scores 1.0 regardless of the outer box's size.
    pub fn overlap_ratio(&self, other: &Rect) -> f64 {
        let smaller = self.area().min(other.area());
        if smaller <= 0.0 {
            0.0
        } else {
            self.intersection_area(other) / smaller
        }
    }

    /// True when the box lies entirely inside `[0, width] x [0, height]`.
    pub fn within(&self, width: f64, height: f64) -> bool {
        self.x >= 0.0 && self.y >= 0.0 && self.right() <= width && self.bottom() <= height
    }

    pub fn clamp_to(&self, width: f64, height: f64) -> Rect {
        let x1 = self.x.clamp(0.0, width);
        let y1 = self.y.clamp(0.0, height);
        let x2 = self.right().clamp(0.0, width);
        let y2 = self.bottom().clamp(0.0, height);
        Rect::new(x1, y1, x2 - x1, y2 - y1)
    }
}

// ── Snapshot ────────────────────────────────────────────────────────

/// Viewport metadata captured alongside a screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    /// CSS width of the visible viewport.
    pub width: f64,
    /// CSS height of the visible viewport.
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub device_pixel_ratio: f64,
    #[serde(default = "default_zoom")]
    pub zoom: f64,
}

fn default_zoom() -> f64 {
    1.0
}

impl Viewport {
    /// CSS pixel to screenshot pixel factor.
    pub fn scale(&self) -> f64 {
        self.device_pixel_ratio * self.zoom
    }
}

/// One element as harvested from the live DOM. `bounds` is in page
/// (document) coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DomElement {
    /// Handle understood by the driver (a CSS selector for the chromium driver).
    pub element_ref: String,
    pub tag: String,
    pub input_type: Option<String>,
    pub name: Option<String>,
    pub id: Option<String>,
    pub placeholder: Option<String>,
    pub aria_label: Option<String>,
    pub autocomplete: Option<String>,
    pub class: Option<String>,
    pub role: Option<String>,
    pub label_text: Option<String>,
    /// Visible text, or the value of button-like inputs.
    pub text: Option<String>,
    pub src: Option<String>,
    pub content_editable: bool,
    /// Ref of the enclosing `<form>`, if any.
    pub form: Option<String>,
    pub bounds: Rect,
}

impl DomElement {
    pub fn tag(&self) -> String {
        self.tag.to_ascii_lowercase()
    }

    pub fn input_type(&self) -> String {
        self.input_type.as_deref().unwrap_or("").to_ascii_lowercase()
    }

    pub fn role(&self) -> String {
        self.role.as_deref().unwrap_or("").to_ascii_lowercase()
    }

    pub fn is_button_like(&self) -> bool {
        let tag = self.tag();
        tag == "button"
            || (tag == "input" && matches!(self.input_type().as_str(), "submit" | "button" | "image"))
            || self.role() == "button"
    }

    /// Inputs, textareas, selects, buttons, editable regions and elements
    /// carrying a form-control role.
    pub fn is_form_relevant(&self) -> bool {
        match self.tag().as_str() {
            "input" => !matches!(self.input_type().as_str(), "hidden" | "reset"),
            "textarea" | "select" | "button" => true,
            _ => {
                self.content_editable
                    || matches!(
                        self.role().as_str(),
                        "textbox" | "button" | "combobox" | "searchbox" | "form"
                    )
            }
        }
    }

    /// Controls a typed value can land in. Checkboxes, radios, file
    /// pickers and buttons are form-relevant but never take text.
    pub fn accepts_text(&self) -> bool {
        match self.tag().as_str() {
            "input" => !matches!(
                self.input_type().as_str(),
                "checkbox" | "radio" | "file" | "range" | "color" | "hidden" | "reset" | "submit" | "button" | "image"
            ),
            "textarea" | "select" => true,
            _ => self.content_editable || matches!(self.role().as_str(), "textbox" | "combobox" | "searchbox"),
        }
    }

    pub fn is_select(&self) -> bool {
        self.tag() == "select"
    }

    /// Preference when collapsing nested elements: native controls first.
    pub fn control_rank(&self) -> u8 {
        match self.tag().as_str() {
            "input" | "textarea" | "select" => 3,
            "button" => 2,
            _ if self.content_editable => 1,
            _ => 0,
        }
    }

    /// True when the element carries no textual hint at all.
    pub fn is_unlabelled(&self) -> bool {
        [
            &self.label_text,
            &self.placeholder,
            &self.aria_label,
            &self.name,
            &self.id,
        ]
        .iter()
        .all(|v| v.as_deref().map_or(true, |s| s.trim().is_empty()))
    }
}

/// Immutable capture of a rendered page. Recaptured after fills that may
/// mutate the page.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub url: String,
    pub screenshot: Arc<RgbaImage>,
    pub elements: Vec<DomElement>,
    pub viewport: Option<Viewport>,
    /// Ref of the form most likely to be the contact form (largest visible).
    pub primary_form: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl PageSnapshot {
    pub fn screenshot_size(&self) -> (f64, f64) {
        (self.screenshot.width() as f64, self.screenshot.height() as f64)
    }
}

// ── Recognized text ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextToken {
    pub text: String,
    /// Pixel coordinates within the full screenshot.
    pub bbox: Rect,
    /// In `[0, 1]`.
    pub confidence: f64,
}

// ── Candidates ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisionKind {
    Input,
    Textarea,
    Button,
    ChallengeWidget,
}

/// Where a candidate came from. DOM candidates keep their attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateSource {
    Dom(DomElement),
    Vision(VisionKind),
}

impl CandidateSource {
    pub fn label(&self) -> &'static str {
        match self {
            CandidateSource::Dom(_) => "dom",
            CandidateSource::Vision(_) => "vision",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateElement {
    pub id: String,
    pub source: CandidateSource,
    pub page_box: Rect,
    pub pixel_box: Rect,
    /// Set when the transformed box is not fully inside the screenshot.
    pub offscreen: bool,
    pub nearby_text: Vec<TextToken>,
    pub raw_confidence: f64,
}

impl CandidateElement {
    pub fn dom(&self) -> Option<&DomElement> {
        match &self.source {
            CandidateSource::Dom(el) => Some(el),
            CandidateSource::Vision(_) => None,
        }
    }

    pub fn vision_kind(&self) -> Option<VisionKind> {
        match self.source {
            CandidateSource::Vision(kind) => Some(kind),
            CandidateSource::Dom(_) => None,
        }
    }

    pub fn is_button_like(&self) -> bool {
        match &self.source {
            CandidateSource::Dom(el) => el.is_button_like(),
            CandidateSource::Vision(kind) => *kind == VisionKind::Button,
        }
    }

    pub fn accepts_text(&self) -> bool {
        match &self.source {
            CandidateSource::Dom(el) => el.accepts_text(),
            CandidateSource::Vision(kind) => matches!(kind, VisionKind::Input | VisionKind::Textarea),
        }
    }
}

// ── Classification ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Name,
    Email,
    Phone,
    Company,
    Subject,
    Message,
    Submit,
    Captcha,
    Unknown,
}

impl FieldType {
    pub const FILLABLE: [FieldType; 6] = [
        FieldType::Name,
        FieldType::Email,
        FieldType::Phone,
        FieldType::Company,
        FieldType::Subject,
        FieldType::Message,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Name => "name",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Company => "company",
            FieldType::Subject => "subject",
            FieldType::Message => "message",
            FieldType::Submit => "submit",
            FieldType::Captcha => "captcha",
            FieldType::Unknown => "unknown",
        }
    }

    pub fn is_fillable(&self) -> bool {
        Self::FILLABLE.contains(self)
    }

    /// Free text whose casing is part of the content.
    pub fn is_case_sensitive(&self) -> bool {
        matches!(self, FieldType::Subject | FieldType::Message)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evidence kinds, declared in priority order: lower sorts first and wins ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Captcha,
    DomAttribute,
    NearbyText,
    Structural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    Pending,
    Filled,
    Verified,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "type")]
pub enum SkipReason {
    /// Another candidate won this type.
    Duplicate(FieldType),
    LowConfidence,
    NoProfileValue,
    NotFillable,
    CaptchaBlocked,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Duplicate(t) => write!(f, "duplicate {t}"),
            SkipReason::LowConfidence => f.write_str("low confidence"),
            SkipReason::NoProfileValue => f.write_str("no profile value"),
            SkipReason::NotFillable => f.write_str("not fillable"),
            SkipReason::CaptchaBlocked => f.write_str("captcha blocked"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifiedField {
    pub candidate: CandidateElement,
    pub field_type: FieldType,
    pub confidence: f64,
    /// Strongest signal behind the assignment.
    pub signal: Option<Signal>,
    pub value: Option<String>,
    pub attempts: u32,
    pub status: FieldStatus,
    pub skip_reason: Option<SkipReason>,
    pub last_error: Option<String>,
}

impl ClassifiedField {
    pub fn new(candidate: CandidateElement) -> Self {
        Self {
            candidate,
            field_type: FieldType::Unknown,
            confidence: 0.0,
            signal: None,
            value: None,
            attempts: 0,
            status: FieldStatus::Pending,
            skip_reason: None,
            last_error: None,
        }
    }

    pub fn skip(&mut self, reason: SkipReason) {
        self.status = FieldStatus::Skipped;
        self.skip_reason = Some(reason);
    }

    pub fn outcome(&self) -> FieldOutcome {
        let reason = match (&self.skip_reason, &self.last_error) {
            (Some(skip), _) => Some(skip.to_string()),
            (None, Some(err)) => Some(err.clone()),
            (None, None) => None,
        };
        FieldOutcome {
            candidate_id: self.candidate.id.clone(),
            source: self.candidate.source.label().to_string(),
            field_type: self.field_type,
            status: self.status,
            confidence: self.confidence,
            attempts: self.attempts,
            reason,
        }
    }
}

// ── Results ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Success,
    Partial,
    CaptchaBlocked,
    Failed,
    Error,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Success => "success",
            PageStatus::Partial => "partial",
            PageStatus::CaptchaBlocked => "captcha_blocked",
            PageStatus::Failed => "failed",
            PageStatus::Error => "error",
        }
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOutcome {
    pub candidate_id: String,
    pub source: String,
    pub field_type: FieldType,
    pub status: FieldStatus,
    pub confidence: f64,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Per-page outcome; the only value that outlives a page pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub url: String,
    pub status: PageStatus,
    pub reason: String,
    pub fields: Vec<FieldOutcome>,
    pub captcha_detected: bool,
    pub submit_attempted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl SubmissionResult {
    pub fn new(
        url: impl Into<String>,
        status: PageStatus,
        reason: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            url: url.into(),
            status,
            reason: reason.into(),
            fields: Vec::new(),
            captcha_detected: false,
            submit_attempted: false,
            started_at,
            finished_at,
            duration_ms,
        }
    }

    pub fn error(url: impl Into<String>, reason: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self::new(url, PageStatus::Error, reason, started_at)
    }

    pub fn with_fields(mut self, fields: &[ClassifiedField]) -> Self {
        self.fields = fields.iter().map(ClassifiedField::outcome).collect();
        self
    }

    pub fn fields_filled(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| f.status == FieldStatus::Verified)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_ratio_of_nested_box_is_one() {
        let outer = Rect::new(0.0, 0.0, 200.0, 100.0);
        let inner = Rect::new(10.0, 10.0, 50.0, 20.0);
        assert!((outer.overlap_ratio(&inner) - 1.0).abs() < 1e-9);
        assert!(outer.iou(&inner) < 0.1);
    }

    #[test]
    fn clamp_keeps_box_inside_bounds() {
        let r = Rect::new(-10.0, 90.0, 50.0, 30.0).clamp_to(100.0, 100.0);
        assert_eq!(r, Rect::new(0.0, 90.0, 40.0, 10.0));
        assert!(r.within(100.0, 100.0));
    }

    #[test]
    fn hidden_inputs_are_not_form_relevant() {
        let el = DomElement {
            tag: "INPUT".into(),
            input_type: Some("hidden".into()),
            ..Default::default()
        };
        assert!(!el.is_form_relevant());
        let button = DomElement {
            tag: "div".into(),
            role: Some("button".into()),
            ..Default::default()
        };
        assert!(button.is_form_relevant());
        assert!(button.is_button_like());
    }

    #[test]
    fn only_text_controls_accept_text() {
        let input = |t: &str| DomElement {
            tag: "input".into(),
            input_type: Some(t.into()),
            ..Default::default()
        };
        for t in ["checkbox", "radio", "file"] {
            assert!(input(t).is_form_relevant(), "{t}");
            assert!(!input(t).accepts_text(), "{t}");
        }
        for t in ["text", "email", "tel"] {
            assert!(input(t).accepts_text(), "{t}");
        }
        let select = DomElement {
            tag: "SELECT".into(),
            ..Default::default()
        };
        assert!(select.accepts_text());
        assert!(select.is_select());
    }
}
