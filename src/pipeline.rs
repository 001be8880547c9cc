//! One page, start to finish: navigate, detect, classify, gate, fill,
//! verify, submit, aggregate.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::captcha;
use crate::classifier::{classify, dom_confidence_low};
use crate::config::{FillConfig, UnresolvedSubmitPolicy};
use crate::dom_mapper::{self, pixel_to_client};
use crate::driver::{FillTarget, PageDriver};
use crate::error::{Error, Result};
use crate::fill::{recognized_text_matches, selection_matches, values_match, FieldEvent, FieldMachine};
use crate::model::{
    CandidateSource, ClassifiedField, DomElement, FieldStatus, FieldType, PageSnapshot, PageStatus, SkipReason,
    SubmissionResult, TextToken, Viewport,
};
use crate::ocr::{joined_text, OcrAdapter, TextRecognizer};
use crate::profile::ProfileData;
use crate::submit::{self, SubmitOutcome};
use crate::vision::{self, RegionDetector};

/// Margin around a vision box when reading back what was typed.
const VERIFY_MARGIN_PX: f64 = 6.0;

/// Borrowed collaborators for one page run. Cheap to build per page.
pub struct PagePipeline<'a> {
    config: &'a FillConfig,
    profile: &'a ProfileData,
    detector: &'a dyn RegionDetector,
    recognizer: Option<&'a dyn TextRecognizer>,
}

impl<'a> PagePipeline<'a> {
    pub fn new(config: &'a FillConfig, profile: &'a ProfileData, detector: &'a dyn RegionDetector) -> Self {
        Self {
            config,
            profile,
            detector,
            recognizer: None,
        }
    }

    pub fn with_recognizer(mut self, recognizer: Option<&'a dyn TextRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    fn ocr(&self) -> OcrAdapter<'a> {
        OcrAdapter::new(self.recognizer, self.config.ocr_min_confidence)
    }

    /// Always yields exactly one result; faults become `PageStatus::Error`.
    pub async fn run(&self, driver: &dyn PageDriver, url: &str) -> SubmissionResult {
        let started = Utc::now();
        let span = info_span!("page", url = %url);
        async {
            let result = match self.process(driver, url, started).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "page pipeline fault");
                    SubmissionResult::error(url, format!("pipeline fault: {e}"), started)
                }
            };
            info!(status = %result.status, reason = %result.reason, "page finished");
            result
        }
        .instrument(span)
        .await
    }

    async fn process(&self, driver: &dyn PageDriver, url: &str, started: DateTime<Utc>) -> Result<SubmissionResult> {
        if let Err(e) = self.navigate(driver, url).await {
            return Ok(SubmissionResult::error(url, format!("navigation failed: {e}"), started));
        }

        let snapshot = driver.snapshot().await?;
        let ocr = self.ocr();
        let tokens = match ocr.recognize_full(&snapshot.screenshot).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "text recognition unavailable, classifying from DOM only");
                Vec::new()
            }
        };

        let mut fields = self.detect_fields(&snapshot, &tokens);

        let verdict = captcha::detect(&fields, &snapshot.elements);
        if verdict.blocked {
            info!(evidence = verdict.evidence.as_deref().unwrap_or(""), "captcha gate closed");
            return Ok(captcha_blocked(url, started, &mut fields, verdict.reason));
        }

        self.assign_values(&mut fields);
        let mut viewport = snapshot.viewport;
        self.fill_all(driver, &ocr, &mut fields, &mut viewport).await;

        if let Some(reason) = self.fill_revealed(driver, &ocr, &mut fields, &mut viewport).await {
            return Ok(captcha_blocked(url, started, &mut fields, reason));
        }

        let target_viewport = viewport;
        let outcome = submit::submit(driver, &ocr, self.config, &mut fields, |f| {
            target_for(f, target_viewport.as_ref())
        })
        .await?;
        Ok(self.aggregate(url, started, &fields, outcome))
    }

    async fn navigate(&self, driver: &dyn PageDriver, url: &str) -> Result<()> {
        let attempts = self.config.navigation_retries.saturating_add(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match driver.navigate(url).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, error = %e, "navigation failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_backoff).await;
                    }
                }
            }
        }
        let last = last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string());
        Err(Error::NavigationError(format!("{attempts} attempt(s): {last}")))
    }

    /// Map, classify, and run the vision fallback at most once.
    fn detect_fields(&self, snapshot: &PageSnapshot, tokens: &[TextToken]) -> Vec<ClassifiedField> {
        let config = self.config;
        let known = self.known_types();

        let elements = dom_mapper::scope_to_form(&snapshot.elements, snapshot.primary_form.as_deref());
        let dom = match dom_mapper::map_candidates(
            &elements,
            snapshot.viewport.as_ref(),
            snapshot.screenshot_size(),
            config,
        ) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "coordinate transform failed, using vision only");
                Vec::new()
            }
        };

        let run_vision = |dom| {
            let found = vision::detect(
                self.detector,
                &snapshot.screenshot,
                snapshot.viewport.as_ref(),
                config.vision_baseline_confidence,
            );
            vision::merge(dom, found, config.vision_overlap)
        };

        if dom.len() < config.min_dom_candidates {
            debug!(dom = dom.len(), "too few DOM candidates, running vision fallback");
            return classify(run_vision(dom), tokens, &known, config);
        }

        let fields = classify(dom.clone(), tokens, &known, config);
        if dom_confidence_low(&fields, config.vision_trigger_confidence) {
            debug!("DOM classification confidence low, running vision fallback");
            return classify(run_vision(dom), tokens, &known, config);
        }
        fields
    }

    /// Every fillable type, with or without a profile value. Types the
    /// profile lacks are skipped at value assignment.
    fn known_types(&self) -> Vec<FieldType> {
        let mut known = FieldType::FILLABLE.to_vec();
        known.extend([FieldType::Submit, FieldType::Captcha]);
        known
    }

    fn assign_values(&self, fields: &mut [ClassifiedField]) {
        for field in fields.iter_mut().filter(|f| f.status == FieldStatus::Pending) {
            match field.field_type {
                FieldType::Submit => {}
                t if t.is_fillable() => match self.profile.get(t) {
                    Some(value) => field.value = Some(value.to_string()),
                    None => field.skip(SkipReason::NoProfileValue),
                },
                _ => field.skip(SkipReason::NotFillable),
            }
        }
    }

    /// Fill top to bottom. One field's failure never stops the others.
    async fn fill_all(
        &self,
        driver: &dyn PageDriver,
        ocr: &OcrAdapter<'_>,
        fields: &mut [ClassifiedField],
        viewport: &mut Option<Viewport>,
    ) {
        let mut order: Vec<usize> = (0..fields.len())
            .filter(|&i| fields[i].status == FieldStatus::Pending && fields[i].value.is_some())
            .collect();
        order.sort_by(|&a, &b| {
            let (pa, pb) = (&fields[a].candidate.page_box, &fields[b].candidate.page_box);
            pa.y.total_cmp(&pb.y).then(pa.x.total_cmp(&pb.x)).then(a.cmp(&b))
        });

        for i in order {
            let field = &mut fields[i];
            if let Err(e) = self.fill_field(driver, ocr, field, viewport).await {
                warn!(field = %field.field_type, error = %e, "fill aborted");
                field.status = FieldStatus::Failed;
                field.last_error = Some(e.to_string());
            }
            debug!(
                field = %field.field_type,
                status = ?field.status,
                attempts = field.attempts,
                "field done"
            );
        }
    }

    async fn fill_field(
        &self,
        driver: &dyn PageDriver,
        ocr: &OcrAdapter<'_>,
        field: &mut ClassifiedField,
        viewport: &mut Option<Viewport>,
    ) -> Result<()> {
        let Some(value) = field.value.clone() else {
            return Ok(());
        };
        let mut machine = FieldMachine::new(self.config.max_fill_attempts);

        while machine.can_attempt() {
            if machine.attempts() > 0 {
                tokio::time::sleep(self.config.retry_backoff).await;
                self.refresh(driver, field, viewport).await;
            }
            if field.candidate.offscreen {
                let target = target_for(field, viewport.as_ref());
                if let Err(e) = driver.scroll_into_view(&target).await {
                    debug!(error = %e, "scroll into view failed");
                }
                self.refresh(driver, field, viewport).await;
            }

            let target = target_for(field, viewport.as_ref());
            debug!(field = %field.field_type, attempt = machine.attempts() + 1, "filling");
            if let Err(e) = driver.set_value(&target, &value).await {
                machine.apply(FieldEvent::DispatchFailed)?;
                field.last_error = Some(e.to_string());
                continue;
            }
            machine.apply(FieldEvent::Dispatched)?;

            match self.verify(driver, ocr, field, &target, &value).await {
                Ok(true) => {
                    machine.apply(FieldEvent::VerifyPassed)?;
                    field.last_error = None;
                }
                Ok(false) => {
                    machine.apply(FieldEvent::VerifyFailed)?;
                    field.last_error = Some("verification mismatch".into());
                }
                Err(e) => {
                    machine.apply(FieldEvent::VerifyFailed)?;
                    field.last_error = Some(e.to_string());
                }
            }
        }

        field.attempts = machine.attempts();
        field.status = machine.status();
        Ok(())
    }

    /// Pick up DOM fields that only appeared after the first fill pass (a
    /// follow-up question, a field revealed by a select) and fill them too.
    /// Types already assigned stay with their first candidate. Returns the
    /// block reason when a challenge widget appeared.
    async fn fill_revealed(
        &self,
        driver: &dyn PageDriver,
        ocr: &OcrAdapter<'_>,
        fields: &mut Vec<ClassifiedField>,
        viewport: &mut Option<Viewport>,
    ) -> Option<String> {
        if !fields.iter().any(|f| f.attempts > 0) {
            return None;
        }
        let snapshot = match driver.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(error = %e, "rescan snapshot failed");
                return None;
            }
        };
        let seen: HashSet<String> = fields
            .iter()
            .filter_map(|f| f.candidate.dom())
            .map(|el| el.element_ref.clone())
            .collect();
        let fresh: Vec<DomElement> = dom_mapper::scope_to_form(&snapshot.elements, snapshot.primary_form.as_deref())
            .into_iter()
            .filter(|el| !seen.contains(&el.element_ref))
            .collect();
        if fresh.is_empty() {
            return None;
        }
        let mut candidates = match dom_mapper::map_candidates(
            &fresh,
            snapshot.viewport.as_ref(),
            snapshot.screenshot_size(),
            self.config,
        ) {
            Ok(candidates) if !candidates.is_empty() => candidates,
            Ok(_) => return None,
            Err(e) => {
                debug!(error = %e, "revealed fields could not be mapped");
                return None;
            }
        };
        for (k, candidate) in candidates.iter_mut().enumerate() {
            candidate.id = format!("dom-{}", fields.len() + k);
        }

        let tokens = ocr.recognize_full(&snapshot.screenshot).await.unwrap_or_default();
        let taken: HashSet<FieldType> = fields
            .iter()
            .map(|f| f.field_type)
            .filter(|t| *t != FieldType::Unknown)
            .collect();
        let known: Vec<FieldType> = self.known_types().into_iter().filter(|t| !taken.contains(t)).collect();
        let mut revealed = classify(candidates, &tokens, &known, self.config);
        info!(count = revealed.len(), "fields revealed after filling");

        let verdict = captcha::detect(&revealed, &fresh);
        if verdict.blocked {
            info!(evidence = verdict.evidence.as_deref().unwrap_or(""), "captcha revealed after filling");
            fields.append(&mut revealed);
            return Some(verdict.reason);
        }

        self.assign_values(&mut revealed);
        *viewport = snapshot.viewport;
        self.fill_all(driver, ocr, &mut revealed, viewport).await;
        fields.append(&mut revealed);
        None
    }

    /// Take a fresh snapshot and re-resolve the candidate's coordinates.
    async fn refresh(&self, driver: &dyn PageDriver, field: &mut ClassifiedField, viewport: &mut Option<Viewport>) {
        match driver.snapshot().await {
            Ok(snapshot) => {
                if !dom_mapper::relocate(&mut field.candidate, &snapshot) {
                    debug!(candidate = %field.candidate.id, "candidate could not be re-resolved");
                }
                *viewport = snapshot.viewport;
            }
            Err(e) => debug!(error = %e, "refresh snapshot failed"),
        }
    }

    async fn verify(
        &self,
        driver: &dyn PageDriver,
        ocr: &OcrAdapter<'_>,
        field: &ClassifiedField,
        target: &FillTarget,
        intended: &str,
    ) -> Result<bool> {
        if let Some(observed) = driver.read_value(target).await? {
            let is_select = field.candidate.dom().is_some_and(DomElement::is_select);
            return Ok(if is_select {
                selection_matches(&observed, intended)
            } else {
                values_match(field.field_type, &observed, intended)
            });
        }
        if !ocr.is_available() {
            return Err(Error::RecognitionUnavailable(
                "no readable value and no recognizer to verify with".into(),
            ));
        }
        let snapshot = driver.snapshot().await?;
        let mut candidate = field.candidate.clone();
        dom_mapper::relocate(&mut candidate, &snapshot);
        let tokens = ocr
            .recognize_near(&snapshot.screenshot, &candidate.pixel_box, VERIFY_MARGIN_PX)
            .await?;
        Ok(recognized_text_matches(&joined_text(&tokens), intended))
    }

    fn aggregate(
        &self,
        url: &str,
        started: DateTime<Utc>,
        fields: &[ClassifiedField],
        outcome: SubmitOutcome,
    ) -> SubmissionResult {
        let missing: Vec<&str> = self
            .config
            .required_fields
            .iter()
            .filter(|&&t| {
                !fields
                    .iter()
                    .any(|f| f.field_type == t && f.status == FieldStatus::Verified)
            })
            .map(FieldType::as_str)
            .collect();
        let missing_note = || format!("required fields unverified: {}", missing.join(", "));

        let attempted = outcome.attempted();
        let (status, reason) = match outcome {
            SubmitOutcome::NotAttempted(reason) => (PageStatus::Failed, reason),
            SubmitOutcome::DispatchFailed(e) => (PageStatus::Failed, format!("submit dispatch failed: {e}")),
            SubmitOutcome::Rejected(matches) => (PageStatus::Failed, format!("submission rejected: {matches}")),
            SubmitOutcome::Confirmed(signal) if missing.is_empty() => {
                (PageStatus::Success, format!("submitted ({signal})"))
            }
            SubmitOutcome::Confirmed(_) => (PageStatus::Partial, missing_note()),
            SubmitOutcome::Unresolved => {
                let status = match self.config.unresolved_submit {
                    UnresolvedSubmitPolicy::Partial => PageStatus::Partial,
                    UnresolvedSubmitPolicy::Failed => PageStatus::Failed,
                };
                let reason = if missing.is_empty() {
                    "submit unverified".to_string()
                } else {
                    format!("submit unverified; {}", missing_note())
                };
                (status, reason)
            }
        };

        let mut result = SubmissionResult::new(url, status, reason, started).with_fields(fields);
        result.submit_attempted = attempted;
        result
    }
}

fn captcha_blocked(
    url: &str,
    started: DateTime<Utc>,
    fields: &mut [ClassifiedField],
    reason: String,
) -> SubmissionResult {
    for field in fields.iter_mut().filter(|f| f.status == FieldStatus::Pending) {
        field.skip(SkipReason::CaptchaBlocked);
    }
    let mut result = SubmissionResult::new(url, PageStatus::CaptchaBlocked, reason, started).with_fields(fields);
    result.captcha_detected = true;
    result
}

/// Element ref for DOM candidates, a client-space point for vision ones.
fn target_for(field: &ClassifiedField, viewport: Option<&Viewport>) -> FillTarget {
    match &field.candidate.source {
        CandidateSource::Dom(el) => FillTarget::Element(el.element_ref.clone()),
        CandidateSource::Vision(_) => {
            let (x, y) = match viewport {
                Some(vp) => pixel_to_client(&field.candidate.pixel_box, vp),
                None => field.candidate.pixel_box.center(),
            };
            FillTarget::Point { x, y }
        }
    }
}
