//! Turns the harvested DOM element list into candidates positioned in
//! screenshot pixel space.

use tracing::{debug, warn};

use crate::config::FillConfig;
use crate::error::{Error, Result};
use crate::model::{CandidateElement, CandidateSource, DomElement, PageSnapshot, Rect, Viewport};

/// Coordinates beyond this are treated as garbage from the page.
const MAX_PIXEL_EXTENT: f64 = 1_000_000.0;

/// DOM-sourced candidates start fully trusted; the classifier decides.
const DOM_BASELINE_CONFIDENCE: f64 = 1.0;

/// `pixel = (page - scroll) * devicePixelRatio * zoom`
pub fn page_to_pixel(page: &Rect, viewport: &Viewport) -> Rect {
    let scale = viewport.scale();
    Rect::new(
        (page.x - viewport.scroll_x) * scale,
        (page.y - viewport.scroll_y) * scale,
        page.width * scale,
        page.height * scale,
    )
}

pub fn pixel_to_page(pixel: &Rect, viewport: &Viewport) -> Rect {
    let scale = viewport.scale();
    Rect::new(
        pixel.x / scale + viewport.scroll_x,
        pixel.y / scale + viewport.scroll_y,
        pixel.width / scale,
        pixel.height / scale,
    )
}

/// Center of a pixel box in CSS viewport (client) coordinates, which is
/// what point-based input dispatch expects.
pub fn pixel_to_client(pixel: &Rect, viewport: &Viewport) -> (f64, f64) {
    let scale = viewport.scale();
    let (cx, cy) = pixel.center();
    (cx / scale, cy / scale)
}

pub fn validate_viewport(viewport: Option<&Viewport>) -> Result<&Viewport> {
    let viewport = viewport
        .ok_or_else(|| Error::CoordinateTransform("viewport metadata missing".into()))?;
    let scale_ok = |v: f64| v.is_finite() && v > 0.0;
    if !scale_ok(viewport.device_pixel_ratio) || !scale_ok(viewport.zoom) {
        return Err(Error::CoordinateTransform(format!(
            "invalid scale: devicePixelRatio={} zoom={}",
            viewport.device_pixel_ratio, viewport.zoom
        )));
    }
    if !viewport.scroll_x.is_finite() || !viewport.scroll_y.is_finite() {
        return Err(Error::CoordinateTransform("non-finite scroll offset".into()));
    }
    Ok(viewport)
}

fn out_of_range(pixel: &Rect) -> bool {
    !pixel.is_finite()
        || pixel.width < 0.0
        || pixel.height < 0.0
        || pixel.x.abs() > MAX_PIXEL_EXTENT
        || pixel.y.abs() > MAX_PIXEL_EXTENT
}

/// Zero-sized but otherwise sane boxes; non-finite ones are left for the
/// range check so they count against the transform.
fn has_zero_area(el: &DomElement) -> bool {
    el.bounds.is_finite() && el.bounds.area() <= 0.0
}

/// Drop elements that belong to a form other than `primary`. Elements
/// outside any form are kept. With no primary form, nothing is dropped.
pub fn scope_to_form(elements: &[DomElement], primary: Option<&str>) -> Vec<DomElement> {
    let Some(primary) = primary else {
        return elements.to_vec();
    };
    let scoped: Vec<DomElement> = elements
        .iter()
        .filter(|el| el.form.as_deref().map_or(true, |f| f == primary))
        .cloned()
        .collect();
    if scoped.len() < elements.len() {
        debug!(kept = scoped.len(), total = elements.len(), form = primary, "scoped to primary form");
    }
    scoped
}

/// Map form-relevant DOM elements to candidates. Zero-area elements are
/// dropped; the harvest has already skipped hidden ones.
///
/// An empty result is not an error; it tells the caller to try the vision
/// fallback. Boxes outside the screenshot are kept with `offscreen` set and
/// a pixel box clamped to the screenshot bounds.
pub fn map_candidates(
    elements: &[DomElement],
    viewport: Option<&Viewport>,
    screenshot_size: (f64, f64),
    config: &FillConfig,
) -> Result<Vec<CandidateElement>> {
    let relevant: Vec<(usize, &DomElement)> = elements
        .iter()
        .enumerate()
        .filter(|(_, el)| el.is_form_relevant() && !has_zero_area(el))
        .collect();
    if relevant.is_empty() {
        return Ok(Vec::new());
    }

    let viewport = validate_viewport(viewport)?;
    let (shot_w, shot_h) = screenshot_size;

    let mut rejected = 0usize;
    let mut mapped = Vec::with_capacity(relevant.len());
    for (index, el) in &relevant {
        let pixel = page_to_pixel(&el.bounds, viewport);
        if out_of_range(&pixel) {
            rejected += 1;
            continue;
        }
        let offscreen = !pixel.within(shot_w, shot_h);
        mapped.push((
            *index,
            CandidateElement {
                id: format!("dom-{index}"),
                source: CandidateSource::Dom((*el).clone()),
                page_box: el.bounds,
                pixel_box: pixel.clamp_to(shot_w, shot_h),
                offscreen,
                nearby_text: Vec::new(),
                raw_confidence: DOM_BASELINE_CONFIDENCE,
            },
        ));
    }

    let fraction = rejected as f64 / relevant.len() as f64;
    if rejected > 0 && fraction > config.max_out_of_range_fraction {
        return Err(Error::CoordinateTransform(format!(
            "{rejected} of {} elements transformed out of range",
            relevant.len()
        )));
    }
    if rejected > 0 {
        warn!(rejected, "dropped out-of-range DOM elements");
    }

    let candidates = collapse_nested(mapped, config.nesting_overlap);
    debug!(count = candidates.len(), "mapped DOM candidates");
    Ok(candidates)
}

/// Re-resolve a candidate against a fresh snapshot after scrolling or a
/// layout change. DOM candidates are looked up by element ref; vision
/// candidates keep their page position. Returns false when the element is
/// gone or the new geometry cannot be mapped.
pub fn relocate(candidate: &mut CandidateElement, snapshot: &PageSnapshot) -> bool {
    let Ok(viewport) = validate_viewport(snapshot.viewport.as_ref()) else {
        return false;
    };
    let (shot_w, shot_h) = snapshot.screenshot_size();
    let page_box = match &candidate.source {
        CandidateSource::Dom(el) => {
            match snapshot.elements.iter().find(|e| e.element_ref == el.element_ref) {
                Some(fresh) => fresh.bounds,
                None => return false,
            }
        }
        CandidateSource::Vision(_) => candidate.page_box,
    };
    let pixel = page_to_pixel(&page_box, viewport);
    if out_of_range(&pixel) {
        return false;
    }
    candidate.page_box = page_box;
    candidate.offscreen = !pixel.within(shot_w, shot_h);
    candidate.pixel_box = pixel.clamp_to(shot_w, shot_h);
    true
}

/// Collapse overlapping elements (a role=textbox wrapper around an input,
/// a button wrapping another button) into one, preferring the native
/// interactive leaf. Output keeps document order.
fn collapse_nested(mapped: Vec<(usize, CandidateElement)>, threshold: f64) -> Vec<CandidateElement> {
    let rank = |c: &CandidateElement| c.dom().map_or(0, DomElement::control_rank);

    let mut order: Vec<usize> = (0..mapped.len()).collect();
    order.sort_by(|&a, &b| {
        let (ia, ca) = &mapped[a];
        let (ib, cb) = &mapped[b];
        rank(cb)
            .cmp(&rank(ca))
            .then(ca.page_box.area().total_cmp(&cb.page_box.area()))
            .then(ia.cmp(ib))
    });

    let mut kept: Vec<usize> = Vec::new();
    for i in order {
        let page_box = mapped[i].1.page_box;
        let collapses = kept
            .iter()
            .any(|&k| mapped[k].1.page_box.overlap_ratio(&page_box) > threshold);
        if !collapses {
            kept.push(i);
        }
    }
    kept.sort_by_key(|&i| mapped[i].0);

    let mut slots: Vec<Option<CandidateElement>> = mapped.into_iter().map(|(_, c)| Some(c)).collect();
    kept.into_iter().filter_map(|i| slots[i].take()).collect()
}
