//! Pixel-level fallback for pages whose DOM gives too little to work with
//! (canvas-rendered forms, cross-origin frames, coordinate failures).

use image::{GrayImage, RgbaImage};
use tracing::debug;

use crate::dom_mapper::pixel_to_page;
use crate::model::{CandidateElement, CandidateSource, Rect, Viewport, VisionKind};

/// Vision-detection capability: locate input-, button- and challenge-like
/// regions directly from pixels.
pub trait RegionDetector: Send + Sync {
    fn detect_regions(&self, screenshot: &RgbaImage) -> Vec<(Rect, VisionKind)>;
}

/// Wrap detected regions as vision candidates carrying `baseline_confidence`.
/// Candidates are ordered top-to-bottom, left-to-right.
pub fn detect(
    detector: &dyn RegionDetector,
    screenshot: &RgbaImage,
    viewport: Option<&Viewport>,
    baseline_confidence: f64,
) -> Vec<CandidateElement> {
    let mut regions = detector.detect_regions(screenshot);
    regions.sort_by(|(a, _), (b, _)| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));
    debug!(count = regions.len(), "vision candidates");
    regions
        .into_iter()
        .enumerate()
        .map(|(i, (rect, kind))| CandidateElement {
            id: format!("vision-{i}"),
            source: CandidateSource::Vision(kind),
            page_box: viewport.map_or(rect, |vp| pixel_to_page(&rect, vp)),
            pixel_box: rect,
            offscreen: false,
            nearby_text: Vec::new(),
            raw_confidence: baseline_confidence,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct EdgeDetectorConfig {
    pub min_width: u32,
    pub min_height: u32,
    pub min_area: u32,
    /// Luma difference between neighbours that counts as an edge.
    pub edge_threshold: u8,
    pub dedupe_iou: f64,
}

impl Default for EdgeDetectorConfig {
    fn default() -> Self {
        Self {
            min_width: 40,
            min_height: 18,
            min_area: 900,
            edge_threshold: 40,
            dedupe_iou: 0.45,
        }
    }
}

/// Bounding box of one 8-connected run of edge pixels.
#[derive(Debug, Clone, Copy)]
struct Component {
    rect: Rect,
    pixels: usize,
}

/// Finds outlined rectangles: edge map, connected components, size and
/// shape filters, then non-maximum suppression.
#[derive(Debug, Clone, Default)]
pub struct EdgeDetector {
    config: EdgeDetectorConfig,
}

impl EdgeDetector {
    pub fn new(config: EdgeDetectorConfig) -> Self {
        Self { config }
    }

    fn passes_size(&self, rect: &Rect) -> bool {
        rect.width >= self.config.min_width as f64
            && rect.height >= self.config.min_height as f64
            && rect.area() >= self.config.min_area as f64
    }
}

impl RegionDetector for EdgeDetector {
    fn detect_regions(&self, screenshot: &RgbaImage) -> Vec<(Rect, VisionKind)> {
        let gray = image::imageops::grayscale(screenshot);
        let edges = edge_map(&gray, self.config.edge_threshold);
        let components = connected_components(&edges, gray.width(), gray.height());

        let (img_w, img_h) = (gray.width() as f64, gray.height() as f64);
        let checkboxes: Vec<Rect> = components
            .iter()
            .map(|c| c.rect)
            .filter(is_checkbox_like)
            .collect();

        let boxes: Vec<(Rect, VisionKind)> = components
            .iter()
            .filter(|c| self.passes_size(&c.rect))
            .filter(|c| c.rect.width < img_w * 0.95 || c.rect.height < img_h * 0.95)
            .filter(|c| is_outline(c))
            .map(|c| (c.rect, kind_of(&c.rect, &checkboxes)))
            .collect();

        dedupe(boxes, self.config.dedupe_iou)
    }
}

/// Add vision candidates that do not overlap any DOM candidate. DOM
/// candidates are never replaced.
pub fn merge(dom: Vec<CandidateElement>, vision: Vec<CandidateElement>, overlap: f64) -> Vec<CandidateElement> {
    let mut merged = dom;
    let dom_boxes: Vec<Rect> = merged.iter().map(|c| c.pixel_box).collect();
    merged.extend(vision.into_iter().filter(|v| {
        dom_boxes
            .iter()
            .all(|d| d.overlap_ratio(&v.pixel_box) <= overlap)
    }));
    merged
}

fn edge_map(gray: &GrayImage, threshold: u8) -> Vec<bool> {
    let (w, h) = gray.dimensions();
    let mut edges = vec![false; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let here = gray.get_pixel(x, y)[0];
            let dx = if x + 1 < w { here.abs_diff(gray.get_pixel(x + 1, y)[0]) } else { 0 };
            let dy = if y + 1 < h { here.abs_diff(gray.get_pixel(x, y + 1)[0]) } else { 0 };
            edges[(y * w + x) as usize] = dx.max(dy) >= threshold;
        }
    }
    edges
}

fn connected_components(edges: &[bool], w: u32, h: u32) -> Vec<Component> {
    let (w, h) = (w as i64, h as i64);
    let mut seen = vec![false; edges.len()];
    let mut components = Vec::new();
    let mut stack = Vec::new();

    for start in 0..edges.len() {
        if !edges[start] || seen[start] {
            continue;
        }
        seen[start] = true;
        stack.push(start);
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (i64::MAX, i64::MAX, i64::MIN, i64::MIN);
        let mut pixels = 0usize;

        while let Some(idx) = stack.pop() {
            let (x, y) = (idx as i64 % w, idx as i64 / w);
            pixels += 1;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            for ny in (y - 1).max(0)..=(y + 1).min(h - 1) {
                for nx in (x - 1).max(0)..=(x + 1).min(w - 1) {
                    let n = (ny * w + nx) as usize;
                    if edges[n] && !seen[n] {
                        seen[n] = true;
                        stack.push(n);
                    }
                }
            }
        }

        components.push(Component {
            rect: Rect::new(
                min_x as f64,
                min_y as f64,
                (max_x - min_x + 1) as f64,
                (max_y - min_y + 1) as f64,
            ),
            pixels,
        });
    }
    components
}

/// Outlined boxes have edge pixels along their perimeter only; photos and
/// dense text blocks have far more.
fn is_outline(component: &Component) -> bool {
    let perimeter = 2.0 * (component.rect.width + component.rect.height);
    (component.pixels as f64) <= 4.0 * perimeter
}

fn is_checkbox_like(rect: &Rect) -> bool {
    (14.0..=40.0).contains(&rect.width)
        && (14.0..=40.0).contains(&rect.height)
        && (rect.width - rect.height).abs() <= 4.0
}

fn kind_of(rect: &Rect, checkboxes: &[Rect]) -> VisionKind {
    let aspect = rect.width / rect.height.max(1.0);
    // A wide panel with a tick box at its left: the "I'm not a robot" layout.
    let has_left_checkbox = checkboxes.iter().any(|cb| {
        let (cx, cy) = cb.center();
        cx > rect.x && cx < rect.x + rect.width * 0.35 && cy > rect.y && cy < rect.bottom()
    });
    if has_left_checkbox && (2.5..=6.0).contains(&aspect) && rect.height >= 50.0 {
        VisionKind::ChallengeWidget
    } else if rect.height >= 70.0 {
        VisionKind::Textarea
    } else if aspect < 1.8 && rect.height >= 28.0 {
        VisionKind::Button
    } else {
        VisionKind::Input
    }
}

/// Non-maximum suppression, largest box first.
fn dedupe(mut boxes: Vec<(Rect, VisionKind)>, iou_threshold: f64) -> Vec<(Rect, VisionKind)> {
    boxes.sort_by(|(a, _), (b, _)| b.area().total_cmp(&a.area()));
    let mut kept: Vec<(Rect, VisionKind)> = Vec::new();
    for (rect, kind) in boxes {
        if kept.iter().all(|(k, _)| k.iou(&rect) < iou_threshold) {
            kept.push((rect, kind));
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn detect_sorted(img: &RgbaImage) -> Vec<(Rect, VisionKind)> {
        detect(&EdgeDetector::default(), img, None, 0.6)
            .into_iter()
            .map(|c| (c.pixel_box, c.vision_kind().unwrap()))
            .collect()
    }

    fn blank(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))
    }

    fn outline(img: &mut RgbaImage, x0: u32, y0: u32, x1: u32, y1: u32) {
        let black = Rgba([0, 0, 0, 255]);
        for x in x0..=x1 {
            img.put_pixel(x, y0, black);
            img.put_pixel(x, y1, black);
        }
        for y in y0..=y1 {
            img.put_pixel(x0, y, black);
            img.put_pixel(x1, y, black);
        }
    }

    #[test]
    fn finds_inputs_and_textareas() {
        let mut img = blank(400, 300);
        outline(&mut img, 50, 40, 249, 69);
        outline(&mut img, 50, 100, 349, 199);
        let boxes = detect_sorted(&img);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].1, VisionKind::Input);
        assert_eq!(boxes[1].1, VisionKind::Textarea);
        assert!(boxes[0].0.iou(&Rect::new(50.0, 40.0, 200.0, 30.0)) > 0.8);
    }

    #[test]
    fn tiny_and_blank_regions_are_ignored() {
        let mut img = blank(200, 200);
        outline(&mut img, 10, 10, 30, 20);
        assert!(detect_sorted(&img).is_empty());
    }

    #[test]
    fn checkbox_panel_reads_as_challenge_widget() {
        let mut img = blank(400, 200);
        outline(&mut img, 20, 20, 320, 100);
        outline(&mut img, 40, 46, 67, 73);
        let boxes = detect_sorted(&img);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].1, VisionKind::ChallengeWidget);
    }

    #[test]
    fn merge_never_overrides_dom_candidates() {
        let mut img = blank(400, 300);
        outline(&mut img, 50, 40, 249, 69);
        outline(&mut img, 50, 100, 349, 199);
        let vision = detect(&EdgeDetector::default(), &img, None, 0.6);

        let dom = CandidateElement {
            id: "dom-0".into(),
            source: CandidateSource::Dom(Default::default()),
            page_box: Rect::new(50.0, 40.0, 200.0, 30.0),
            pixel_box: Rect::new(50.0, 40.0, 200.0, 30.0),
            offscreen: false,
            nearby_text: Vec::new(),
            raw_confidence: 1.0,
        };
        let merged = merge(vec![dom], vision, 0.3);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, "dom-0");
        assert_eq!(merged[1].vision_kind(), Some(VisionKind::Textarea));
    }
}
