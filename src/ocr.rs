use async_trait::async_trait;
use image::RgbaImage;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{Rect, TextToken};

/// Text recognition capability over an image region. Implemented outside
/// this crate (a Tesseract binding, a remote OCR service, ...).
///
/// Returned token boxes are in full-screenshot pixel coordinates.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &RgbaImage, region: Rect) -> Result<Vec<TextToken>>;
}

/// Confidence-filtering front for a [`TextRecognizer`].
///
/// Every token that leaves the adapter has passed the threshold. Any failure
/// of the underlying recognizer surfaces as [`Error::RecognitionUnavailable`]
/// so callers can degrade instead of aborting.
#[derive(Clone, Copy)]
pub struct OcrAdapter<'a> {
    recognizer: Option<&'a dyn TextRecognizer>,
    min_confidence: f64,
}

impl<'a> OcrAdapter<'a> {
    pub fn new(recognizer: Option<&'a dyn TextRecognizer>, min_confidence: f64) -> Self {
        Self {
            recognizer,
            min_confidence,
        }
    }

    pub fn is_available(&self) -> bool {
        self.recognizer.is_some()
    }

    pub async fn recognize_text(&self, image: &RgbaImage, region: Rect) -> Result<Vec<TextToken>> {
        let recognizer = self
            .recognizer
            .ok_or_else(|| Error::RecognitionUnavailable("no recognizer configured".into()))?;
        let region = region.clamp_to(image.width() as f64, image.height() as f64);
        let raw = recognizer.recognize(image, region).await.map_err(|e| match e {
            Error::RecognitionUnavailable(_) => e,
            other => Error::RecognitionUnavailable(other.to_string()),
        })?;
        let total = raw.len();
        let tokens = filter_tokens(raw, self.min_confidence);
        debug!(total, kept = tokens.len(), "recognized text tokens");
        Ok(tokens)
    }

    pub async fn recognize_full(&self, image: &RgbaImage) -> Result<Vec<TextToken>> {
        let full = Rect::new(0.0, 0.0, image.width() as f64, image.height() as f64);
        self.recognize_text(image, full).await
    }

    /// Recognize text inside a box grown by `margin` pixels on each side.
    pub async fn recognize_near(&self, image: &RgbaImage, pixel_box: &Rect, margin: f64) -> Result<Vec<TextToken>> {
        let bounds = (image.width() as f64, image.height() as f64);
        self.recognize_text(image, region_around(pixel_box, margin, bounds)).await
    }
}

/// Drop empty and low-confidence tokens.
pub fn filter_tokens(tokens: Vec<TextToken>, min_confidence: f64) -> Vec<TextToken> {
    tokens
        .into_iter()
        .filter(|t| t.confidence.is_finite() && t.confidence >= min_confidence)
        .filter(|t| !t.text.trim().is_empty())
        .collect()
}

pub fn region_around(pixel_box: &Rect, margin: f64, bounds: (f64, f64)) -> Rect {
    Rect::new(
        pixel_box.x - margin,
        pixel_box.y - margin,
        pixel_box.width + 2.0 * margin,
        pixel_box.height + 2.0 * margin,
    )
    .clamp_to(bounds.0, bounds.1)
}

/// Join tokens in reading order (line by line, left to right).
pub fn joined_text<'t>(tokens: impl IntoIterator<Item = &'t TextToken>) -> String {
    let mut sorted: Vec<&TextToken> = tokens.into_iter().collect();
    sorted.sort_by(|a, b| {
        line_of(a)
            .cmp(&line_of(b))
            .then(a.bbox.x.total_cmp(&b.bbox.x))
    });
    sorted
        .iter()
        .map(|t| t.text.trim())
        .collect::<Vec<_>>()
        .join(" ")
}

fn line_of(token: &TextToken) -> i64 {
    (token.bbox.center().1 / 12.0).floor() as i64
}
