use std::time::Duration;

use crate::browser::ChromeBrowser;
use crate::error::{Error, Result};
use crate::model::FieldType;

// ── Browser ─────────────────────────────────────────────────────────

pub struct BrowserConfig {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub chrome_path: Option<String>,
    /// Proxy server URL, e.g. "http://host:port" or "socks5://host:port".
    pub proxy: Option<String>,
    /// Timeout for element lookups and post-submit polling (default: 30s).
    pub default_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 800,
            chrome_path: None,
            proxy: None,
            default_timeout: Duration::from_secs(30),
        }
    }
}

pub struct BrowserBuilder {
    config: BrowserConfig,
}

impl BrowserBuilder {
    pub fn new() -> Self {
        Self {
            config: BrowserConfig::default(),
        }
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.viewport_width = width;
        self.config.viewport_height = height;
        self
    }

    pub fn chrome_path(mut self, path: impl Into<String>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    pub fn proxy(mut self, server: impl Into<String>) -> Self {
        self.config.proxy = Some(server.into());
        self
    }

    pub fn build_config(self) -> BrowserConfig {
        self.config
    }

    pub async fn build(self) -> Result<ChromeBrowser> {
        ChromeBrowser::launch(self.build_config()).await
    }
}

impl Default for BrowserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ── Pipeline ────────────────────────────────────────────────────────

/// What a page gets when submit was dispatched but no positive signal arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedSubmitPolicy {
    Partial,
    Failed,
}

const MAX_NAVIGATION_RETRIES: u32 = 10;

/// Batch-wide, read-only settings for the page pipeline.
#[derive(Debug, Clone)]
pub struct FillConfig {
    /// Recognized text below this confidence never reaches the classifier.
    pub ocr_min_confidence: f64,
    /// Max pixel gap between a text token and the candidate it labels.
    pub text_proximity_px: f64,
    /// Overlap (relative to the smaller box) above which nested DOM
    /// elements collapse into one candidate.
    pub nesting_overlap: f64,
    /// Overlap above which a vision box is considered the same element as
    /// a DOM candidate and dropped.
    pub vision_overlap: f64,
    /// Vision fallback runs when the DOM yields fewer candidates than this.
    pub min_dom_candidates: usize,
    /// Vision fallback also runs when no DOM candidate classifies above this.
    pub vision_trigger_confidence: f64,
    /// Baseline confidence carried by vision candidates.
    pub vision_baseline_confidence: f64,
    /// Fraction of out-of-range transformed boxes that fails the mapping.
    pub max_out_of_range_fraction: f64,
    /// Candidates below this fused confidence become `unknown`.
    pub min_classification_confidence: f64,
    pub max_fill_attempts: u32,
    pub retry_backoff: Duration,
    pub required_fields: Vec<FieldType>,
    pub page_timeout: Duration,
    /// Extra navigation attempts after the first one fails.
    pub navigation_retries: u32,
    pub submit_timeout: Duration,
    pub success_phrases: Vec<String>,
    pub unresolved_submit: UnresolvedSubmitPolicy,
    /// Whether `partial` counts as success in operator-facing summaries.
    pub partial_is_success: bool,
    /// Pages processed at once by the batch runner.
    pub concurrency: usize,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            ocr_min_confidence: 0.6,
            text_proximity_px: 120.0,
            nesting_overlap: 0.85,
            vision_overlap: 0.3,
            min_dom_candidates: 1,
            vision_trigger_confidence: 0.5,
            vision_baseline_confidence: 0.6,
            max_out_of_range_fraction: 0.5,
            min_classification_confidence: 0.5,
            max_fill_attempts: 3,
            retry_backoff: Duration::from_millis(300),
            required_fields: vec![FieldType::Name, FieldType::Email, FieldType::Message],
            page_timeout: Duration::from_secs(120),
            navigation_retries: 1,
            submit_timeout: Duration::from_secs(10),
            success_phrases: [
                "thank you",
                "thanks for contacting",
                "message sent",
                "message has been sent",
                "form submitted",
                "we'll be in touch",
                "we will contact you",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            unresolved_submit: UnresolvedSubmitPolicy::Partial,
            partial_is_success: false,
            concurrency: 4,
        }
    }
}

impl FillConfig {
    pub fn builder() -> FillConfigBuilder {
        FillConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        let fractions = [
            ("ocr_min_confidence", self.ocr_min_confidence),
            ("nesting_overlap", self.nesting_overlap),
            ("vision_overlap", self.vision_overlap),
            ("vision_trigger_confidence", self.vision_trigger_confidence),
            ("vision_baseline_confidence", self.vision_baseline_confidence),
            ("max_out_of_range_fraction", self.max_out_of_range_fraction),
            ("min_classification_confidence", self.min_classification_confidence),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        if self.max_fill_attempts == 0 {
            return Err(Error::Config("max_fill_attempts must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".into()));
        }
        if self.navigation_retries > MAX_NAVIGATION_RETRIES {
            return Err(Error::Config(format!(
                "navigation_retries must be at most {MAX_NAVIGATION_RETRIES}, got {}",
                self.navigation_retries
            )));
        }
        if self.page_timeout.is_zero() {
            return Err(Error::Config("page_timeout must be non-zero".into()));
        }
        if let Some(t) = self.required_fields.iter().find(|t| !t.is_fillable()) {
            return Err(Error::Config(format!("required field '{t}' is not fillable")));
        }
        Ok(())
    }
}

pub struct FillConfigBuilder {
    config: FillConfig,
}

impl FillConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: FillConfig::default(),
        }
    }

    pub fn ocr_min_confidence(mut self, threshold: f64) -> Self {
        self.config.ocr_min_confidence = threshold;
        self
    }

    pub fn text_proximity(mut self, pixels: f64) -> Self {
        self.config.text_proximity_px = pixels;
        self
    }

    /// Vision fallback triggers: minimum DOM candidate count and minimum
    /// classification confidence.
    pub fn vision_trigger(mut self, min_dom_candidates: usize, min_confidence: f64) -> Self {
        self.config.min_dom_candidates = min_dom_candidates;
        self.config.vision_trigger_confidence = min_confidence;
        self
    }

    pub fn min_classification_confidence(mut self, confidence: f64) -> Self {
        self.config.min_classification_confidence = confidence;
        self
    }

    pub fn max_fill_attempts(mut self, attempts: u32) -> Self {
        self.config.max_fill_attempts = attempts;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    pub fn required_fields(mut self, fields: impl IntoIterator<Item = FieldType>) -> Self {
        self.config.required_fields = fields.into_iter().collect();
        self
    }

    pub fn page_timeout(mut self, timeout: Duration) -> Self {
        self.config.page_timeout = timeout;
        self
    }

    pub fn navigation_retries(mut self, retries: u32) -> Self {
        self.config.navigation_retries = retries;
        self
    }

    pub fn submit_timeout(mut self, timeout: Duration) -> Self {
        self.config.submit_timeout = timeout;
        self
    }

    pub fn unresolved_submit(mut self, policy: UnresolvedSubmitPolicy) -> Self {
        self.config.unresolved_submit = policy;
        self
    }

    pub fn partial_is_success(mut self, yes: bool) -> Self {
        self.config.partial_is_success = yes;
        self
    }

    pub fn concurrency(mut self, workers: usize) -> Self {
        self.config.concurrency = workers;
        self
    }

    pub fn build(self) -> Result<FillConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for FillConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
