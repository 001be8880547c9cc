//! Runs many pages through the pipeline with bounded concurrency. A page
//! never takes the batch down with it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::FillConfig;
use crate::driver::DriverFactory;
use crate::error::Result;
use crate::model::SubmissionResult;
use crate::ocr::TextRecognizer;
use crate::pipeline::PagePipeline;
use crate::profile::ProfileData;
use crate::report::BatchReport;
use crate::sink::ResultSink;
use crate::vision::{EdgeDetector, RegionDetector};

/// Upper bound on tearing a page down after its run.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct BatchRunner {
    config: Arc<FillConfig>,
    profile: Arc<ProfileData>,
    factory: Arc<dyn DriverFactory>,
    sink: Arc<dyn ResultSink>,
    detector: Arc<dyn RegionDetector>,
    recognizer: Option<Arc<dyn TextRecognizer>>,
}

impl BatchRunner {
    pub fn new(
        config: FillConfig,
        profile: ProfileData,
        factory: Arc<dyn DriverFactory>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            profile: Arc::new(profile),
            factory,
            sink,
            detector: Arc::new(EdgeDetector::default()),
            recognizer: None,
        }
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn RegionDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Process every URL and return the summary. Each page's result is
    /// appended to the sink as soon as that page finishes.
    pub async fn run<I>(&self, urls: I) -> Result<BatchReport>
    where
        I: IntoIterator<Item = String>,
    {
        self.config.validate()?;
        if self.profile.is_empty() {
            warn!("profile has no values; every field will be skipped");
        }

        let results: Vec<SubmissionResult> = stream::iter(urls)
            .map(|url| self.process_page(url))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        let report = BatchReport::from_results(&results, self.config.partial_is_success);
        info!(
            total = report.total,
            succeeded = report.succeeded,
            captcha = report.captcha_encounters,
            "batch finished"
        );
        Ok(report)
    }

    async fn process_page(&self, url: String) -> SubmissionResult {
        let started = Utc::now();
        let config = Arc::clone(&self.config);
        let profile = Arc::clone(&self.profile);
        let factory = Arc::clone(&self.factory);
        let detector = Arc::clone(&self.detector);
        let recognizer = self.recognizer.clone();
        let page_url = url.clone();

        // Spawned so a fault outside the guarded pipeline run still
        // surfaces as a JoinError here instead of taking the batch down.
        let task = tokio::spawn(async move {
            let deadline = Instant::now() + config.page_timeout;
            let timed_out = || {
                warn!(url = %page_url, "page timed out");
                SubmissionResult::error(
                    &page_url,
                    format!("timeout after {}s", config.page_timeout.as_secs_f64()),
                    started,
                )
            };

            let driver = match tokio::time::timeout_at(deadline, factory.open()).await {
                Ok(Ok(driver)) => driver,
                Ok(Err(e)) => return SubmissionResult::error(&page_url, format!("page open failed: {e}"), started),
                Err(_) => return timed_out(),
            };

            // Whatever happens inside the run, the page is closed below.
            let pipeline = PagePipeline::new(&config, &profile, detector.as_ref()).with_recognizer(recognizer.as_deref());
            let run = AssertUnwindSafe(pipeline.run(driver.as_ref(), &page_url)).catch_unwind();
            let result = match tokio::time::timeout_at(deadline, run).await {
                Ok(Ok(result)) => result,
                Ok(Err(panic)) => {
                    let message = panic_message(panic.as_ref());
                    error!(url = %page_url, panic = %message, "page pipeline panicked");
                    SubmissionResult::error(&page_url, format!("pipeline fault: {message}"), started)
                }
                Err(_) => timed_out(),
            };

            match tokio::time::timeout(CLOSE_TIMEOUT, driver.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(url = %page_url, error = %e, "closing page failed"),
                Err(_) => warn!(url = %page_url, "closing page timed out"),
            }
            result
        });

        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                error!(url = %url, error = %e, "page task aborted");
                SubmissionResult::error(&url, format!("pipeline fault: {e}"), started)
            }
        };

        if let Err(e) = self.sink.append(&result).await {
            error!(url = %url, error = %e, "recording result failed");
        }
        result
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
