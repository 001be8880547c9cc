//! The browser-automation seam. The pipeline only talks to a page through
//! [`PageDriver`]; [`crate::page::ChromePage`] is the CDP implementation and
//! tests script their own.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::PageSnapshot;

/// Where an input action lands.
#[derive(Debug, Clone, PartialEq)]
pub enum FillTarget {
    /// A harvested DOM element, by its element ref.
    Element(String),
    /// A point in CSS client coordinates, for vision-only candidates.
    Point { x: f64, y: f64 },
}

/// Observable change after a submit click.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitSignal {
    /// The URL moved away from `from_url`.
    Navigation { from_url: String },
    /// Any of these phrases appeared in the page text (case-insensitive).
    SuccessText(Vec<String>),
    /// The form fingerprint no longer equals `fingerprint`.
    DomChange { fingerprint: String },
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Screenshot, harvested elements and viewport metadata in one capture.
    async fn snapshot(&self) -> Result<PageSnapshot>;

    async fn current_url(&self) -> Result<String>;

    /// Cheap digest of the form area, compared before and after submit.
    async fn form_fingerprint(&self) -> Result<String>;

    async fn scroll_into_view(&self, target: &FillTarget) -> Result<()>;

    /// Focus, clear and type `value`. Select elements pick the matching
    /// option instead.
    async fn set_value(&self, target: &FillTarget, value: &str) -> Result<()>;

    /// Current value of the target. `None` when the target has no readable
    /// DOM value and must be verified from pixels.
    async fn read_value(&self, target: &FillTarget) -> Result<Option<String>>;

    async fn click(&self, target: &FillTarget) -> Result<()>;

    /// Wait until one of `signals` is observed or `timeout` passes.
    async fn wait_for_signal(&self, signals: &[SubmitSignal], timeout: Duration) -> Result<Option<SubmitSignal>>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Opens one isolated page per URL.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn PageDriver>>;
}
