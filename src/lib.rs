pub mod batch;
pub mod browser;
pub mod captcha;
pub mod classifier;
pub mod config;
pub mod dom_mapper;
pub mod driver;
pub mod element;
pub mod error;
pub mod fill;
pub mod model;
pub mod ocr;
pub mod page;
pub mod pipeline;
pub mod profile;
pub mod report;
pub mod sink;
pub mod submit;
pub mod vision;

pub use batch::BatchRunner;
pub use browser::ChromeBrowser;
pub use config::{BrowserConfig, FillConfig, FillConfigBuilder, UnresolvedSubmitPolicy};
pub use driver::{DriverFactory, FillTarget, PageDriver, SubmitSignal};
pub use error::{Error, Result};
pub use model::{
    CandidateElement, ClassifiedField, DomElement, FieldStatus, FieldType, PageSnapshot, PageStatus, Rect,
    SubmissionResult, TextToken, Viewport,
};
pub use ocr::TextRecognizer;
pub use page::ChromePage;
pub use pipeline::PagePipeline;
pub use profile::ProfileData;
pub use report::BatchReport;
pub use sink::{JsonlRecorder, MemorySink, ResultSink};
pub use vision::{EdgeDetector, RegionDetector};
