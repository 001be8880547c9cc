use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::layout::Point;
use chromiumoxide::page::Page as CrPage;
use chromiumoxide::page::ScreenshotParams;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::driver::{FillTarget, PageDriver, SubmitSignal};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::fill::choose_option;
use crate::model::{DomElement, PageSnapshot, Viewport};

/// Tags every candidate-worthy element with `data-ff-ref` and every form
/// with `data-ff-form`, then returns element attributes, page-space bounds,
/// the largest visible form, and the viewport metrics needed to map them
/// into the screenshot.
const HARVEST_JS: &str = r#"
JSON.stringify((() => {
    const SELECTOR = 'input, textarea, select, button, [contenteditable=""], [contenteditable="true"], '
        + '[role], iframe, img, [class*="captcha"], [id*="captcha"], [class*="turnstile"]';
    const CAPTCHA = /captcha|turnstile/i;
    const sx = window.scrollX, sy = window.scrollY;
    const text = (s) => (s || '').replace(/\s+/g, ' ').trim().slice(0, 200) || null;
    const labelOf = (el) => {
        if (el.id) {
            const l = document.querySelector(`label[for="${CSS.escape(el.id)}"]`);
            if (l) return text(l.innerText);
        }
        const wrap = el.closest('label');
        if (wrap) return text(wrap.innerText);
        const by = el.getAttribute('aria-labelledby');
        if (by) {
            const l = document.getElementById(by.split(' ')[0]);
            if (l) return text(l.innerText);
        }
        return null;
    };
    const forms = Array.from(document.forms);
    forms.forEach((f, i) => f.setAttribute('data-ff-form', String(i)));
    let primary = null, best = 0;
    for (const f of forms) {
        const s = window.getComputedStyle(f);
        const r = f.getBoundingClientRect();
        if (s.display === 'none' || s.visibility === 'hidden' || r.width < 120 || r.height < 80) continue;
        if (r.width * r.height > best) { best = r.width * r.height; primary = f; }
    }
    let next = 0;
    const elements = [];
    for (const el of document.querySelectorAll(SELECTOR)) {
        const style = window.getComputedStyle(el);
        const r = el.getBoundingClientRect();
        const visible = style.display !== 'none' && style.visibility !== 'hidden' && r.width > 0 && r.height > 0;
        const marker = [el.id, el.className && el.className.baseVal === undefined ? el.className : '', el.getAttribute('name'), el.getAttribute('src')].join(' ');
        if (!visible && !CAPTCHA.test(marker)) continue;
        const tag = el.tagName.toLowerCase();
        if (tag === 'img' && !CAPTCHA.test(el.getAttribute('src') || '')) continue;
        if (!el.hasAttribute('data-ff-ref')) el.setAttribute('data-ff-ref', String(next++));
        const attr = (n) => el.getAttribute(n);
        const owner = el.form || el.closest('form');
        elements.push({
            elementRef: `[data-ff-ref="${el.getAttribute('data-ff-ref')}"]`,
            tag,
            inputType: tag === 'input' ? (el.type || 'text') : null,
            name: attr('name'),
            id: el.id || null,
            placeholder: attr('placeholder'),
            ariaLabel: attr('aria-label'),
            autocomplete: attr('autocomplete'),
            class: typeof el.className === 'string' ? (el.className || null) : null,
            role: attr('role'),
            labelText: labelOf(el),
            text: text(tag === 'input' ? el.value : el.innerText),
            src: attr('src'),
            contentEditable: el.isContentEditable && tag !== 'input' && tag !== 'textarea',
            form: owner ? owner.getAttribute('data-ff-form') : null,
            bounds: { x: r.left + sx, y: r.top + sy, width: r.width, height: r.height },
        });
    }
    return {
        elements,
        primaryForm: primary ? primary.getAttribute('data-ff-form') : null,
        viewport: {
            width: window.innerWidth,
            height: window.innerHeight,
            scrollX: sx,
            scrollY: sy,
            devicePixelRatio: window.devicePixelRatio || 1,
            zoom: window.visualViewport ? window.visualViewport.scale : 1,
        },
    };
})())
"#;

/// Fingerprints the form being submitted, picked the same way the harvest
/// picks it.
const FINGERPRINT_JS: &str = r#"
(() => {
    let primary = null, best = 0;
    for (const f of document.forms) {
        const s = window.getComputedStyle(f);
        const r = f.getBoundingClientRect();
        if (s.display === 'none' || s.visibility === 'hidden' || r.width < 120 || r.height < 80) continue;
        if (r.width * r.height > best) { best = r.width * r.height; primary = f; }
    }
    const root = primary || document.querySelector('form') || document.body;
    const t = (root && root.innerText) || '';
    const fields = root ? root.querySelectorAll('input, textarea, select').length : 0;
    return [document.forms.length, fields, t.length, t.slice(0, 200)].join('|');
})()
"#;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Harvest {
    elements: Vec<DomElement>,
    #[serde(default)]
    primary_form: Option<String>,
    viewport: Viewport,
}

/// A chromium tab driven over CDP.
pub struct ChromePage {
    inner: CrPage,
    default_timeout: Duration,
}

impl ChromePage {
    pub(crate) fn new(inner: CrPage, default_timeout: Duration) -> Self {
        Self { inner, default_timeout }
    }

    /// Returns a reference to the underlying chromiumoxide Page.
    pub fn inner(&self) -> &CrPage {
        &self.inner
    }

    async fn eval<T: DeserializeOwned>(&self, js: impl Into<String>) -> Result<T> {
        let js: String = js.into();
        self.inner
            .evaluate(js)
            .await
            .map_err(|e| Error::JsError(e.to_string()))?
            .into_value::<T>()
            .map_err(|e| Error::JsError(e.to_string()))
    }

    async fn eval_void(&self, js: impl Into<String>) -> Result<()> {
        let js: String = js.into();
        self.inner
            .evaluate(js)
            .await
            .map_err(|e| Error::JsError(e.to_string()))?;
        Ok(())
    }

    /// Take a screenshot of the visible viewport (PNG format).
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.inner
            .screenshot(params)
            .await
            .map_err(|e| Error::ScreenshotError(e.to_string()))
    }

    /// Find an element matching the given CSS selector.
    pub async fn find_element(&self, selector: &str) -> Result<Element> {
        let el = self
            .inner
            .find_element(selector)
            .await
            .map_err(|e| Error::ElementNotFound(format!("{selector}: {e}")))?;
        Ok(Element::new(el))
    }

    async fn page_text(&self) -> Result<String> {
        self.eval("(document.body && document.body.innerText) || ''").await
    }

    async fn observe(&self, signal: &SubmitSignal) -> Result<bool> {
        Ok(match signal {
            SubmitSignal::Navigation { from_url } => {
                let now = self.current_url().await?;
                !from_url.is_empty() && now != *from_url
            }
            SubmitSignal::SuccessText(phrases) => {
                let text = self.page_text().await?.to_lowercase();
                phrases.iter().any(|p| text.contains(&p.to_lowercase()))
            }
            SubmitSignal::DomChange { fingerprint } => self.form_fingerprint().await? != *fingerprint,
        })
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.inner
            .goto(url)
            .await
            .map_err(|e| Error::NavigationError(e.to_string()))?;
        Ok(())
    }

    async fn snapshot(&self) -> Result<PageSnapshot> {
        let json: String = self.eval(HARVEST_JS).await?;
        let harvest: Harvest = serde_json::from_str(&json)?;
        let png = self.screenshot().await?;
        let screenshot = image::load_from_memory(&png)?.to_rgba8();
        debug!(
            elements = harvest.elements.len(),
            width = screenshot.width(),
            height = screenshot.height(),
            "captured snapshot"
        );
        Ok(PageSnapshot {
            url: self.current_url().await.unwrap_or_default(),
            screenshot: Arc::new(screenshot),
            elements: harvest.elements,
            viewport: Some(harvest.viewport),
            primary_form: harvest.primary_form,
            captured_at: Utc::now(),
        })
    }

    async fn current_url(&self) -> Result<String> {
        self.inner
            .url()
            .await
            .map_err(|e| Error::NavigationError(e.to_string()))?
            .ok_or_else(|| Error::NavigationError("No URL found".into()))
    }

    async fn form_fingerprint(&self) -> Result<String> {
        self.eval(FINGERPRINT_JS).await
    }

    async fn scroll_into_view(&self, target: &FillTarget) -> Result<()> {
        match target {
            FillTarget::Element(selector) => self.find_element(selector).await?.scroll_into_view().await,
            FillTarget::Point { y, .. } => {
                self.eval_void(format!("window.scrollBy(0, {y} - window.innerHeight / 2)"))
                    .await
            }
        }
    }

    async fn set_value(&self, target: &FillTarget, value: &str) -> Result<()> {
        match target {
            FillTarget::Element(selector) => {
                let el = self.find_element(selector).await?;
                el.scroll_into_view().await?;
                if el.tag_name().await? == "select" {
                    let options = el.options().await?;
                    let index = choose_option(&options, value).ok_or_else(|| {
                        Error::ElementNotFound(format!("{selector}: no option matching '{value}'"))
                    })?;
                    return el.select_index(index).await;
                }
                el.focus().await?;
                el.clear().await?;
                el.type_text(value).await?;
                el.commit().await
            }
            FillTarget::Point { x, y } => {
                self.inner
                    .click(Point { x: *x, y: *y })
                    .await
                    .map_err(Error::CdpError)?;
                self.eval_void(
                    "(() => { const a = document.activeElement; if (a && 'select' in a) a.select(); })()",
                )
                .await?;
                self.inner
                    .execute(InsertTextParams::new(value))
                    .await
                    .map_err(Error::CdpError)?;
                Ok(())
            }
        }
    }

    async fn read_value(&self, target: &FillTarget) -> Result<Option<String>> {
        match target {
            FillTarget::Element(selector) => self.find_element(selector).await?.value().await,
            FillTarget::Point { .. } => Ok(None),
        }
    }

    async fn click(&self, target: &FillTarget) -> Result<()> {
        match target {
            FillTarget::Element(selector) => self.find_element(selector).await?.click().await,
            FillTarget::Point { x, y } => {
                self.inner
                    .click(Point { x: *x, y: *y })
                    .await
                    .map_err(Error::CdpError)?;
                Ok(())
            }
        }
    }

    /// Polls every 100ms until a signal is seen or `timeout` passes.
    async fn wait_for_signal(&self, signals: &[SubmitSignal], timeout: Duration) -> Result<Option<SubmitSignal>> {
        let timeout = timeout.min(self.default_timeout);
        let interval = Duration::from_millis(100);
        let start = Instant::now();

        loop {
            for signal in signals {
                match self.observe(signal).await {
                    Ok(true) => return Ok(Some(signal.clone())),
                    Ok(false) => {}
                    // Mid-navigation evaluations fail; try again next tick.
                    Err(e) => debug!(error = %e, "signal check failed"),
                }
            }
            if start.elapsed() >= timeout {
                return Ok(None);
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn close(&self) -> Result<()> {
        self.inner.clone().close().await.map_err(Error::CdpError)
    }
}
