use chromiumoxide::element::Element as CrElement;

use crate::error::{Error, Result};
use crate::fill::SelectOption;

/// Wrapper around a chromiumoxide Element exposing the input actions a
/// form fill needs.
pub struct Element {
    inner: CrElement,
}

impl Element {
    pub(crate) fn new(inner: CrElement) -> Self {
        Self { inner }
    }

    /// Click this element (scrolls into view first).
    pub async fn click(&self) -> Result<()> {
        self.inner.click().await.map_err(Error::CdpError)?;
        Ok(())
    }

    pub async fn focus(&self) -> Result<()> {
        self.inner.focus().await.map_err(Error::CdpError)?;
        Ok(())
    }

    pub async fn scroll_into_view(&self) -> Result<()> {
        self.inner.scroll_into_view().await.map_err(Error::CdpError)?;
        Ok(())
    }

    /// Type text into this element with real key events.
    pub async fn type_text(&self, text: &str) -> Result<()> {
        self.inner.type_str(text).await.map_err(Error::CdpError)?;
        Ok(())
    }

    /// Empty a text control or contenteditable and notify listeners.
    pub async fn clear(&self) -> Result<()> {
        self.inner
            .call_js_fn(
                r#"function() {
                    if ('value' in this) { this.value = ''; } else { this.textContent = ''; }
                    this.dispatchEvent(new Event('input', { bubbles: true }));
                }"#,
                false,
            )
            .await
            .map_err(|e| Error::JsError(e.to_string()))?;
        Ok(())
    }

    async fn call_for_string(&self, function: &str) -> Result<Option<String>> {
        let returns = self
            .inner
            .call_js_fn(function, false)
            .await
            .map_err(|e| Error::JsError(e.to_string()))?;
        Ok(returns
            .result
            .value
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    /// The control's current value: the selected option's label for a
    /// select, `innerText` for contenteditable.
    pub async fn value(&self) -> Result<Option<String>> {
        self.call_for_string(
            r#"function() {
                if (this.tagName === 'SELECT') {
                    const o = this.options[this.selectedIndex];
                    return o ? (o.text || '').trim() : '';
                }
                return 'value' in this ? String(this.value) : (this.innerText || '');
            }"#,
        )
        .await
    }

    pub async fn tag_name(&self) -> Result<String> {
        Ok(self
            .call_for_string("function() { return this.tagName.toLowerCase(); }")
            .await?
            .unwrap_or_default())
    }

    /// Options of a select element, in document order.
    pub async fn options(&self) -> Result<Vec<SelectOption>> {
        let json = self
            .call_for_string(
                r#"function() {
                    return JSON.stringify(Array.from(this.options || [], (o) => ({
                        value: o.value || '',
                        label: (o.text || '').trim(),
                    })));
                }"#,
            )
            .await?
            .unwrap_or_else(|| "[]".into());
        Ok(serde_json::from_str(&json)?)
    }

    /// Select the option at `index` and fire the events a user pick would.
    pub async fn select_index(&self, index: usize) -> Result<()> {
        self.inner
            .call_js_fn(
                format!(
                    r#"function() {{
                        this.selectedIndex = {index};
                        this.dispatchEvent(new Event('input', {{ bubbles: true }}));
                        this.dispatchEvent(new Event('change', {{ bubbles: true }}));
                    }}"#
                ),
                false,
            )
            .await
            .map_err(|e| Error::JsError(e.to_string()))?;
        Ok(())
    }

    /// Fire `change` after typing; some frameworks only commit on it.
    pub async fn commit(&self) -> Result<()> {
        self.inner
            .call_js_fn(
                "function() { this.dispatchEvent(new Event('change', { bubbles: true })); }",
                false,
            )
            .await
            .map_err(|e| Error::JsError(e.to_string()))?;
        Ok(())
    }
}
