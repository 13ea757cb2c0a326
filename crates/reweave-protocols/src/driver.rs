//! Browser driver seam.
//!
//! The replay engine never touches a page handle directly; it talks to the
//! browser through [`PageDriver`]. The production implementation lives in
//! `reweave-browser` (CDP); tests use the mockall mock behind the `mocks`
//! feature.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DriverError;
use crate::workflow::Selector;

/// One interactive element in a page snapshot, as shown to the repair model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementSummary {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    /// Visible text, truncated by the driver.
    #[serde(default)]
    pub text: String,
    /// Best-effort unique CSS selector for this element.
    pub css_selector: String,
}

impl ElementSummary {
    /// One-line rendering for the repair prompt.
    pub fn to_prompt_line(&self, index: usize) -> String {
        let mut parts = vec![format!("[{index}]")];

        match &self.input_type {
            Some(t) => parts.push(format!("<{} type={}>", self.tag, t)),
            None => parts.push(format!("<{}>", self.tag)),
        }

        if !self.text.is_empty() {
            parts.push(format!("\"{}\"", self.text.replace('\n', " ")));
        }
        if let Some(id) = &self.id {
            parts.push(format!("id={id}"));
        }
        if let Some(name) = &self.name {
            parts.push(format!("name={name}"));
        }
        if let Some(placeholder) = &self.placeholder {
            parts.push(format!("placeholder=\"{placeholder}\""));
        }
        if let Some(aria) = &self.aria_label {
            parts.push(format!("aria-label=\"{aria}\""));
        }
        parts.push(format!("selector: {}", self.css_selector));

        parts.join(" ")
    }
}

/// A condensed, size-bounded structural snapshot of the current page.
///
/// This is the only page representation the repair advisor ever sees; the
/// live driver handle is not exposed to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub elements: Vec<ElementSummary>,
}

impl PageSnapshot {
    /// Render the snapshot as prompt text.
    pub fn to_prompt_string(&self) -> String {
        let mut out = format!("URL: {}\nTitle: {}\nInteractive elements:\n", self.url, self.title);
        for (i, el) in self.elements.iter().enumerate() {
            out.push_str(&el.to_prompt_line(i));
            out.push('\n');
        }
        out
    }
}

/// Exclusive handle to one live page in one browser session.
///
/// Implementations own the session lifecycle: dropping or closing the driver
/// tears the browser session down. All waits are bounded; an operation that
/// cannot complete within its bound returns [`DriverError::Timeout`].
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate the page and wait for the document to load.
    async fn goto(&self, url: &str) -> Result<(), DriverError>;

    /// Wait for an element to appear, up to `timeout`.
    async fn wait_for(&self, selector: &Selector, timeout: Duration) -> Result<(), DriverError>;

    /// Click the element's center point.
    async fn click(&self, selector: &Selector) -> Result<(), DriverError>;

    /// Focus the element, clear it, and type `value`. Implementations must
    /// never log the value; callers pass secrets through here.
    async fn fill(&self, selector: &Selector, value: &str) -> Result<(), DriverError>;

    /// Choose a dropdown option by value or visible label. Native `<select>`
    /// elements are set directly; other widgets are opened and the option
    /// located by text. The distinction is made from element shape at run
    /// time.
    async fn select(&self, selector: &Selector, value: &str) -> Result<(), DriverError>;

    /// Press a key with the element focused (empty selector targets the page).
    async fn press_key(&self, selector: &Selector, key: &str) -> Result<(), DriverError>;

    /// Scroll the viewport by an offset.
    async fn scroll_by(&self, x: f64, y: f64) -> Result<(), DriverError>;

    /// Whether the element currently exists and has layout.
    async fn is_visible(&self, selector: &Selector) -> Result<bool, DriverError>;

    /// Condensed interactive-element snapshot, bounded to `max_elements`.
    async fn page_snapshot(&self, max_elements: usize) -> Result<PageSnapshot, DriverError>;

    /// Visible text content of the page (for extraction prompts), truncated
    /// to `max_chars`.
    async fn visible_text(&self, max_chars: usize) -> Result<String, DriverError>;

    /// Tear down the browser session.
    async fn close(&self) -> Result<(), DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_summary_prompt_line() {
        let el = ElementSummary {
            tag: "input".to_string(),
            id: Some("search".to_string()),
            input_type: Some("text".to_string()),
            placeholder: Some("Search...".to_string()),
            text: String::new(),
            css_selector: "#search".to_string(),
            ..Default::default()
        };
        let line = el.to_prompt_line(4);
        assert!(line.starts_with("[4] <input type=text>"));
        assert!(line.contains("id=search"));
        assert!(line.contains("selector: #search"));
    }

    #[test]
    fn test_snapshot_prompt_string() {
        let snapshot = PageSnapshot {
            url: "https://example.com".to_string(),
            title: "Example".to_string(),
            elements: vec![ElementSummary {
                tag: "button".to_string(),
                text: "Submit".to_string(),
                css_selector: "button.submit".to_string(),
                ..Default::default()
            }],
        };
        let text = snapshot.to_prompt_string();
        assert!(text.contains("URL: https://example.com"));
        assert!(text.contains("[0] <button> \"Submit\""));
    }
}
