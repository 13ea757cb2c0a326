//! CDP page session for interacting with a single page.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::SinkExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

use super::client::{PendingRequest, WsSink};
use super::error::CdpError;
use super::protocol::{BoxModel, CdpRequest, KeyEventType, MouseButton, MouseEventType};

/// A session attached to a single page/target.
pub struct PageSession {
    /// Target ID.
    target_id: String,
    /// Session ID for this target.
    session_id: String,
    /// WebSocket sender (shared with client).
    ws_tx: Arc<tokio::sync::Mutex<WsSink>>,
    /// Pending requests (shared with client).
    pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    /// Request ID counter (shared with client).
    request_id: Arc<AtomicU64>,
}

impl PageSession {
    pub(crate) fn new(
        target_id: String,
        session_id: String,
        ws_tx: Arc<tokio::sync::Mutex<WsSink>>,
        pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
        request_id: Arc<AtomicU64>,
    ) -> Self {
        Self {
            target_id,
            session_id,
            ws_tx,
            pending,
            request_id,
        }
    }

    /// Get target ID.
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Send a CDP command to this page session.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CdpError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);

        let request = CdpRequest {
            id,
            method: method.to_string(),
            params,
            session_id: Some(self.session_id.clone()),
        };

        let json = serde_json::to_string(&request)?;
        trace!("CDP session send: {}", json);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, PendingRequest { tx });

        {
            let mut ws = self.ws_tx.lock().await;
            ws.send(Message::Text(json.into())).await?;
        }

        match tokio::time::timeout(std::time::Duration::from_secs(30), rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CdpError::SessionClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(CdpError::Timeout(format!("Request {} timed out", method)))
            }
        }
    }

    /// Enable required CDP domains.
    pub(crate) async fn enable_domains(&self) -> Result<(), CdpError> {
        self.call("Page.enable", None).await?;
        self.call("DOM.enable", None).await?;
        self.call("Runtime.enable", None).await?;

        debug!("Enabled CDP domains for session {}", self.session_id);
        Ok(())
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Navigate to URL and wait for the document to load.
    pub async fn navigate(&self, url: &str) -> Result<(), CdpError> {
        let result = self
            .call("Page.navigate", Some(json!({"url": url})))
            .await?;

        if let Some(error) = result.get("errorText") {
            return Err(CdpError::NavigationFailed(
                error.as_str().unwrap_or("Unknown error").to_string(),
            ));
        }

        self.wait_for_load().await?;

        debug!("Navigated to {}", url);
        Ok(())
    }

    /// Wait for page load by polling document readiness.
    pub async fn wait_for_load(&self) -> Result<(), CdpError> {
        let start = std::time::Instant::now();
        let timeout = std::time::Duration::from_secs(30);

        loop {
            let result = self.evaluate("document.readyState").await?;

            if let Some(state) = result.as_str() {
                if state == "complete" || state == "interactive" {
                    return Ok(());
                }
            }

            if start.elapsed() > timeout {
                return Err(CdpError::Timeout("Page load timeout".to_string()));
            }

            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    /// Get current URL.
    pub async fn get_url(&self) -> Result<String, CdpError> {
        let result = self.evaluate("window.location.href").await?;
        Ok(result.as_str().unwrap_or("").to_string())
    }

    /// Get page title.
    pub async fn get_title(&self) -> Result<String, CdpError> {
        let result = self.evaluate("document.title").await?;
        Ok(result.as_str().unwrap_or("").to_string())
    }

    // ========================================================================
    // JavaScript Execution
    // ========================================================================

    /// Evaluate JavaScript expression.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, CdpError> {
        let result = self
            .call(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let text = exception["text"].as_str().unwrap_or("Unknown error");
            return Err(CdpError::JavaScript(text.to_string()));
        }

        Ok(result["result"]["value"].clone())
    }

    // ========================================================================
    // Input - Mouse
    // ========================================================================

    /// Click at coordinates.
    pub async fn click(&self, x: f64, y: f64) -> Result<(), CdpError> {
        self.call(
            "Input.dispatchMouseEvent",
            Some(json!({
                "type": MouseEventType::MousePressed,
                "x": x,
                "y": y,
                "button": MouseButton::Left,
                "clickCount": 1,
            })),
        )
        .await?;

        self.call(
            "Input.dispatchMouseEvent",
            Some(json!({
                "type": MouseEventType::MouseReleased,
                "x": x,
                "y": y,
                "button": MouseButton::Left,
                "clickCount": 1,
            })),
        )
        .await?;

        debug!("Clicked at ({}, {})", x, y);
        Ok(())
    }

    /// Scroll by delta, dispatched at the given viewport point.
    pub async fn scroll(&self, x: f64, y: f64, delta_x: f64, delta_y: f64) -> Result<(), CdpError> {
        self.call(
            "Input.dispatchMouseEvent",
            Some(json!({
                "type": MouseEventType::MouseWheel,
                "x": x,
                "y": y,
                "deltaX": delta_x,
                "deltaY": delta_y,
            })),
        )
        .await?;
        Ok(())
    }

    // ========================================================================
    // Input - Keyboard
    // ========================================================================

    /// Type text into the focused element. Values are never logged here;
    /// callers route secrets through this path.
    pub async fn type_text(&self, text: &str) -> Result<(), CdpError> {
        self.call("Input.insertText", Some(json!({"text": text})))
            .await?;
        Ok(())
    }

    /// Press a key.
    pub async fn press_key(&self, key: &str) -> Result<(), CdpError> {
        self.call(
            "Input.dispatchKeyEvent",
            Some(json!({
                "type": KeyEventType::KeyDown,
                "key": key,
            })),
        )
        .await?;

        self.call(
            "Input.dispatchKeyEvent",
            Some(json!({
                "type": KeyEventType::KeyUp,
                "key": key,
            })),
        )
        .await?;

        Ok(())
    }

    /// Press key combination (e.g., "Control+a").
    pub async fn press_key_combo(&self, combo: &str) -> Result<(), CdpError> {
        let parts: Vec<&str> = combo.split('+').collect();
        let modifiers = Self::get_modifiers(&parts[..parts.len() - 1]);
        let key = parts.last().unwrap_or(&"");

        self.call(
            "Input.dispatchKeyEvent",
            Some(json!({
                "type": KeyEventType::KeyDown,
                "key": key,
                "modifiers": modifiers,
            })),
        )
        .await?;

        self.call(
            "Input.dispatchKeyEvent",
            Some(json!({
                "type": KeyEventType::KeyUp,
                "key": key,
                "modifiers": modifiers,
            })),
        )
        .await?;

        Ok(())
    }

    /// Get modifier flags from modifier names.
    fn get_modifiers(modifiers: &[&str]) -> i32 {
        let mut flags = 0;
        for m in modifiers {
            match m.to_lowercase().as_str() {
                "alt" => flags |= 1,
                "control" | "ctrl" => flags |= 2,
                "meta" | "command" | "cmd" => flags |= 4,
                "shift" => flags |= 8,
                _ => {}
            }
        }
        flags
    }

    // ========================================================================
    // DOM Operations
    // ========================================================================

    /// Get document root node id.
    async fn document_node_id(&self) -> Result<i64, CdpError> {
        let result = self.call("DOM.getDocument", Some(json!({"depth": 0}))).await?;
        result["root"]["nodeId"]
            .as_i64()
            .ok_or_else(|| CdpError::InvalidResponse("Missing document node".to_string()))
    }

    /// Query by CSS selector.
    pub async fn query_selector(&self, selector: &str) -> Result<Option<i64>, CdpError> {
        let root = self.document_node_id().await?;

        let result = self
            .call(
                "DOM.querySelector",
                Some(json!({
                    "nodeId": root,
                    "selector": selector,
                })),
            )
            .await?;

        let node_id = result["nodeId"].as_i64().unwrap_or(0);
        if node_id == 0 { Ok(None) } else { Ok(Some(node_id)) }
    }

    /// Query by XPath expression via DOM search.
    pub async fn query_xpath(&self, xpath: &str) -> Result<Option<i64>, CdpError> {
        // DOM search requires the document to have been requested at least once.
        self.document_node_id().await?;

        let result = self
            .call(
                "DOM.performSearch",
                Some(json!({
                    "query": xpath,
                    "includeUserAgentShadowDOM": false,
                })),
            )
            .await?;

        let search_id = result["searchId"]
            .as_str()
            .ok_or_else(|| CdpError::InvalidResponse("Missing searchId".to_string()))?
            .to_string();
        let count = result["resultCount"].as_i64().unwrap_or(0);

        let node_id = if count > 0 {
            let results = self
                .call(
                    "DOM.getSearchResults",
                    Some(json!({
                        "searchId": search_id,
                        "fromIndex": 0,
                        "toIndex": 1,
                    })),
                )
                .await?;
            results["nodeIds"]
                .as_array()
                .and_then(|ids| ids.first())
                .and_then(|v| v.as_i64())
        } else {
            None
        };

        let _ = self
            .call(
                "DOM.discardSearchResults",
                Some(json!({"searchId": search_id})),
            )
            .await;

        Ok(node_id)
    }

    /// Get box model for node. `None` when the node has no layout.
    pub async fn get_box_model(&self, node_id: i64) -> Result<Option<BoxModel>, CdpError> {
        let result = self
            .call("DOM.getBoxModel", Some(json!({"nodeId": node_id})))
            .await;

        match result {
            Ok(r) => {
                let model: BoxModel = serde_json::from_value(r["model"].clone())?;
                Ok(Some(model))
            }
            Err(CdpError::Protocol { code: -32000, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Scroll node into view if needed.
    pub async fn scroll_into_view(&self, node_id: i64) -> Result<(), CdpError> {
        self.call(
            "DOM.scrollIntoViewIfNeeded",
            Some(json!({"nodeId": node_id})),
        )
        .await?;
        Ok(())
    }

    /// Focus element.
    pub async fn focus(&self, node_id: i64) -> Result<(), CdpError> {
        self.call("DOM.focus", Some(json!({"nodeId": node_id})))
            .await?;
        Ok(())
    }

    /// Click on a node's center point.
    pub async fn click_node(&self, node_id: i64) -> Result<(), CdpError> {
        self.scroll_into_view(node_id).await?;

        let box_model = self
            .get_box_model(node_id)
            .await?
            .ok_or_else(|| CdpError::ElementNotFound("node has no layout".to_string()))?;

        let (x, y) = Self::quad_center(&box_model.content);
        self.click(x, y).await
    }

    /// Focus a node, clear its value, and type a replacement.
    pub async fn fill_node(&self, node_id: i64, value: &str) -> Result<(), CdpError> {
        self.focus(node_id).await?;
        self.press_key_combo("Control+a").await?;
        self.type_text(value).await?;
        Ok(())
    }

    /// Calculate center point of a quad.
    fn quad_center(quad: &[f64]) -> (f64, f64) {
        if quad.len() >= 8 {
            let x = (quad[0] + quad[2] + quad[4] + quad[6]) / 4.0;
            let y = (quad[1] + quad[3] + quad[5] + quad[7]) / 4.0;
            (x, y)
        } else {
            (0.0, 0.0)
        }
    }
}
