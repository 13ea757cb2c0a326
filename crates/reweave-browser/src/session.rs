//! Per-run browser session.
//!
//! Each replay run gets its own Chrome process with a throwaway profile and a
//! private debugging port. Closing the session tears the whole process down;
//! nothing is shared between runs.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use reweave_protocols::{DriverError, ElementSummary, PageDriver, PageSnapshot, Selector};

use crate::cdp::{CdpClient, CdpError, PageSession};

/// XPath of the form `//*[@id="foo"]`, from which a CSS id selector can be
/// derived when the raw XPath lookup fails.
static ID_XPATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^//\*\[@id=["']([^"']+)["']\]$"#).unwrap());

/// Browser session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Chrome executable. Auto-detected when unset.
    pub chrome_path: Option<PathBuf>,
    /// Whether to run Chrome headless.
    pub headless: bool,
    /// Viewport width.
    pub viewport_width: u32,
    /// Viewport height.
    pub viewport_height: u32,
    /// How long to wait for the debugging endpoint after spawning Chrome.
    pub launch_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            launch_timeout: Duration::from_secs(10),
        }
    }
}

/// One live Chrome process plus an attached page.
pub struct BrowserSession {
    config: SessionConfig,
    client: CdpClient,
    page: PageSession,
    chrome: Mutex<Option<Child>>,
    /// Throwaway profile, removed when the session is dropped.
    _profile_dir: tempfile::TempDir,
}

impl BrowserSession {
    /// Launch a fresh Chrome instance and open one page.
    pub async fn launch(config: SessionConfig) -> Result<Self, DriverError> {
        let chrome_path = config
            .chrome_path
            .clone()
            .or_else(Self::find_chrome)
            .ok_or_else(|| DriverError::Session("Chrome executable not found".to_string()))?;

        let profile_dir = tempfile::tempdir()
            .map_err(|e| DriverError::Session(format!("profile dir: {}", e)))?;

        let port = Self::free_port()?;
        let endpoint = format!("http://localhost:{}", port);

        info!(%port, headless = config.headless, "Launching Chrome");

        let mut cmd = Command::new(&chrome_path);
        cmd.arg(format!("--remote-debugging-port={}", port))
            .arg(format!("--user-data-dir={}", profile_dir.path().display()))
            .arg(format!(
                "--window-size={},{}",
                config.viewport_width, config.viewport_height
            ))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--metrics-recording-only")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // A failed launch must not orphan the process: any error return
            // below drops the child, which then gets killed.
            .kill_on_drop(true);

        if config.headless {
            cmd.arg("--headless=new");
        }

        let child = cmd
            .spawn()
            .map_err(|e| DriverError::Session(format!("failed to launch Chrome: {}", e)))?;

        debug!("Chrome launched with PID: {:?}", child.id());

        // Wait for the debugging endpoint to come up.
        let start = std::time::Instant::now();
        loop {
            tokio::time::sleep(Duration::from_millis(200)).await;
            if reqwest::get(format!("{}/json/version", endpoint)).await.is_ok() {
                break;
            }
            if start.elapsed() > config.launch_timeout {
                return Err(DriverError::Session(
                    "Chrome failed to start within timeout".to_string(),
                ));
            }
        }

        let client = CdpClient::connect(&endpoint).await?;
        let page = client.new_page(None).await?;

        Ok(Self {
            config,
            client,
            page,
            chrome: Mutex::new(Some(child)),
            _profile_dir: profile_dir,
        })
    }

    /// Find Chrome executable path.
    pub fn find_chrome() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            let paths = [
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                "/Applications/Chromium.app/Contents/MacOS/Chromium",
            ];
            for path in &paths {
                let p = PathBuf::from(path);
                if p.exists() {
                    return Some(p);
                }
            }
        }

        #[cfg(target_os = "linux")]
        {
            let paths = [
                "/usr/bin/google-chrome",
                "/usr/bin/google-chrome-stable",
                "/usr/bin/chromium",
                "/usr/bin/chromium-browser",
                "/snap/bin/chromium",
            ];
            for path in &paths {
                let p = PathBuf::from(path);
                if p.exists() {
                    return Some(p);
                }
            }
        }

        #[cfg(target_os = "windows")]
        {
            let paths = [
                r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            ];
            for path in &paths {
                let p = PathBuf::from(path);
                if p.exists() {
                    return Some(p);
                }
            }
        }

        None
    }

    /// Pick an unused local port for the debugging endpoint.
    fn free_port() -> Result<u16, DriverError> {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0))
            .map_err(|e| DriverError::Session(format!("port allocation: {}", e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| DriverError::Session(format!("port allocation: {}", e)))?
            .port();
        Ok(port)
    }

    /// Resolve a selector to a DOM node id. Tries CSS, then XPath, then a CSS
    /// id selector derived from an id-only XPath.
    async fn find_node(&self, selector: &Selector) -> Result<Option<i64>, CdpError> {
        if let Some(css) = &selector.css {
            if let Some(node) = self.page.query_selector(css).await? {
                return Ok(Some(node));
            }
        }

        if let Some(xpath) = &selector.xpath {
            if let Some(node) = self.page.query_xpath(xpath).await? {
                return Ok(Some(node));
            }

            if let Some(id) = Self::id_from_xpath(xpath) {
                let derived = format!("#{}", id);
                if let Some(node) = self.page.query_selector(&derived).await? {
                    debug!(xpath, derived, "Located element via derived id selector");
                    return Ok(Some(node));
                }
            }
        }

        Ok(None)
    }

    async fn require_node(&self, selector: &Selector) -> Result<i64, DriverError> {
        self.find_node(selector)
            .await?
            .ok_or_else(|| DriverError::ElementNotFound(selector.describe()))
    }

    fn id_from_xpath(xpath: &str) -> Option<&str> {
        ID_XPATH
            .captures(xpath)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// JS expression that evaluates to the selected element or null, using
    /// the same fallback chain as [`Self::find_node`].
    fn locate_js(selector: &Selector) -> String {
        let mut candidates = Vec::new();
        if let Some(css) = &selector.css {
            candidates.push(format!(
                "document.querySelector({})",
                Self::js_string(css)
            ));
        }
        if let Some(xpath) = &selector.xpath {
            candidates.push(format!(
                "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
                Self::js_string(xpath)
            ));
            if let Some(id) = Self::id_from_xpath(xpath) {
                candidates.push(format!(
                    "document.querySelector({})",
                    Self::js_string(&format!("#{}", id))
                ));
            }
        }

        if candidates.is_empty() {
            "null".to_string()
        } else {
            format!("({})", candidates.join(" || "))
        }
    }

    /// Escape a Rust string as a JS string literal.
    fn js_string(s: &str) -> String {
        serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
    }

    /// Choose an option in a dropdown that is not a native `<select>`: the
    /// widget has already been opened by a click; find a visible option-like
    /// element with matching text and click its center.
    async fn click_widget_option(&self, value: &str) -> Result<(), DriverError> {
        let script = format!(
            r#"JSON.stringify((function() {{
                const wanted = {value};
                const candidates = Array.from(
                    document.querySelectorAll('[role="option"], li, [class*="option"]')
                );
                const target = candidates.find(
                    el => el.textContent.trim() === wanted && el.offsetParent !== null
                );
                if (!target) return null;
                target.scrollIntoView({{block: 'center'}});
                const r = target.getBoundingClientRect();
                return {{x: r.left + r.width / 2, y: r.top + r.height / 2}};
            }})())"#,
            value = Self::js_string(value)
        );

        let result = self.page.evaluate(&script).await?;
        let point: Option<Value> = result
            .as_str()
            .and_then(|s| serde_json::from_str(s).ok());

        match point {
            Some(Value::Object(p)) => {
                let x = p["x"].as_f64().unwrap_or(0.0);
                let y = p["y"].as_f64().unwrap_or(0.0);
                self.page.click(x, y).await?;
                Ok(())
            }
            _ => Err(DriverError::ElementNotFound(format!(
                "dropdown option \"{}\"",
                value
            ))),
        }
    }
}

#[async_trait]
impl PageDriver for BrowserSession {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        self.page.navigate(url).await?;
        Ok(())
    }

    async fn wait_for(&self, selector: &Selector, timeout: Duration) -> Result<(), DriverError> {
        let start = std::time::Instant::now();
        loop {
            if self.find_node(selector).await?.is_some() {
                return Ok(());
            }
            if start.elapsed() > timeout {
                return Err(DriverError::Timeout(format!(
                    "waiting for {}",
                    selector.describe()
                )));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn click(&self, selector: &Selector) -> Result<(), DriverError> {
        let node = self.require_node(selector).await?;
        self.page.click_node(node).await?;
        Ok(())
    }

    async fn fill(&self, selector: &Selector, value: &str) -> Result<(), DriverError> {
        let node = self.require_node(selector).await?;
        self.page.fill_node(node, value).await?;
        Ok(())
    }

    async fn select(&self, selector: &Selector, value: &str) -> Result<(), DriverError> {
        let script = format!(
            r#"(function() {{
                const el = {locate};
                if (!el) return 'missing';
                if (el.tagName !== 'SELECT') return 'widget';
                const options = Array.from(el.options);
                const wanted = {value};
                const opt = options.find(o => o.value === wanted)
                    || options.find(o => o.textContent.trim() === wanted);
                if (!opt) return 'no_option';
                el.value = opt.value;
                el.dispatchEvent(new Event('input', {{bubbles: true}}));
                el.dispatchEvent(new Event('change', {{bubbles: true}}));
                return 'native';
            }})()"#,
            locate = Self::locate_js(selector),
            value = Self::js_string(value)
        );

        let outcome = self.page.evaluate(&script).await?;
        match outcome.as_str() {
            Some("native") => Ok(()),
            Some("no_option") => Err(DriverError::ElementNotFound(format!(
                "option \"{}\" in {}",
                value,
                selector.describe()
            ))),
            Some("widget") => {
                // Custom dropdown: open it, then click the matching option.
                let node = self.require_node(selector).await?;
                self.page.click_node(node).await?;
                tokio::time::sleep(Duration::from_millis(300)).await;
                self.click_widget_option(value).await
            }
            _ => Err(DriverError::ElementNotFound(selector.describe())),
        }
    }

    async fn press_key(&self, selector: &Selector, key: &str) -> Result<(), DriverError> {
        if !selector.is_empty() {
            let node = self.require_node(selector).await?;
            self.page.focus(node).await?;
        }
        self.page.press_key(key).await?;
        Ok(())
    }

    async fn scroll_by(&self, x: f64, y: f64) -> Result<(), DriverError> {
        let center_x = self.config.viewport_width as f64 / 2.0;
        let center_y = self.config.viewport_height as f64 / 2.0;
        self.page.scroll(center_x, center_y, x, y).await?;
        Ok(())
    }

    async fn is_visible(&self, selector: &Selector) -> Result<bool, DriverError> {
        match self.find_node(selector).await? {
            Some(node) => Ok(self.page.get_box_model(node).await?.is_some()),
            None => Ok(false),
        }
    }

    async fn page_snapshot(&self, max_elements: usize) -> Result<PageSnapshot, DriverError> {
        let script = format!(
            r#"JSON.stringify((function() {{
                const max = {max_elements};
                const cssPath = (el) => {{
                    if (el.id) return '#' + CSS.escape(el.id);
                    const parts = [];
                    let node = el;
                    while (node && node.nodeType === 1 && parts.length < 4) {{
                        if (node.id) {{
                            parts.unshift('#' + CSS.escape(node.id));
                            break;
                        }}
                        let part = node.tagName.toLowerCase();
                        const parent = node.parentElement;
                        if (parent) {{
                            const same = Array.from(parent.children)
                                .filter(c => c.tagName === node.tagName);
                            if (same.length > 1) {{
                                part += ':nth-of-type(' + (same.indexOf(node) + 1) + ')';
                            }}
                        }}
                        parts.unshift(part);
                        node = parent;
                    }}
                    return parts.join(' > ');
                }};
                const nodes = Array.from(document.querySelectorAll(
                    'a, button, input, select, textarea, [role="button"], [onclick]'
                ));
                const out = [];
                for (const el of nodes) {{
                    if (out.length >= max) break;
                    if (el.offsetParent === null) continue;
                    out.push({{
                        tag: el.tagName.toLowerCase(),
                        id: el.id || null,
                        name: el.getAttribute('name'),
                        input_type: el.getAttribute('type'),
                        placeholder: el.getAttribute('placeholder'),
                        aria_label: el.getAttribute('aria-label'),
                        text: (el.textContent || '').trim().substring(0, 80),
                        css_selector: cssPath(el)
                    }});
                }}
                return out;
            }})())"#
        );

        let raw = self.page.evaluate(&script).await?;
        let elements: Vec<ElementSummary> = raw
            .as_str()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();

        Ok(PageSnapshot {
            url: self.page.get_url().await?,
            title: self.page.get_title().await?,
            elements,
        })
    }

    async fn visible_text(&self, max_chars: usize) -> Result<String, DriverError> {
        let script = format!(
            "(document.body ? document.body.innerText : '').substring(0, {max_chars})"
        );
        let result = self.page.evaluate(&script).await?;
        Ok(result.as_str().unwrap_or("").to_string())
    }

    async fn close(&self) -> Result<(), DriverError> {
        if let Err(e) = self.client.close_page(self.page.target_id()).await {
            warn!("Failed to close page cleanly: {}", e);
        }

        if let Some(mut child) = self.chrome.lock().await.take() {
            debug!("Shutting down Chrome");
            let _ = child.kill().await;
        }

        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Best effort if close() was never called.
        if let Some(child) = self.chrome.get_mut().as_mut() {
            let _ = child.start_kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SessionConfig::default();
        assert!(config.headless);
        assert_eq!(config.viewport_width, 1280);
        assert_eq!(config.viewport_height, 720);
        assert_eq!(config.launch_timeout, Duration::from_secs(10));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_failed_launch_kills_spawned_process() {
        use std::os::unix::fs::PermissionsExt;

        // Stand-in Chrome that records its PID and never opens the
        // debugging port, so launch() fails on the readiness timeout.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-chrome.sh");
        let pid_file = dir.path().join("pid");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho $$ > {}\nexec sleep 60\n", pid_file.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = SessionConfig {
            chrome_path: Some(script),
            launch_timeout: Duration::from_millis(500),
            ..SessionConfig::default()
        };
        assert!(BrowserSession::launch(config).await.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        let pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok();
        let alive = stat
            .as_deref()
            .and_then(|s| s.rsplit_once(") "))
            .map(|(_, rest)| !rest.starts_with('Z'))
            .unwrap_or(false);
        assert!(
            !alive,
            "process {pid} still running after a failed launch"
        );
    }

    #[test]
    fn test_id_from_xpath() {
        assert_eq!(
            BrowserSession::id_from_xpath(r#"//*[@id="login-btn"]"#),
            Some("login-btn")
        );
        assert_eq!(
            BrowserSession::id_from_xpath("//*[@id='search']"),
            Some("search")
        );
        assert_eq!(BrowserSession::id_from_xpath("//div[2]/button"), None);
    }

    #[test]
    fn test_locate_js_fallback_chain() {
        let selector = Selector {
            css: Some("#login".to_string()),
            xpath: Some(r#"//*[@id="login"]"#.to_string()),
        };
        let js = BrowserSession::locate_js(&selector);
        assert!(js.contains("document.querySelector(\"#login\")"));
        assert!(js.contains("document.evaluate"));
        assert!(js.contains(" || "));
    }

    #[test]
    fn test_locate_js_empty_selector() {
        assert_eq!(BrowserSession::locate_js(&Selector::default()), "null");
    }

    #[test]
    fn test_js_string_escapes_quotes() {
        let lit = BrowserSession::js_string(r#"a "quoted" value"#);
        assert_eq!(lit, r#""a \"quoted\" value""#);
    }

    #[test]
    fn test_free_port_is_nonzero() {
        let port = BrowserSession::free_port().unwrap();
        assert!(port > 0);
    }
}
