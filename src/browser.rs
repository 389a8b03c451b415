use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::Browser as OxideBrowser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::layout::Point;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::Coordinates;
use crate::environment::{CaptureHandle, CoordinateSpace, Environment, Frame};
use crate::error::EnvironmentError;

#[derive(Clone, Debug)]
pub struct BrowserConfig {
    pub headless: bool,
    pub user_agent: Option<String>,
    pub viewport: (u32, u32),
    /// Pause between typed characters.
    pub keystroke_delay: Duration,
    /// Attach to an already running browser instead of launching one.
    pub ws_url: Option<String>,
    pub start_url: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: None,
            viewport: (1280, 800),
            keystroke_delay: Duration::from_millis(50),
            ws_url: None,
            start_url: None,
        }
    }
}

/// A single controlled page plus the browser process or connection behind it.
pub struct Browser {
    page: Page,
    inner: OxideBrowser,
    closed: CancellationToken,
    owned: bool,
}

impl Browser {
    pub async fn launch(cfg: &BrowserConfig) -> Result<Self> {
        let mut builder = chromiumoxide::browser::BrowserConfig::builder();
        if !cfg.headless {
            builder = builder.with_head();
        }
        // Unique profile per run so rapid restarts do not trip the profile lock.
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let mut profile_dir: PathBuf = std::env::temp_dir();
        profile_dir.push(format!("cua-operator-profile-{}-{}", std::process::id(), ts));
        let _ = std::fs::create_dir_all(&profile_dir);
        builder = builder
            .user_data_dir(profile_dir)
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        let bcfg = builder.build().map_err(|e| anyhow!(e))?;
        let (inner, handler) = OxideBrowser::launch(bcfg)
            .await
            .context("failed to launch chromium")?;
        let closed = Self::drive(handler);
        let page = inner.new_page("about:blank").await?;
        if let Some(ua) = &cfg.user_agent {
            page.set_user_agent(ua.clone()).await?;
        }
        let browser = Self { page, inner, closed, owned: true };
        browser.set_viewport(cfg.viewport.0, cfg.viewport.1).await?;
        Ok(browser)
    }

    /// Attaches to a running browser and takes over its first open page.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let (inner, handler) = OxideBrowser::connect(ws_url)
            .await
            .with_context(|| format!("failed to connect to {ws_url}"))?;
        let closed = Self::drive(handler);
        let page = match inner.pages().await?.into_iter().next() {
            Some(page) => page,
            None => inner.new_page("about:blank").await?,
        };
        Ok(Self { page, inner, closed, owned: false })
    }

    // The handler must be polled for the connection to make progress; when it
    // stops yielding the browser is gone.
    fn drive(mut handler: chromiumoxide::handler::Handler) -> CancellationToken {
        let closed = CancellationToken::new();
        let signal = closed.clone();
        tokio::spawn(async move {
            while let Some(ev) = handler.next().await {
                if let Err(e) = ev {
                    debug!(error = %e, "cdp handler event error");
                }
            }
            info!("browser connection closed");
            signal.cancel();
        });
        closed
    }

    /// Fires once the browser process or connection is gone.
    pub fn closed(&self) -> &CancellationToken {
        &self.closed
    }

    pub async fn close(mut self) -> Result<()> {
        if self.owned {
            self.inner.close().await?;
        }
        Ok(())
    }

    pub async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(width as i64)
            .height(height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| anyhow!(e))?;
        self.page.execute(metrics).await?;
        Ok(())
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    pub async fn url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    pub async fn move_mouse(&self, x: f64, y: f64) -> Result<()> {
        self.page.move_mouse(Point { x, y }).await?;
        Ok(())
    }

    pub async fn click(&self, x: f64, y: f64) -> Result<()> {
        let cmd = DispatchMouseEventParams::builder()
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1);
        let pressed = cmd
            .clone()
            .r#type(DispatchMouseEventType::MousePressed)
            .build()
            .map_err(|e| anyhow!(e))?;
        let released = cmd
            .r#type(DispatchMouseEventType::MouseReleased)
            .build()
            .map_err(|e| anyhow!(e))?;
        self.page
            .move_mouse(Point { x, y })
            .await?
            .execute(pressed)
            .await?;
        self.page.execute(released).await?;
        Ok(())
    }

    pub async fn wheel(&self, x: f64, y: f64, delta_y: f64) -> Result<()> {
        let cmd = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseWheel)
            .x(x)
            .y(y)
            .delta_x(0.0)
            .delta_y(delta_y)
            .build()
            .map_err(|e| anyhow!(e))?;
        self.page.execute(cmd).await?;
        Ok(())
    }

    /// Feeds text to the focused element one character at a time.
    pub async fn type_text(&self, text: &str, delay: Duration) -> Result<()> {
        for ch in text.chars() {
            self.page
                .execute(InsertTextParams { text: ch.to_string() })
                .await?;
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
        Ok(())
    }

    pub async fn press_key(&self, name: &str) -> Result<()> {
        let key = KeyDefinition::lookup(name);
        let mut down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(key.key.clone())
            .code(key.code.clone());
        if let Some(vk) = key.virtual_code {
            down = down.windows_virtual_key_code(vk).native_virtual_key_code(vk);
        }
        if let Some(text) = &key.text {
            down = down.text(text.clone());
        }
        self.page
            .execute(down.build().map_err(|e| anyhow!(e))?)
            .await?;

        let mut up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(key.key)
            .code(key.code);
        if let Some(vk) = key.virtual_code {
            up = up.windows_virtual_key_code(vk).native_virtual_key_code(vk);
        }
        self.page.execute(up.build().map_err(|e| anyhow!(e))?).await?;
        Ok(())
    }

    pub async fn screenshot(&self, format: ImageFormat) -> Result<Vec<u8>> {
        let params = match format {
            ImageFormat::Png => ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(false)
                .build(),
            ImageFormat::Jpeg { quality } => ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Jpeg)
                .quality(quality as i64)
                .full_page(false)
                .build(),
        };
        Ok(self.page.screenshot(params).await?)
    }

    pub async fn evaluate<T: serde::de::DeserializeOwned>(&self, js: &str) -> Result<T> {
        let result = self.page.evaluate(js).await?;
        Ok(result.into_value::<T>()?)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg { quality: u8 },
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg { .. } => "image/jpeg",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct KeyDefinition {
    key: String,
    code: String,
    virtual_code: Option<i64>,
    text: Option<String>,
}

impl KeyDefinition {
    fn lookup(name: &str) -> Self {
        let named = |key: &str, code: &str, vk: i64, text: Option<&str>| KeyDefinition {
            key: key.to_string(),
            code: code.to_string(),
            virtual_code: Some(vk),
            text: text.map(str::to_string),
        };
        match name.to_ascii_lowercase().as_str() {
            "enter" | "return" => named("Enter", "Enter", 13, Some("\r")),
            "tab" => named("Tab", "Tab", 9, None),
            "backspace" => named("Backspace", "Backspace", 8, None),
            "escape" | "esc" => named("Escape", "Escape", 27, None),
            "space" | " " => named(" ", "Space", 32, Some(" ")),
            "delete" => named("Delete", "Delete", 46, None),
            "arrowup" | "up" => named("ArrowUp", "ArrowUp", 38, None),
            "arrowdown" | "down" => named("ArrowDown", "ArrowDown", 40, None),
            "arrowleft" | "left" => named("ArrowLeft", "ArrowLeft", 37, None),
            "arrowright" | "right" => named("ArrowRight", "ArrowRight", 39, None),
            "home" => named("Home", "Home", 36, None),
            "end" => named("End", "End", 35, None),
            "pageup" => named("PageUp", "PageUp", 33, None),
            "pagedown" => named("PageDown", "PageDown", 34, None),
            _ => {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphanumeric() => KeyDefinition {
                        key: c.to_string(),
                        code: if c.is_ascii_digit() {
                            format!("Digit{c}")
                        } else {
                            format!("Key{}", c.to_ascii_uppercase())
                        },
                        virtual_code: Some(c.to_ascii_uppercase() as i64),
                        text: Some(c.to_string()),
                    },
                    _ => KeyDefinition {
                        key: name.to_string(),
                        code: name.to_string(),
                        virtual_code: None,
                        text: None,
                    },
                }
            }
        }
    }
}

fn unavailable(closed: &CancellationToken, e: anyhow::Error) -> EnvironmentError {
    if closed.is_cancelled() {
        EnvironmentError::Unavailable(format!("browser closed: {e}"))
    } else {
        EnvironmentError::Unavailable(e.to_string())
    }
}

// ========================= Driver-protocol surface =========================

/// Browser page driven over the DevTools protocol: native input events and
/// protocol screenshots, coordinates in device pixels.
pub struct ChromiumEnvironment {
    cfg: BrowserConfig,
    browser: Mutex<Option<Browser>>,
}

impl ChromiumEnvironment {
    pub fn new(cfg: BrowserConfig) -> Self {
        Self { cfg, browser: Mutex::new(None) }
    }

    async fn open(&self) -> Result<Browser> {
        let browser = match &self.cfg.ws_url {
            Some(ws) if !ws.trim().is_empty() => {
                let b = Browser::connect(ws).await?;
                b.set_viewport(self.cfg.viewport.0, self.cfg.viewport.1).await?;
                b
            }
            _ => Browser::launch(&self.cfg).await?,
        };
        if let Some(url) = &self.cfg.start_url {
            browser.goto(url).await?;
        }
        Ok(browser)
    }
}

#[async_trait]
impl Environment for ChromiumEnvironment {
    fn coordinate_space(&self) -> CoordinateSpace {
        CoordinateSpace::Pixels
    }

    async fn start_capture(&self) -> Result<CaptureHandle, EnvironmentError> {
        let mut slot = self.browser.lock().await;
        if let Some(existing) = slot.take() {
            if !existing.closed().is_cancelled() {
                *slot = Some(existing);
            }
        }
        if slot.is_none() {
            let browser = self
                .open()
                .await
                .map_err(|e| EnvironmentError::Unsupported(format!("{e:#}")))?;
            *slot = Some(browser);
        }
        let browser = slot
            .as_ref()
            .ok_or_else(|| EnvironmentError::Unsupported("no browser".into()))?;
        let handle = CaptureHandle::with_signal(browser.closed().child_token());
        let url = browser.url().await.unwrap_or_default();
        info!(capture = handle.id(), url = %url, "chromium capture started");
        Ok(handle)
    }

    async fn capture_frame(&self, handle: &CaptureHandle) -> Result<Frame, EnvironmentError> {
        handle.ensure_live()?;
        let slot = self.browser.lock().await;
        let browser = slot
            .as_ref()
            .ok_or_else(|| EnvironmentError::CaptureUnavailable("browser not running".into()))?;
        let bytes = browser
            .screenshot(ImageFormat::Png)
            .await
            .map_err(|e| EnvironmentError::CaptureUnavailable(e.to_string()))?;
        Ok(Frame {
            bytes,
            width: self.cfg.viewport.0,
            height: self.cfg.viewport.1,
            mime_type: ImageFormat::Png.mime_type().to_string(),
            capture_id: handle.id().to_string(),
        })
    }

    async fn pointer_click(&self, at: Coordinates) -> Result<(), EnvironmentError> {
        let slot = self.browser.lock().await;
        let b = live(&slot)?;
        b.click(at.x, at.y).await.map_err(|e| unavailable(b.closed(), e))
    }

    async fn pointer_move(&self, at: Coordinates) -> Result<(), EnvironmentError> {
        let slot = self.browser.lock().await;
        let b = live(&slot)?;
        b.move_mouse(at.x, at.y).await.map_err(|e| unavailable(b.closed(), e))
    }

    async fn pointer_scroll(&self, at: Coordinates, delta_y: i32) -> Result<(), EnvironmentError> {
        let slot = self.browser.lock().await;
        let b = live(&slot)?;
        b.wheel(at.x, at.y, delta_y as f64)
            .await
            .map_err(|e| unavailable(b.closed(), e))
    }

    async fn type_text(&self, text: &str) -> Result<(), EnvironmentError> {
        let slot = self.browser.lock().await;
        let b = live(&slot)?;
        b.type_text(text, self.cfg.keystroke_delay)
            .await
            .map_err(|e| unavailable(b.closed(), e))
    }

    async fn press_key(&self, name: &str) -> Result<(), EnvironmentError> {
        let slot = self.browser.lock().await;
        let b = live(&slot)?;
        b.press_key(name).await.map_err(|e| unavailable(b.closed(), e))
    }

    async fn stop_capture(&self, handle: &CaptureHandle) -> Result<(), EnvironmentError> {
        if !handle.release() {
            debug!(capture = handle.id(), "capture already released");
            return Ok(());
        }
        let browser = self.browser.lock().await.take();
        if let Some(b) = browser {
            if let Err(e) = b.close().await {
                warn!(capture = handle.id(), error = %e, "failed to close browser");
            }
        }
        info!(capture = handle.id(), "chromium capture stopped");
        Ok(())
    }
}

fn live(slot: &Option<Browser>) -> Result<&Browser, EnvironmentError> {
    match slot {
        Some(b) if !b.closed().is_cancelled() => Ok(b),
        Some(_) => Err(EnvironmentError::Unavailable("browser closed".into())),
        None => Err(EnvironmentError::Unavailable("no live capture".into())),
    }
}

// ========================= In-page synthetic surface =========================

#[derive(Clone, Debug)]
pub struct DomConfig {
    /// DevTools websocket of the browser hosting the page to operate.
    pub ws_url: String,
    /// Ask the page's user for consent before capturing.
    pub ask_consent: bool,
    pub jpeg_quality: u8,
    pub keystroke_delay: Duration,
}

impl Default for DomConfig {
    fn default() -> Self {
        Self {
            ws_url: std::env::var("CHROME_WS_URL").unwrap_or_default(),
            ask_consent: true,
            jpeg_quality: 70,
            keystroke_delay: Duration::from_millis(50),
        }
    }
}

const CONSENT_PROMPT: &str = "An operator wants to view and control this page. Allow?";

/// A live page observed through display capture and driven with synthetic
/// DOM events dispatched from inside the page. Coordinates are fractions of
/// the visible viewport.
pub struct DomEnvironment {
    cfg: DomConfig,
    browser: Mutex<Option<Browser>>,
    viewport: StdMutex<(u32, u32)>,
}

impl DomEnvironment {
    pub fn new(cfg: DomConfig) -> Self {
        Self {
            cfg,
            browser: Mutex::new(None),
            viewport: StdMutex::new((0, 0)),
        }
    }

    fn to_pixels(&self, at: Coordinates) -> (f64, f64) {
        let (w, h) = self.viewport.lock().map(|v| *v).unwrap_or((0, 0));
        CoordinateSpace::Normalized.to_pixels(at, w, h)
    }

    async fn run(&self, js: String) -> Result<bool, EnvironmentError> {
        let slot = self.browser.lock().await;
        let b = live(&slot)?;
        b.evaluate::<bool>(&js).await.map_err(|e| unavailable(b.closed(), e))
    }
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl Environment for DomEnvironment {
    fn coordinate_space(&self) -> CoordinateSpace {
        CoordinateSpace::Normalized
    }

    async fn start_capture(&self) -> Result<CaptureHandle, EnvironmentError> {
        if self.cfg.ws_url.trim().is_empty() {
            return Err(EnvironmentError::Unsupported(
                "no DevTools websocket configured for page capture".into(),
            ));
        }
        let browser = Browser::connect(&self.cfg.ws_url)
            .await
            .map_err(|e| EnvironmentError::Unsupported(format!("{e:#}")))?;
        if self.cfg.ask_consent {
            let js = format!("window.confirm({})", js_string(CONSENT_PROMPT));
            let granted = browser
                .evaluate::<bool>(&js)
                .await
                .map_err(|e| EnvironmentError::PermissionDenied(e.to_string()))?;
            if !granted {
                return Err(EnvironmentError::PermissionDenied(
                    "capture declined on the page".into(),
                ));
            }
        }
        let handle = CaptureHandle::with_signal(browser.closed().child_token());
        *self.browser.lock().await = Some(browser);
        info!(capture = handle.id(), "page capture started");
        Ok(handle)
    }

    async fn capture_frame(&self, handle: &CaptureHandle) -> Result<Frame, EnvironmentError> {
        handle.ensure_live()?;
        let slot = self.browser.lock().await;
        let b = slot
            .as_ref()
            .ok_or_else(|| EnvironmentError::CaptureUnavailable("page not attached".into()))?;
        let (w, h) = b
            .evaluate::<(u32, u32)>("[window.innerWidth, window.innerHeight]")
            .await
            .map_err(|e| EnvironmentError::CaptureUnavailable(e.to_string()))?;
        let format = ImageFormat::Jpeg { quality: self.cfg.jpeg_quality };
        let bytes = b
            .screenshot(format)
            .await
            .map_err(|e| EnvironmentError::CaptureUnavailable(e.to_string()))?;
        if let Ok(mut v) = self.viewport.lock() {
            *v = (w, h);
        }
        Ok(Frame {
            bytes,
            width: w,
            height: h,
            mime_type: format.mime_type().to_string(),
            capture_id: handle.id().to_string(),
        })
    }

    async fn pointer_click(&self, at: Coordinates) -> Result<(), EnvironmentError> {
        let (x, y) = self.to_pixels(at);
        let js = format!(
            r#"(function() {{
              const el = document.elementFromPoint({x}, {y});
              if (!el) return false;
              const opts = {{clientX: {x}, clientY: {y}, bubbles: true, cancelable: true, view: window}};
              el.dispatchEvent(new MouseEvent("mousedown", opts));
              el.dispatchEvent(new MouseEvent("mouseup", opts));
              el.dispatchEvent(new MouseEvent("click", opts));
              if (typeof el.focus === "function") el.focus();
              return true;
            }})()"#
        );
        if !self.run(js).await? {
            warn!(x, y, "no element under synthetic click");
        }
        Ok(())
    }

    async fn pointer_move(&self, at: Coordinates) -> Result<(), EnvironmentError> {
        let (x, y) = self.to_pixels(at);
        let js = format!(
            r#"(function() {{
              const el = document.elementFromPoint({x}, {y}) || document.body;
              const opts = {{clientX: {x}, clientY: {y}, bubbles: true, view: window}};
              el.dispatchEvent(new MouseEvent("mousemove", opts));
              el.dispatchEvent(new MouseEvent("mouseover", opts));
              return true;
            }})()"#
        );
        self.run(js).await.map(|_| ())
    }

    async fn pointer_scroll(&self, at: Coordinates, delta_y: i32) -> Result<(), EnvironmentError> {
        let (x, y) = self.to_pixels(at);
        let js = format!(
            r#"(function() {{
              const el = document.elementFromPoint({x}, {y}) || document.scrollingElement || document.body;
              el.dispatchEvent(new WheelEvent("wheel", {{clientX: {x}, clientY: {y}, deltaY: {delta_y}, bubbles: true}}));
              let node = el;
              while (node && node !== document.body && node.scrollHeight <= node.clientHeight) {{
                node = node.parentElement;
              }}
              if (node && node !== document.body) node.scrollBy(0, {delta_y});
              else window.scrollBy(0, {delta_y});
              return true;
            }})()"#
        );
        self.run(js).await.map(|_| ())
    }

    async fn type_text(&self, text: &str) -> Result<(), EnvironmentError> {
        let editable = r#"(function() {
              const el = document.activeElement;
              return !!el && (el.isContentEditable || el.tagName === "INPUT" || el.tagName === "TEXTAREA");
            })()"#;
        if !self.run(editable.to_string()).await? {
            return Err(EnvironmentError::InputRejected(
                "focused element does not accept text".into(),
            ));
        }
        for ch in text.chars() {
            let c = js_string(&ch.to_string());
            let js = format!(
                r#"(function() {{
                  const el = document.activeElement;
                  if (!el) return false;
                  el.dispatchEvent(new KeyboardEvent("keydown", {{key: {c}, bubbles: true}}));
                  if (el.isContentEditable) {{
                    el.textContent = (el.textContent || "") + {c};
                  }} else {{
                    el.value = (el.value || "") + {c};
                  }}
                  el.dispatchEvent(new InputEvent("input", {{data: {c}, inputType: "insertText", bubbles: true}}));
                  el.dispatchEvent(new KeyboardEvent("keyup", {{key: {c}, bubbles: true}}));
                  return true;
                }})()"#
            );
            if !self.run(js).await? {
                return Err(EnvironmentError::InputRejected("focus lost while typing".into()));
            }
            if !self.cfg.keystroke_delay.is_zero() {
                sleep(self.cfg.keystroke_delay).await;
            }
        }
        Ok(())
    }

    async fn press_key(&self, name: &str) -> Result<(), EnvironmentError> {
        let key = KeyDefinition::lookup(name);
        let (k, code) = (js_string(&key.key), js_string(&key.code));
        let js = format!(
            r#"(function() {{
              const el = document.activeElement;
              if (!el) return false;
              const opts = {{key: {k}, code: {code}, bubbles: true, cancelable: true}};
              const proceed = el.dispatchEvent(new KeyboardEvent("keydown", opts));
              el.dispatchEvent(new KeyboardEvent("keyup", opts));
              if (proceed && {k} === "Enter" && el.form) {{
                if (typeof el.form.requestSubmit === "function") el.form.requestSubmit();
                else el.form.submit();
              }}
              return true;
            }})()"#
        );
        if !self.run(js).await? {
            return Err(EnvironmentError::InputRejected("no element has focus".into()));
        }
        Ok(())
    }

    async fn stop_capture(&self, handle: &CaptureHandle) -> Result<(), EnvironmentError> {
        if !handle.release() {
            debug!(capture = handle.id(), "capture already released");
            return Ok(());
        }
        // Detach only; the page belongs to its user.
        self.browser.lock().await.take();
        info!(capture = handle.id(), "page capture stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_carries_carriage_return() {
        let k = KeyDefinition::lookup("Enter");
        assert_eq!(k.key, "Enter");
        assert_eq!(k.virtual_code, Some(13));
        assert_eq!(k.text.as_deref(), Some("\r"));
    }

    #[test]
    fn single_characters_map_to_key_codes() {
        let k = KeyDefinition::lookup("a");
        assert_eq!(k.code, "KeyA");
        assert_eq!(k.virtual_code, Some(65));
        assert_eq!(KeyDefinition::lookup("7").code, "Digit7");
    }

    #[test]
    fn unrecognized_names_pass_through() {
        let k = KeyDefinition::lookup("F13");
        assert_eq!(k.key, "F13");
        assert_eq!(k.virtual_code, None);
    }

    #[test]
    fn js_strings_are_escaped() {
        assert_eq!(js_string("a\"b"), r#""a\"b""#);
    }

    #[test]
    fn dom_surface_without_websocket_is_unsupported() {
        let env = DomEnvironment::new(DomConfig { ws_url: String::new(), ..DomConfig::default() });
        let err = futures::executor::block_on(env.start_capture()).unwrap_err();
        assert!(matches!(err, EnvironmentError::Unsupported(_)));
    }
}
