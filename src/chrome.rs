use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use headless_chrome::browser::tab::{RequestPausedDecision, Tab};
use headless_chrome::browser::transport::{SessionId, Transport};
use headless_chrome::protocol::cdp::Emulation;
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Fetch::{FailRequest, RequestPattern, RequestStage};
use headless_chrome::protocol::cdp::Network::{ErrorReason, ResourceType};
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use tracing::{debug, info, warn};

use crate::page::PageDriver;
use crate::resource_filter::{ResourceFilter, ResourceKind};
use crate::selector::{Control, ControlKind};

/// Lists visible controls of one kind and tags each with its index so later
/// calls can address it. Reads the DOM only; the tag attribute is the sole
/// mutation.
///
/// Labels follow the accessible-name rules that matter on the portal:
/// `<label for>`, `aria-label`, `aria-labelledby`, then `title`.
const CONTROLS_JS: &str = r#"
(() => {
  const kind = __KIND__;
  const attr = 'data-cita-' + kind;
  const queries = {
    select: 'select',
    input: 'input:not([type=hidden]):not([type=submit]):not([type=button]):not([type=checkbox]):not([type=radio]):not([type=image]), textarea',
    button: 'button, input[type=submit], input[type=button], [role=button]',
  };

  function isVisible(el) {
    if (el.offsetParent === null) return false;
    const s = getComputedStyle(el);
    return s.display !== 'none' && s.visibility !== 'hidden' && s.opacity !== '0';
  }
  const clean = s => (s || '').replace(/\s+/g, ' ').trim();

  function labelOf(el) {
    const parts = [];
    if (el.labels) for (const l of el.labels) parts.push(l.innerText);
    const aria = el.getAttribute('aria-label');
    if (aria) parts.push(aria);
    const by = el.getAttribute('aria-labelledby');
    if (by) {
      for (const id of by.split(/\s+/)) {
        const n = document.getElementById(id);
        if (n) parts.push(n.innerText);
      }
    }
    if (!parts.length && el.title) parts.push(el.title);
    return clean(parts.join(' '));
  }

  function nameOf(el) {
    const aria = el.getAttribute('aria-label');
    if (aria) return clean(aria);
    if (el.tagName === 'INPUT') return clean(el.value);
    return clean(el.innerText || el.textContent);
  }

  document.querySelectorAll('[' + attr + ']').forEach(el => el.removeAttribute(attr));

  const out = [];
  for (const el of document.querySelectorAll(queries[kind])) {
    if (!isVisible(el)) continue;
    el.setAttribute(attr, String(out.length));
    out.push({
      name: kind === 'button' ? nameOf(el) : labelOf(el),
      options: kind === 'select'
        ? Array.from(el.options).map(o => ({ text: clean(o.text), value: o.value || '' }))
        : [],
    });
  }
  return JSON.stringify(out);
})()
"#;

const SELECT_JS: &str = r#"
(() => {
  const el = document.querySelector('[data-cita-select="__INDEX__"]');
  if (!el) return false;
  el.value = __VALUE__;
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
  return el.value === __VALUE__;
})()
"#;

const CLEAR_JS: &str = r#"
(() => {
  const el = document.querySelector('[data-cita-input="__INDEX__"]');
  if (!el) return false;
  el.value = '';
  return true;
})()
"#;

const DOCUMENT_TOKEN_JS: &str = r#"
(() => {
  if (!window.__citaWatchDoc) {
    window.__citaWatchDoc = Date.now().toString(36) + Math.random().toString(36).slice(2);
  }
  return window.__citaWatchDoc;
})()
"#;

/// How to start Chrome for a run.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    /// IANA zone the page sees as its local time.
    pub timezone: String,
    pub filter: ResourceFilter,
}

/// One Chrome process with a single tab. Owned by a single run.
pub struct BrowserSession {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl BrowserSession {
    pub fn launch(config: &LaunchConfig) -> Result<Self> {
        let options = LaunchOptions {
            headless: config.headless,
            path: config.chrome_path.clone(),
            args: vec![
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--lang=es-ES"),
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
            ],
            idle_browser_timeout: Duration::from_secs(120),
            ..Default::default()
        };

        info!(headless = config.headless, "starting chrome");
        let browser = Browser::new(options).map_err(|e| anyhow!("browser launch failed: {}", e))?;

        let tab = browser.new_tab().context("creating tab")?;
        tab.set_default_timeout(Duration::from_secs(15));
        tab.call_method(Emulation::SetTimezoneOverride {
            timezone_id: config.timezone.clone(),
        })
        .context("overriding timezone")?;
        install_resource_filter(&tab, config.filter.clone())?;

        debug!("chrome ready");
        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    fn eval_string(&self, js: &str) -> Result<String> {
        let result = self.tab.evaluate(js, false)?;
        result
            .value
            .and_then(|v| v.as_str().map(String::from))
            .ok_or_else(|| anyhow!("script returned no string"))
    }

    fn eval_bool(&self, js: &str) -> Result<bool> {
        let result = self.tab.evaluate(js, false)?;
        Ok(result.value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    fn tagged(&self, kind: ControlKind, index: usize) -> String {
        format!("[data-cita-{}=\"{}\"]", kind.as_str(), index)
    }
}

/// Abort image and font requests before they leave the browser.
fn install_resource_filter(tab: &Arc<Tab>, filter: ResourceFilter) -> Result<()> {
    let patterns = vec![RequestPattern {
        url_pattern: None,
        resource_Type: None,
        request_stage: Some(RequestStage::Request),
    }];
    tab.enable_fetch(Some(&patterns), None)
        .context("enabling request interception")?;

    let blocked = filter.blocked().to_vec();

    tab.enable_request_interception(Arc::new(
        move |_transport: Arc<Transport>, _session_id: SessionId, paused: RequestPausedEvent| {
            let kind = resource_kind(&paused.params.resource_Type);
            if filter.allows(kind) {
                RequestPausedDecision::Continue(None)
            } else {
                RequestPausedDecision::Fail(FailRequest {
                    request_id: paused.params.request_id,
                    error_reason: ErrorReason::BlockedByClient,
                })
            }
        },
    ))?;
    debug!(?blocked, "resource filter installed");
    Ok(())
}

fn resource_kind(kind: &ResourceType) -> ResourceKind {
    match kind {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Stylesheet => ResourceKind::Stylesheet,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::Image => ResourceKind::Image,
        ResourceType::Font => ResourceKind::Font,
        _ => ResourceKind::Other,
    }
}

/// Clip covering the whole scrollable document, not just the viewport.
fn full_page_clip(width: f64, height: f64) -> Page::Viewport {
    Page::Viewport {
        x: 0.0,
        y: 0.0,
        width: width.ceil().max(1.0),
        height: height.ceil().max(1.0),
        scale: 1.0,
    }
}

fn decode_png(data: &str) -> Result<Vec<u8>> {
    STANDARD.decode(data).context("decoding screenshot data")
}

impl PageDriver for BrowserSession {
    fn navigate(&self, url: &str) -> Result<()> {
        self.tab.navigate_to(url)?;
        Ok(())
    }

    fn ready_state(&self) -> Result<String> {
        self.eval_string("document.readyState")
    }

    fn document_token(&self) -> Result<String> {
        self.eval_string(DOCUMENT_TOKEN_JS)
    }

    fn controls(&self, kind: ControlKind) -> Result<Vec<Control>> {
        let js = CONTROLS_JS.replace("__KIND__", &serde_json::to_string(kind.as_str())?);
        let raw = self.eval_string(&js)?;
        serde_json::from_str(&raw).context("decoding control snapshot")
    }

    fn select(&self, index: usize, value: &str) -> Result<()> {
        let js = SELECT_JS
            .replace("__INDEX__", &index.to_string())
            .replace("__VALUE__", &serde_json::to_string(value)?);
        if !self.eval_bool(&js)? {
            anyhow::bail!("select #{} did not take value {:?}", index + 1, value);
        }
        Ok(())
    }

    fn fill(&self, index: usize, text: &str) -> Result<()> {
        let el = self.tab.find_element(&self.tagged(ControlKind::TextInput, index))?;
        el.click()?;
        if !self.eval_bool(&CLEAR_JS.replace("__INDEX__", &index.to_string()))? {
            anyhow::bail!("input #{} disappeared before typing", index + 1);
        }
        self.tab.type_str(text)?;
        Ok(())
    }

    fn click(&self, index: usize) -> Result<()> {
        let el = self.tab.find_element(&self.tagged(ControlKind::Button, index))?;
        el.click()?;
        Ok(())
    }

    fn body_text(&self) -> Result<String> {
        self.eval_string("document.body ? document.body.innerText : ''")
    }

    fn screenshot(&self, path: &Path) -> Result<()> {
        let size = self
            .tab
            .call_method(Page::GetLayoutMetrics(None))
            .context("reading page size")?
            .css_content_size;
        let data = self
            .tab
            .call_method(Page::CaptureScreenshot {
                format: Some(Page::CaptureScreenshotFormatOption::Png),
                quality: None,
                clip: Some(full_page_clip(size.width, size.height)),
                from_surface: Some(true),
                capture_beyond_viewport: Some(true),
                optimize_for_speed: None,
            })?
            .data;
        let png = decode_png(&data)?;
        std::fs::write(path, png).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    fn close(&self) {
        if let Err(e) = self.tab.close(true) {
            warn!("closing tab failed: {:#}", e);
        }
    }
}
