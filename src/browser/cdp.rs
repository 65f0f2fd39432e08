//! CDP-backed automation engine over chromiumoxide.
//!
//! Each session connects to its worker's WebSocket endpoint; contexts map to
//! CDP browser contexts; pages map to targets created inside them. Cookies
//! travel through the `Storage` domain; seeded local storage is replayed by
//! visiting each origin once.

use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::browser_protocol::storage::{GetCookiesParams, SetCookiesParams};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, Page};
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::browser::engine::{
    AutomationEngine, BrowserHandle, ContextHandle, DisconnectHook, PageHandle,
};
use crate::models::storage::{Cookie, OriginState, StorageState};
use crate::{AppError, Result};

/// Automation engine speaking the Chrome DevTools Protocol.
#[derive(Debug, Default)]
pub struct CdpEngine;

impl CdpEngine {
    /// Construct the engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AutomationEngine for CdpEngine {
    async fn connect(
        &self,
        endpoint: &str,
        on_disconnect: DisconnectHook,
    ) -> Result<Arc<dyn BrowserHandle>> {
        let (browser, mut handler) = match Browser::connect(endpoint).await {
            Ok(connected) => connected,
            Err(first_err) => {
                // Workers exposing a raw DevTools port advertise their
                // WebSocket URL on /json/version instead of accepting
                // arbitrary paths; discover it and retry once.
                let Some(discovered) = discover_debugger_url(endpoint).await else {
                    return Err(AppError::Automation(format!(
                        "connect to {endpoint} failed: {first_err}"
                    )));
                };
                debug!(endpoint, %discovered, "falling back to advertised debugger url");
                Browser::connect(&discovered).await.map_err(|err| {
                    AppError::Automation(format!("connect to {discovered} failed: {err}"))
                })?
            }
        };

        // The handler stream drives all CDP traffic; its end means the
        // connection is gone, however that happened.
        let event_loop = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            on_disconnect();
        });

        Ok(Arc::new(CdpBrowser {
            browser: Arc::new(Mutex::new(browser)),
            _event_loop: event_loop,
        }))
    }
}

struct CdpBrowser {
    browser: Arc<Mutex<Browser>>,
    _event_loop: tokio::task::JoinHandle<()>,
}

#[async_trait]
impl BrowserHandle for CdpBrowser {
    async fn new_context(&self, seed: Option<StorageState>) -> Result<Arc<dyn ContextHandle>> {
        let context_id = {
            let browser = self.browser.lock().await;
            browser
                .create_browser_context(CreateBrowserContextParams::default())
                .await
                .map_err(automation)?
        };

        let context = CdpContext {
            browser: Arc::clone(&self.browser),
            context_id,
            seeded_origins: Mutex::new(Vec::new()),
        };

        if let Some(state) = seed {
            context.seed(state).await?;
        }

        Ok(Arc::new(context))
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.map_err(automation)?;
        Ok(())
    }
}

struct CdpContext {
    browser: Arc<Mutex<Browser>>,
    context_id: chromiumoxide::cdp::browser_protocol::browser::BrowserContextId,
    /// Last seeded origin snapshot, reported back by `storage_state`.
    /// Live local-storage mutations after the seed are not re-captured.
    seeded_origins: Mutex<Vec<OriginState>>,
}

impl CdpContext {
    async fn seed(&self, state: StorageState) -> Result<()> {
        if !state.cookies.is_empty() {
            let cookies = cookies_to_cdp(&state.cookies)?;
            let browser = self.browser.lock().await;
            browser
                .execute(SetCookiesParams {
                    cookies,
                    browser_context_id: Some(self.context_id.clone()),
                })
                .await
                .map_err(automation)?;
        }

        for origin in &state.origins {
            if let Err(err) = self.replay_origin(origin).await {
                warn!(origin = %origin.origin, %err, "failed to seed local storage");
            }
        }

        *self.seeded_origins.lock().await = state.origins;
        Ok(())
    }

    /// Visit an origin once and write its local-storage entries.
    async fn replay_origin(&self, origin: &OriginState) -> Result<()> {
        let page = self.open_page().await?;
        page.goto(origin.origin.as_str()).await.map_err(automation)?;
        for entry in &origin.local_storage {
            let script = format!(
                "localStorage.setItem({}, {})",
                serde_json::to_string(&entry.name)?,
                serde_json::to_string(&entry.value)?,
            );
            page.evaluate(script).await.map_err(automation)?;
        }
        page.close().await.map_err(automation)?;
        Ok(())
    }

    async fn open_page(&self) -> Result<Page> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.context_id.clone())
            .build()
            .map_err(AppError::Automation)?;
        let browser = self.browser.lock().await;
        browser.new_page(params).await.map_err(automation)
    }
}

#[async_trait]
impl ContextHandle for CdpContext {
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>> {
        let page = self.open_page().await?;
        Ok(Arc::new(CdpPage { page }))
    }

    async fn storage_state(&self) -> Result<StorageState> {
        let response = {
            let browser = self.browser.lock().await;
            browser
                .execute(GetCookiesParams {
                    browser_context_id: Some(self.context_id.clone()),
                })
                .await
                .map_err(automation)?
        };
        let cookies = cookies_from_cdp(&response.result.cookies)?;
        let origins = self.seeded_origins.lock().await.clone();
        Ok(StorageState { cookies, origins })
    }

    async fn close(&self) -> Result<()> {
        let browser = self.browser.lock().await;
        browser
            .execute(DisposeBrowserContextParams::new(self.context_id.clone()))
            .await
            .map_err(automation)?;
        Ok(())
    }
}

struct CdpPage {
    page: Page,
}

#[async_trait]
impl PageHandle for CdpPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page.goto(url).await.map_err(automation)?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self.page.find_element(selector).await.map_err(automation)?;
        element.click().await.map_err(automation)?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let element = self.page.find_element(selector).await.map_err(automation)?;
        element.click().await.map_err(automation)?;
        element.type_str(text).await.map_err(automation)?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let params = chromiumoxide::page::ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.page.screenshot(params).await.map_err(automation)
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(script).await.map_err(automation)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.map_err(automation)
    }

    async fn query_selector(&self, selector: &str) -> Result<bool> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(automation)?;
        Ok(!elements.is_empty())
    }

    async fn query_selector_all(&self, selector: &str) -> Result<usize> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(automation)?;
        Ok(elements.len())
    }

    async fn element_text(&self, selector: &str) -> Result<Option<String>> {
        let element = self.page.find_element(selector).await.map_err(automation)?;
        element.inner_text().await.map_err(automation)
    }

    async fn element_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Option<String>> {
        let element = self.page.find_element(selector).await.map_err(automation)?;
        element.attribute(attribute).await.map_err(automation)
    }

    async fn close(&self) -> Result<()> {
        debug!("closing page");
        self.page.clone().close().await.map_err(automation)?;
        Ok(())
    }
}

fn automation(err: impl std::fmt::Display) -> AppError {
    AppError::Automation(err.to_string())
}

/// Ask the worker's HTTP debug surface for its advertised WebSocket URL.
async fn discover_debugger_url(endpoint: &str) -> Option<String> {
    let parsed = url::Url::parse(endpoint).ok()?;
    let host = parsed.host_str()?;
    let port = parsed.port()?;
    let version_url = format!("http://{host}:{port}/json/version");

    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct VersionBody {
        web_socket_debugger_url: String,
    }

    let body: VersionBody = reqwest::get(&version_url).await.ok()?.json().await.ok()?;
    Some(body.web_socket_debugger_url)
}

/// Convert CDP cookies into model cookies through their shared JSON shape.
fn cookies_from_cdp<T: serde::Serialize>(cookies: &[T]) -> Result<Vec<Cookie>> {
    let value = serde_json::to_value(cookies)?;
    Ok(serde_json::from_value(value)?)
}

/// Convert model cookies into CDP `CookieParam`s through their shared JSON
/// shape, dropping session-cookie expiries the protocol rejects.
fn cookies_to_cdp(
    cookies: &[Cookie],
) -> Result<Vec<chromiumoxide::cdp::browser_protocol::network::CookieParam>> {
    let mut params = Vec::with_capacity(cookies.len());
    for cookie in cookies {
        let mut value = serde_json::to_value(cookie)?;
        if cookie.expires < 0.0 {
            if let Some(map) = value.as_object_mut() {
                map.remove("expires");
            }
        }
        params.push(serde_json::from_value(value)?);
    }
    Ok(params)
}
