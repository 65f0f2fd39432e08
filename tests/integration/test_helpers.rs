//! Shared test helpers for integration tests.
//!
//! Provides an in-memory automation engine with a tiny HTML document store,
//! an in-memory container runtime, a stub worker HTTP endpoint for readiness
//! polling, and wiring for a full orchestrator stack over a temp data dir.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use axum::routing::get;
use axum::Router;
use tokio::sync::Mutex;

use browser_warden::browser::engine::{
    AutomationEngine, BrowserHandle, ContextHandle, DisconnectHook, PageHandle,
};
use browser_warden::browser::BrowserRegistry;
use browser_warden::config::GlobalConfig;
use browser_warden::http::AppState;
use browser_warden::models::storage::StorageState;
use browser_warden::orchestrator::Orchestrator;
use browser_warden::persistence::SessionStore;
use browser_warden::worker::runtime::{
    worker_container_name, ContainerRuntime, WorkerHandle, WorkerSpec,
};
use browser_warden::{AppError, Result};

// ── Naive HTML matching ──────────────────────────────────────────────────────

/// Count matches of a selector against an HTML string. Supports `#id` and
/// bare tag-name selectors, which is all the fake pages need.
pub fn match_count(html: &str, selector: &str) -> usize {
    if let Some(id) = selector.strip_prefix('#') {
        let needle = format!("id=\"{id}\"");
        if html.contains(&needle) {
            1
        } else {
            0
        }
    } else {
        html.matches(&format!("<{selector}")).count()
    }
}

/// Inner text of the element carrying the given id, if present.
pub fn text_for_id(html: &str, id: &str) -> Option<String> {
    let needle = format!("id=\"{id}\"");
    let at = html.find(&needle)?;
    let rest = &html[at..];
    let open_end = rest.find('>')?;
    let after = &rest[open_end + 1..];
    let close = after.find('<')?;
    Some(after[..close].to_owned())
}

// ── Fake automation engine ───────────────────────────────────────────────────

/// In-memory automation engine holding a url → HTML document store.
#[derive(Default)]
pub struct FakeEngine {
    docs: StdMutex<HashMap<String, String>>,
    connects: AtomicUsize,
    fail_connect: AtomicBool,
    hooks: StdMutex<Vec<DisconnectHook>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an HTML document served on `navigate`.
    pub fn add_document(&self, url: &str, html: &str) {
        self.docs
            .lock()
            .unwrap()
            .insert(url.to_owned(), html.to_owned());
    }

    /// Number of successful connections made so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Make the next connection attempts fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Fire every registered disconnect hook, as a dropped connection would.
    pub fn fire_disconnects(&self) {
        let hooks: Vec<DisconnectHook> = std::mem::take(&mut *self.hooks.lock().unwrap());
        for hook in hooks {
            hook();
        }
    }
}

#[async_trait]
impl AutomationEngine for FakeEngine {
    async fn connect(
        &self,
        endpoint: &str,
        on_disconnect: DisconnectHook,
    ) -> Result<Arc<dyn BrowserHandle>> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(AppError::Automation(format!(
                "connect to {endpoint} refused"
            )));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.hooks.lock().unwrap().push(on_disconnect);
        let docs = self.docs.lock().unwrap().clone();
        Ok(Arc::new(FakeBrowser {
            docs: Arc::new(StdMutex::new(docs)),
        }))
    }
}

pub struct FakeBrowser {
    docs: Arc<StdMutex<HashMap<String, String>>>,
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn new_context(&self, seed: Option<StorageState>) -> Result<Arc<dyn ContextHandle>> {
        Ok(Arc::new(FakeContext {
            docs: Arc::clone(&self.docs),
            state: Mutex::new(seed.unwrap_or_default()),
        }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct FakeContext {
    docs: Arc<StdMutex<HashMap<String, String>>>,
    state: Mutex<StorageState>,
}

#[async_trait]
impl ContextHandle for FakeContext {
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>> {
        Ok(Arc::new(FakePage {
            docs: Arc::clone(&self.docs),
            html: Mutex::new(String::new()),
        }))
    }

    async fn storage_state(&self) -> Result<StorageState> {
        Ok(self.state.lock().await.clone())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct FakePage {
    docs: Arc<StdMutex<HashMap<String, String>>>,
    html: Mutex<String>,
}

#[async_trait]
impl PageHandle for FakePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let html = self
            .docs
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_owned());
        *self.html.lock().await = html;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        if match_count(&*self.html.lock().await, selector) == 0 {
            return Err(AppError::Automation(format!("no element for {selector}")));
        }
        Ok(())
    }

    async fn type_text(&self, selector: &str, _text: &str) -> Result<()> {
        if match_count(&*self.html.lock().await, selector) == 0 {
            return Err(AppError::Automation(format!("no element for {selector}")));
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn content(&self) -> Result<String> {
        Ok(self.html.lock().await.clone())
    }

    async fn query_selector(&self, selector: &str) -> Result<bool> {
        Ok(match_count(&*self.html.lock().await, selector) > 0)
    }

    async fn query_selector_all(&self, selector: &str) -> Result<usize> {
        Ok(match_count(&*self.html.lock().await, selector))
    }

    async fn element_text(&self, selector: &str) -> Result<Option<String>> {
        let html = self.html.lock().await;
        match selector.strip_prefix('#') {
            Some(id) => Ok(text_for_id(&html, id)),
            None => Ok(None),
        }
    }

    async fn element_attribute(
        &self,
        _selector: &str,
        _attribute: &str,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

// ── Fake container runtime ───────────────────────────────────────────────────

/// In-memory container runtime tracking which workers are "running".
#[derive(Default)]
pub struct FakeRuntime {
    /// Address handed out for every started worker (the stub worker server).
    pub address: StdMutex<String>,
    running: StdMutex<HashMap<String, bool>>,
    starts: AtomicUsize,
    fail_start: AtomicBool,
}

impl FakeRuntime {
    pub fn new(address: String) -> Arc<Self> {
        let runtime = Self::default();
        *runtime.address.lock().unwrap() = address;
        Arc::new(runtime)
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Simulate a crashed worker.
    pub fn kill_worker(&self, worker_id: &str) {
        self.running
            .lock()
            .unwrap()
            .insert(worker_id.to_owned(), false);
    }

    pub fn worker_running(&self, worker_id: &str) -> bool {
        self.running
            .lock()
            .unwrap()
            .get(worker_id)
            .copied()
            .unwrap_or(false)
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn start_worker(&self, spec: &WorkerSpec) -> Result<WorkerHandle> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(AppError::Provision("image build failed".into()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        let id = worker_container_name(&spec.session_id);
        self.running.lock().unwrap().insert(id.clone(), true);
        Ok(WorkerHandle {
            id,
            address: self.address.lock().unwrap().clone(),
        })
    }

    async fn stop_worker(&self, worker_id: &str) {
        self.running.lock().unwrap().remove(worker_id);
    }

    async fn is_running(&self, worker_id: &str) -> bool {
        self.worker_running(worker_id)
    }
}

// ── Stack wiring ─────────────────────────────────────────────────────────────

/// Spawn a stub worker endpoint answering readiness polls on an ephemeral
/// port, returning its address.
pub async fn spawn_fake_worker() -> SocketAddr {
    let app = Router::new().route("/json/version", get(|| async { "{}" }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub worker");
    let addr = listener.local_addr().expect("stub worker addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Build a `GlobalConfig` rooted at the given data dir with fast readiness
/// polling for tests.
pub fn test_config(data_dir: &std::path::Path) -> GlobalConfig {
    let toml = format!(
        r#"
data_dir = '{data_dir}'
session_timeout_seconds = 1800
reaper_interval_seconds = 60

[worker]
readiness_attempts = 3
readiness_delay_ms = 10
"#,
        data_dir = data_dir.display(),
    );
    GlobalConfig::from_toml_str(&toml).expect("valid test config")
}

/// Fully wired orchestrator stack over fakes.
pub struct TestStack {
    pub orchestrator: Arc<Orchestrator>,
    pub registry: Arc<BrowserRegistry>,
    pub store: Arc<SessionStore>,
    pub engine: Arc<FakeEngine>,
    pub runtime: Arc<FakeRuntime>,
    pub config: Arc<GlobalConfig>,
}

/// Wire an orchestrator over the fake engine and runtime, backed by a stub
/// worker endpoint for readiness polling.
pub async fn test_stack(data_dir: &std::path::Path) -> TestStack {
    let worker_addr = spawn_fake_worker().await;
    let config = Arc::new(test_config(data_dir));
    let store = Arc::new(SessionStore::new(&config).expect("store"));
    let engine = FakeEngine::new();
    let runtime = FakeRuntime::new(worker_addr.to_string());
    let registry = BrowserRegistry::new(
        Arc::clone(&engine) as Arc<dyn AutomationEngine>,
        Arc::clone(&store),
    );
    let orchestrator = Orchestrator::new(
        Arc::clone(&config),
        Arc::clone(&store),
        Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
        Arc::clone(&registry),
    );
    TestStack {
        orchestrator,
        registry,
        store,
        engine,
        runtime,
        config,
    }
}

/// Serve the HTTP surface for a stack on an ephemeral port, returning the
/// base URL. Pass a secret to enable the auth gate.
pub async fn spawn_api(stack: &TestStack, auth_secret: Option<&str>) -> String {
    let mut config = (*stack.config).clone();
    config.auth_secret = auth_secret.map(ToOwned::to_owned);
    let state = Arc::new(AppState {
        orchestrator: Arc::clone(&stack.orchestrator),
        store: Arc::clone(&stack.store),
        config: Arc::new(config),
    });
    let app = browser_warden::http::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind api");
    let addr = listener.local_addr().expect("api addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}
