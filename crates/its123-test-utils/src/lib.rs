//! Testing utilities for the its123 workspace
//!
//! Scripted fakes for every engine capability plus fixtures for API
//! responses.

#![allow(missing_docs)]

use its123_core::headers;
use its123_core::{
    ApiRequest, ApiResponse, ClientConfig, Event, EventBus, EventKind, FieldRecorder, FormData,
    HttpClient, Method, RenderError, Renderer, Resource, SubmissionSource, TransportError,
};
use its123_store::{MemoryBackend, StorageBackend, StoreError};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const PRODUCT_PATH: &str = "/v2/product/request-product";
pub const NEXT_ITEMS_PATH: &str = "/v2/instrument/next-items";

type Reply = Result<ApiResponse, TransportError>;

/// HTTP fake answering from per-route queues
///
/// Routes are `METHOD path`, optionally narrowed to one instrument by its
/// run header. Unscripted requests fail with a connection error.
#[derive(Debug, Default)]
pub struct ScriptedHttp {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, method: Method, path: &str, reply: Reply) {
        self.routes
            .lock()
            .entry(route(method, path, None))
            .or_default()
            .push_back(reply);
    }

    pub fn on_product(&self, response: ApiResponse) {
        self.push(Method::Get, PRODUCT_PATH, Ok(response));
    }

    pub fn on_instrument_get(&self, access_code: &str, response: ApiResponse) {
        self.push_instrument(Method::Get, access_code, Ok(response));
    }

    pub fn on_instrument_post(&self, access_code: &str, reply: Reply) {
        self.push_instrument(Method::Post, access_code, reply);
    }

    pub fn on_report(&self, access_code: &str, body: &str) {
        self.push(
            Method::Get,
            &format!("/v2/report/{access_code}"),
            Ok(ApiResponse::new(200, body)),
        );
    }

    fn push_instrument(&self, method: Method, access_code: &str, reply: Reply) {
        self.routes
            .lock()
            .entry(route(method, NEXT_ITEMS_PATH, Some(access_code)))
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.path() == path)
            .count()
    }

    /// Instrument requests in order as `METHOD code`
    pub fn instrument_calls(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path() == NEXT_ITEMS_PATH)
            .map(|r| {
                format!(
                    "{} {}",
                    r.method.as_str(),
                    r.header_value(headers::INSTRUMENT_RUN).unwrap_or_default()
                )
            })
            .collect()
    }
}

fn route(method: Method, path: &str, run: Option<&str>) -> String {
    match run {
        Some(run) => format!("{} {path}#{run}", method.as_str()),
        None => format!("{} {path}", method.as_str()),
    }
}

#[async_trait::async_trait]
impl HttpClient for ScriptedHttp {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let run = request.header_value(headers::INSTRUMENT_RUN).map(str::to_string);
        let specific = route(request.method, request.path(), run.as_deref());
        let general = route(request.method, request.path(), None);
        self.requests.lock().push(request);

        let mut routes = self.routes.lock();
        for key in [specific, general] {
            if let Some(reply) = routes.get_mut(&key).and_then(VecDeque::pop_front) {
                return reply;
            }
        }
        Err(TransportError::Connection("unscripted request".into()))
    }
}

/// Product body with the given instruments and `(access_code, type)` reports
pub fn product_json(instruments: &[&str], reports: &[(&str, u32)]) -> String {
    serde_json::json!({
        "slots": {
            "instruments": instruments
                .iter()
                .map(|code| serde_json::json!({ "access_code": code }))
                .collect::<Vec<_>>(),
            "respondent": {}
        },
        "reports": reports
            .iter()
            .map(|(code, ty)| serde_json::json!({ "access_code": code, "type": ty }))
            .collect::<Vec<_>>(),
        "product_access_code": "PA1"
    })
    .to_string()
}

pub fn product_response(instruments: &[&str], reports: &[(&str, u32)]) -> ApiResponse {
    ApiResponse::new(200, product_json(instruments, reports))
}

pub fn instrument_response(status: &str, body: &str) -> ApiResponse {
    ApiResponse::new(200, body).with_header(headers::INSTRUMENT_STATUS, status)
}

pub fn error_response(status: u16, text: &str) -> ApiResponse {
    ApiResponse::new(status, "").with_status_text(text)
}

/// Renderer recording every call as a string
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    present_scripts: Vec<String>,
    fields: Vec<String>,
    init_funcs: Vec<String>,
    calls: Mutex<Vec<String>>,
    recorder: Mutex<Option<FieldRecorder>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_present_script(mut self, path: &str) -> Self {
        self.present_scripts.push(path.to_string());
        self
    }

    #[must_use]
    pub fn with_fields(mut self, names: &[&str]) -> Self {
        self.fields.extend(names.iter().map(|n| (*n).to_string()));
        self
    }

    #[must_use]
    pub fn with_init(mut self, func: &str) -> Self {
        self.init_funcs.push(func.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Last recorder bound to a rendered form
    pub fn recorder(&self) -> Option<FieldRecorder> {
        self.recorder.lock().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait::async_trait]
impl Renderer for RecordingRenderer {
    fn has_script(&self, src: &str) -> bool {
        self.present_scripts.iter().any(|p| p == src)
    }

    async fn load_script(&self, resource: &Resource) -> Result<(), RenderError> {
        self.log(format!("script:{}", resource.path));
        Ok(())
    }

    fn inject_stylesheet(&self, resource: &Resource) {
        self.log(format!("style:{}", resource.path));
    }

    fn render_instrument(&self, body: &str) -> Result<(), RenderError> {
        self.log(format!("instrument:{body}"));
        Ok(())
    }

    fn render_report(&self, body: &str) -> Result<(), RenderError> {
        self.log(format!("report:{body}"));
        Ok(())
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.clone()
    }

    fn set_field_value(&self, name: &str, value: &str) {
        self.log(format!("field:{name}={value}"));
    }

    fn bind_field_changes(&self, recorder: FieldRecorder) {
        self.log(format!("bind:{}", recorder.access_code()));
        *self.recorder.lock() = Some(recorder);
    }

    fn run_init(&self, func: &str, _config: &ClientConfig) -> bool {
        let known = self.init_funcs.iter().any(|f| f == func);
        if known {
            self.log(format!("init:{func}"));
        }
        known
    }
}

/// Submission source handing out queued forms, then closing
#[derive(Debug, Default)]
pub struct QueuedSubmissions {
    forms: Mutex<VecDeque<FormData>>,
    waits: Mutex<Vec<String>>,
}

impl QueuedSubmissions {
    pub fn new(forms: impl IntoIterator<Item = FormData>) -> Self {
        Self {
            forms: Mutex::new(forms.into_iter().collect()),
            waits: Mutex::new(Vec::new()),
        }
    }

    /// `count` submissions of a single dummy field
    pub fn repeated(count: usize) -> Self {
        Self::new((0..count).map(|i| FormData::new().with_field("q", i.to_string())))
    }

    /// Access codes the engine waited on, in order
    pub fn waits(&self) -> Vec<String> {
        self.waits.lock().clone()
    }
}

#[async_trait::async_trait]
impl SubmissionSource for QueuedSubmissions {
    async fn next_submission(&self, access_code: &str) -> Option<FormData> {
        self.waits.lock().push(access_code.to_string());
        self.forms.lock().pop_front()
    }
}

/// Memory backend counting reads and writes
#[derive(Debug, Default)]
pub struct CountingBackend {
    inner: MemoryBackend,
    reads: AtomicUsize,
    writes: AtomicUsize,
    removes: AtomicUsize,
}

impl CountingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    /// Zero all counters, e.g. after the store's construction probe
    pub fn reset(&self) {
        self.reads.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
        self.removes.store(0, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl StorageBackend for CountingBackend {
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.keys()
    }
}

/// Backend rejecting every operation
#[derive(Debug, Default)]
pub struct FailingBackend;

impl StorageBackend for FailingBackend {
    fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("quota exceeded".into()))
    }

    fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("quota exceeded".into()))
    }

    fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("quota exceeded".into()))
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Unavailable("quota exceeded".into()))
    }
}

/// Every event triggered on a bus, in order
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn attach(bus: &EventBus) -> Self {
        let log = Self::default();
        let sink = Arc::clone(&log.events);
        bus.on(EventKind::ALL, move |event: &Event| sink.lock().push(event.clone()));
        log
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.kind.as_str()).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }
}
