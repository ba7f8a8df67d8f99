//! Lifecycle event bus
//!
//! Synchronous fan-out: [`EventBus::trigger`] calls every listener of the
//! event in subscription order before returning. A panicking listener is
//! not caught and unwinds into the code that triggered the event.

use crate::config::Environment;
use crate::types::{Instrument, Product};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Events announced during a product run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Product acquired, carries the unfiltered instrument list
    InstrumentsLoaded,
    /// Instrument skipped because the store marks it ended
    InstrumentAlreadyCompleted,
    /// Instrument resumed from an earlier session
    InstrumentContinue,
    /// First page of an instrument fetched
    InstrumentStarted,
    /// Instrument reached a terminal status
    InstrumentCompleted,
    /// One submission attempt failed
    InstrumentSubmitFailed,
    /// Report rendered
    ReportReady,
    /// Whole product finished
    ProductCompleted,
    /// Any run failure
    Error,
    /// 401 from the API
    InvalidApiKey,
    /// 403 from the API
    NoProductAccess,
    /// 404 from the API
    ProductNotFound,
    /// Timeout or connection failure
    ServiceUnavailable,
    /// 500 from the API
    ServerError,
}

impl EventKind {
    /// Every event kind
    pub const ALL: [EventKind; 14] = [
        Self::InstrumentsLoaded,
        Self::InstrumentAlreadyCompleted,
        Self::InstrumentContinue,
        Self::InstrumentStarted,
        Self::InstrumentCompleted,
        Self::InstrumentSubmitFailed,
        Self::ReportReady,
        Self::ProductCompleted,
        Self::Error,
        Self::InvalidApiKey,
        Self::NoProductAccess,
        Self::ProductNotFound,
        Self::ServiceUnavailable,
        Self::ServerError,
    ];

    /// Public event name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InstrumentsLoaded => "instruments-loaded",
            Self::InstrumentAlreadyCompleted => "instrument-already-completed",
            Self::InstrumentContinue => "instrument-continue",
            Self::InstrumentStarted => "instrument-started",
            Self::InstrumentCompleted => "instrument-completed",
            Self::InstrumentSubmitFailed => "instrument-submit-failed",
            Self::ReportReady => "report-ready",
            Self::ProductCompleted => "product-completed",
            Self::Error => "error",
            Self::InvalidApiKey => "invalid-api-key",
            Self::NoProductAccess => "no-product-access",
            Self::ProductNotFound => "product-not-found",
            Self::ServiceUnavailable => "service-unavailable",
            Self::ServerError => "server-error",
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown event '{s}'"))
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log level used for development logging of an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Severity {
    /// Diagnostic detail
    Debug,
    /// Normal progress
    #[default]
    Info,
    /// Recoverable problem
    Warning,
    /// Run failure
    Error,
}

/// Payload of an event
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    /// No payload
    None,
    /// Instrument list
    Instruments(Vec<Instrument>),
    /// Instrument and the status that triggered the event
    Instrument { access_code: String, status: String },
    /// Failed submission attempt
    SubmitFailed {
        access_code: String,
        attempt: u32,
        max_attempts: u32,
        message: String,
    },
    /// Rendered report
    Report { access_code: String },
    /// Finished product
    Product(Box<Product>),
    /// Run failure
    Error { status: Option<u16>, message: String },
}

impl EventData {
    /// Instrument payload
    pub fn instrument(access_code: impl Into<String>, status: impl Into<String>) -> Self {
        Self::Instrument {
            access_code: access_code.into(),
            status: status.into(),
        }
    }
}

/// Event delivered to listeners
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// What happened
    pub kind: EventKind,
    /// Payload
    pub data: EventData,
    /// Severity used for logging
    pub severity: Severity,
}

/// Subscribed callback
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// One or many event kinds to subscribe to
pub trait EventSelector {
    /// Selected kinds
    fn kinds(self) -> Vec<EventKind>;
}

impl EventSelector for EventKind {
    fn kinds(self) -> Vec<EventKind> {
        vec![self]
    }
}

impl<const N: usize> EventSelector for [EventKind; N] {
    fn kinds(self) -> Vec<EventKind> {
        self.to_vec()
    }
}

impl EventSelector for &[EventKind] {
    fn kinds(self) -> Vec<EventKind> {
        self.to_vec()
    }
}

impl EventSelector for Vec<EventKind> {
    fn kinds(self) -> Vec<EventKind> {
        self
    }
}

/// Publish/subscribe hub
pub struct EventBus {
    listeners: RwLock<HashMap<EventKind, Vec<Listener>>>,
    log_events: bool,
}

impl EventBus {
    /// Create bus; the development environment logs every event
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            log_events: environment == Environment::Development,
        }
    }

    /// Subscribe `callback` to one or many event kinds
    pub fn on<S, F>(&self, kinds: S, callback: F)
    where
        S: EventSelector,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(callback);
        let mut listeners = self.listeners.write();
        for kind in kinds.kinds() {
            listeners.entry(kind).or_default().push(Arc::clone(&listener));
        }
    }

    /// Announce an event at info severity
    pub fn trigger(&self, kind: EventKind, data: EventData) {
        self.trigger_with(kind, data, Severity::Info);
    }

    /// Announce an event
    ///
    /// Listeners run on the caller's stack, in subscription order. The lock
    /// is released first so listeners may subscribe further callbacks; those
    /// apply from the next trigger on.
    pub fn trigger_with(&self, kind: EventKind, data: EventData, severity: Severity) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        let event = Event {
            kind,
            data,
            severity,
        };

        for listener in &listeners {
            listener(&event);
        }

        if self.log_events {
            log_event(&event);
        }
    }

    /// Number of listeners for `kind`
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Environment::Production)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&'static str, usize> = self
            .listeners
            .read()
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        f.debug_struct("EventBus")
            .field("listeners", &counts)
            .field("log_events", &self.log_events)
            .finish()
    }
}

fn log_event(event: &Event) {
    let name = event.kind.as_str();
    match event.severity {
        Severity::Debug => tracing::debug!(event = name, data = ?event.data, "event triggered"),
        Severity::Info => tracing::info!(event = name, data = ?event.data, "event triggered"),
        Severity::Warning => tracing::warn!(event = name, data = ?event.data, "event triggered"),
        Severity::Error => tracing::error!(event = name, data = ?event.data, "event triggered"),
    }
}
