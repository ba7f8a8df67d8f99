//! its123 Core - assessment product orchestration
//!
//! Drives a multi-step assessment product against the 123test API:
//! - Acquires the product, reusing a cached snapshot while it is fresh
//! - Skips instruments an earlier session already finished
//! - Runs each remaining instrument page by page until it ends
//! - Retries failed submissions a bounded number of times
//! - Renders the report and announces progress on an event bus
//!
//! Network, presentation and user input are capabilities ([`HttpClient`],
//! [`Renderer`], [`SubmissionSource`]) so the engine runs the same way in a
//! terminal, a server or a test.
//!
//! # Example
//!
//! ```rust,ignore
//! use its123_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     http: Arc<dyn HttpClient>,
//! #     renderer: Arc<dyn Renderer>,
//! #     submissions: Arc<dyn SubmissionSource>,
//! # ) -> Result<(), ClientError> {
//! let orchestrator = ProductOrchestrator::new(ClientConfig::new("api-key"), http, renderer, submissions)?;
//! orchestrator.on(EventKind::InstrumentCompleted, |event: &Event| println!("{:?}", event.data));
//!
//! let product = orchestrator.load_product("P1", LoadOptions::new()).await?;
//! println!("finished {}", product.product_access_code);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod instrument;
pub mod orchestrator;
pub mod render;
pub mod resources;
pub mod retry;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use api::{headers, ApiClient};
pub use config::{
    ClientConfig, ElementConfig, Environment, RetryConfig, DEFAULT_DOMAIN, DEFAULT_VERSION,
    DEVELOPMENT_DOMAIN,
};
pub use error::{ClientError, ConfigError, ErrorKind, ErrorReporter, ProtocolError};
pub use events::{Event, EventBus, EventData, EventKind, EventSelector, Listener, Severity};
pub use instrument::{InstrumentPhase, InstrumentStateMachine};
pub use orchestrator::ProductOrchestrator;
pub use render::{ChannelSubmissions, FieldRecorder, RenderError, Renderer, SubmissionSource};
pub use resources::{load_resources, run_resource_functions};
pub use retry::{try_at_most, RetryAttempt, RetryPolicy};
pub use transport::{ApiRequest, ApiResponse, HttpClient, Method, TransportError};
pub use types::{
    FormData, Instrument, InstrumentResponse, InstrumentStatus, LoadOptions, Product, Report,
    ReportKind, ReportMeta, Resource, ResourceKind, ResourceManifest, Slots,
};

pub use its123_store::{self as store, PersistentStore};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with its123 Core
    pub use crate::{
        ClientConfig, ClientError, Event, EventKind, FormData, HttpClient, LoadOptions,
        PersistentStore, Product, ProductOrchestrator, Renderer, SubmissionSource,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
