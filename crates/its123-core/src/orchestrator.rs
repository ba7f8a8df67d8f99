//! Product orchestration
//!
//! [`ProductOrchestrator`] acquires a product, skips instruments an earlier
//! session already finished, runs the rest one after another and finally
//! shows the report. Failures clear the product's cache, are announced on
//! the event bus and returned to the caller.

use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::error::{ClientError, ErrorReporter, ProtocolError};
use crate::events::{Event, EventBus, EventData, EventKind, EventSelector, Severity};
use crate::instrument::InstrumentStateMachine;
use crate::render::{Renderer, SubmissionSource};
use crate::transport::HttpClient;
use crate::types::{Instrument, InstrumentStatus, LoadOptions, Product, ReportKind, ReportMeta};
use its123_store::{keys, MemoryBackend, PersistentStore};
use std::sync::Arc;

/// Runs products end to end
pub struct ProductOrchestrator {
    config: Arc<ClientConfig>,
    api: ApiClient,
    renderer: Arc<dyn Renderer>,
    submissions: Arc<dyn SubmissionSource>,
    store: PersistentStore,
    events: Arc<EventBus>,
    reporter: Option<Arc<dyn ErrorReporter>>,
}

impl ProductOrchestrator {
    /// Create orchestrator with an in-memory store
    ///
    /// # Errors
    /// `ClientError::Config` when the configuration is unusable
    pub fn new(
        config: ClientConfig,
        http: Arc<dyn HttpClient>,
        renderer: Arc<dyn Renderer>,
        submissions: Arc<dyn SubmissionSource>,
    ) -> Result<Self, ClientError> {
        config.validate()?;

        let config = Arc::new(config);
        let events = Arc::new(EventBus::new(config.environment()));
        tracing::debug!(
            endpoint = %config.endpoint(),
            environment = ?config.environment(),
            "orchestrator created"
        );

        Ok(Self {
            api: ApiClient::new(Arc::clone(&config), http),
            config,
            renderer,
            submissions,
            store: PersistentStore::new(Arc::new(MemoryBackend::new())),
            events,
            reporter: None,
        })
    }

    /// Use `store` for product snapshots, statuses and answers
    #[must_use]
    pub fn with_store(mut self, store: PersistentStore) -> Self {
        self.store = store;
        self
    }

    /// Share an existing event bus
    #[must_use]
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Report run failures to `reporter` when `log_errors` is set
    #[must_use]
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Event bus of this orchestrator
    #[inline]
    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Store of this orchestrator
    #[inline]
    #[must_use]
    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    /// Subscribe to run events
    pub fn on<S, F>(&self, kinds: S, callback: F)
    where
        S: EventSelector,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events.on(kinds, callback);
    }

    /// Run product `product_id` to completion
    ///
    /// # Errors
    /// The first failure of the run, after the cache was cleared and the
    /// failure announced
    pub async fn load_product(
        &self,
        product_id: &str,
        options: LoadOptions,
    ) -> Result<Product, ClientError> {
        let store = options.storage.then_some(&self.store);
        let mut acquired = Vec::new();

        match self.run_product(product_id, &options, store, &mut acquired).await {
            Ok(product) => Ok(product),
            Err(e) => {
                if store.is_some() {
                    self.clear_product_cache(product_id, &acquired);
                }
                self.handle_exception(&e, "load_product");
                Err(e)
            }
        }
    }

    /// URL of the report of type `type_name` ("standard" or "premium")
    ///
    /// # Errors
    /// `ClientError::ReportNotFound` if the product lacks that report
    pub fn get_pdf_url(&self, product: &Product, type_name: &str) -> Result<String, ClientError> {
        let kind = ReportKind::from_name(type_name);
        product
            .report(kind)
            .map(|report| self.api.report_url(&report.access_code))
            .ok_or_else(|| ClientError::ReportNotFound(format!("{type_name} (type {})", kind.code())))
    }

    /// Fetch and render a report, then announce `report-ready`
    ///
    /// # Errors
    /// Network or render failures
    pub async fn load_report(
        &self,
        access_code: &str,
        meta: Option<ReportMeta>,
    ) -> Result<(), ClientError> {
        let result = self.show_report(access_code, meta.as_ref()).await;
        if let Err(e) = &result {
            self.handle_exception(e, "load_report");
        }
        result
    }

    /// Overview of a running product
    ///
    /// # Errors
    /// Network or decoding failures
    pub async fn request_product_info(&self, access_code: &str) -> Result<Product, ClientError> {
        let result = self.api.request_product_info(access_code).await;
        if let Err(e) = &result {
            self.handle_exception(e, "request_product_info");
        }
        result
    }

    /// Remove every cache entry of a product and its instruments
    pub fn clear_product_cache(&self, product_id: &str, instruments: &[Instrument]) {
        self.store.remove(&keys::product(product_id));
        let mut fields = 0;
        for instrument in instruments {
            self.store.remove(&keys::instrument(&instrument.access_code));
            fields += self
                .store
                .remove_by_prefix(&keys::field_prefix(&instrument.access_code));
        }
        tracing::debug!(
            product_id,
            instruments = instruments.len(),
            fields,
            "product cache cleared"
        );
    }

    /// Announce a failure
    ///
    /// Triggers the status-specific event, then `error`, then notifies the
    /// error reporter when `log_errors` is set.
    pub fn handle_exception(&self, error: &ClientError, context: &str) {
        tracing::error!(context, status = ?error.status(), error = %error, "run failed");

        let data = EventData::Error {
            status: error.status(),
            message: error.to_string(),
        };
        if let Some(kind) = error.kind().event() {
            self.events.trigger_with(kind, data.clone(), Severity::Error);
        }
        self.events.trigger_with(EventKind::Error, data, Severity::Error);

        if self.config.log_errors {
            if let Some(reporter) = &self.reporter {
                reporter.notify(error, context);
            }
        }
    }

    async fn run_product(
        &self,
        product_id: &str,
        options: &LoadOptions,
        store: Option<&PersistentStore>,
        acquired: &mut Vec<Instrument>,
    ) -> Result<Product, ClientError> {
        let product = self.acquire_product(product_id, &options.user, store).await?;
        acquired.extend_from_slice(product.instruments());

        tracing::info!(
            product_id,
            instruments = product.instruments().len(),
            "product loaded"
        );
        self.events.trigger(
            EventKind::InstrumentsLoaded,
            EventData::Instruments(product.instruments().to_vec()),
        );

        let pending = match store {
            Some(store) => self.pending_instruments(product.instruments(), store),
            None => product.instruments().to_vec(),
        };

        for instrument in &pending {
            InstrumentStateMachine::new(
                &self.api,
                self.renderer.as_ref(),
                self.submissions.as_ref(),
                &self.events,
            )
            .with_store(store)
            .run(&instrument.access_code)
            .await?;
        }

        if options.render_report {
            let report = product.reports.first().ok_or(ProtocolError::NoReports)?;
            self.show_report(&report.access_code, None).await?;
        }

        if store.is_some() {
            self.clear_product_cache(product_id, product.instruments());
        }

        tracing::info!(product_id, "product completed");
        self.events.trigger(
            EventKind::ProductCompleted,
            EventData::Product(Box::new(product.clone())),
        );
        Ok(product)
    }

    async fn acquire_product(
        &self,
        product_id: &str,
        user: &str,
        store: Option<&PersistentStore>,
    ) -> Result<Product, ClientError> {
        let key = keys::product(product_id);

        if let Some(store) = store {
            if let Some(product) = store.load_snapshot::<Product>(&key, user, self.config.product_ttl()) {
                tracing::debug!(product_id, "using cached product");
                return Ok(product);
            }
        }

        let product = self.api.request_product(product_id, user).await?;
        if let Some(store) = store {
            store.save_snapshot(&key, &product, user);
        }
        Ok(product)
    }

    fn pending_instruments(&self, instruments: &[Instrument], store: &PersistentStore) -> Vec<Instrument> {
        instruments
            .iter()
            .filter(|instrument| {
                let code = instrument.access_code.as_str();
                let cached = store
                    .get(&keys::instrument(code))
                    .and_then(|raw| raw.parse::<InstrumentStatus>().ok());

                match cached {
                    Some(status) if status.is_terminal() => {
                        tracing::debug!(access_code = code, %status, "skipping completed instrument");
                        self.events.trigger(
                            EventKind::InstrumentAlreadyCompleted,
                            EventData::instrument(code, status.as_str()),
                        );
                        false
                    }
                    Some(InstrumentStatus::InProgress) => {
                        self.events.trigger(
                            EventKind::InstrumentContinue,
                            EventData::instrument(code, InstrumentStatus::InProgress.as_str()),
                        );
                        true
                    }
                    _ => true,
                }
            })
            .cloned()
            .collect()
    }

    async fn show_report(&self, access_code: &str, meta: Option<&ReportMeta>) -> Result<(), ClientError> {
        let body = self.api.request_report(access_code, meta).await?;
        self.renderer.render_report(&body)?;
        self.events.trigger(
            EventKind::ReportReady,
            EventData::Report {
                access_code: access_code.to_string(),
            },
        );
        Ok(())
    }
}

impl std::fmt::Debug for ProductOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductOrchestrator")
            .field("api", &self.api)
            .field("store", &self.store)
            .field("events", &self.events)
            .field("error_reporter", &self.reporter.is_some())
            .finish_non_exhaustive()
    }
}
