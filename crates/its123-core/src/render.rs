//! Presentation capabilities
//!
//! [`Renderer`] puts instrument and report HTML in front of the respondent
//! and injects the assets an instrument declares. [`SubmissionSource`] is the
//! single point where a run waits for the respondent.

use crate::config::ClientConfig;
use crate::types::{FormData, Resource};
use its123_store::{keys, PersistentStore};
use tokio::sync::{mpsc, Mutex};

/// Renderer failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// Script could not be loaded
    #[error("failed to load script {path}: {message}")]
    ScriptLoad { path: String, message: String },

    /// Output target unavailable
    #[error("render target unavailable: {0}")]
    Unavailable(String),
}

/// Writes content and assets to the presentation layer
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// Whether a script with this `src` is already present
    fn has_script(&self, _src: &str) -> bool {
        false
    }

    /// Inject a script; resolves once it has loaded
    async fn load_script(&self, resource: &Resource) -> Result<(), RenderError>;

    /// Inject a stylesheet without waiting for it
    fn inject_stylesheet(&self, resource: &Resource);

    /// Show instrument HTML in the product container
    fn render_instrument(&self, body: &str) -> Result<(), RenderError>;

    /// Show report HTML in the report container
    fn render_report(&self, body: &str) -> Result<(), RenderError>;

    /// Names of the inputs of the rendered instrument form
    fn field_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Pre-fill an input
    fn set_field_value(&self, _name: &str, _value: &str) {}

    /// Route input changes of the rendered form to `recorder`
    fn bind_field_changes(&self, _recorder: FieldRecorder) {}

    /// Call a script's init function with the client configuration
    ///
    /// Returns false when no such function is known.
    fn run_init(&self, _func: &str, _config: &ClientConfig) -> bool {
        false
    }
}

/// Persists answers of one instrument as the respondent edits them
#[derive(Debug, Clone)]
pub struct FieldRecorder {
    store: PersistentStore,
    access_code: String,
}

impl FieldRecorder {
    /// Recorder writing to `store` for instrument `access_code`
    pub fn new(store: PersistentStore, access_code: impl Into<String>) -> Self {
        Self {
            store,
            access_code: access_code.into(),
        }
    }

    /// Instrument the answers belong to
    #[inline]
    #[must_use]
    pub fn access_code(&self) -> &str {
        &self.access_code
    }

    /// Store the current value of a field
    pub fn record(&self, field_name: &str, value: &str) {
        self.store
            .set(&keys::field(&self.access_code, field_name), value);
    }
}

/// Suspends a run until the respondent submits
#[async_trait::async_trait]
pub trait SubmissionSource: Send + Sync {
    /// Wait for the next submission of instrument `access_code`
    ///
    /// `None` means no further input will arrive.
    async fn next_submission(&self, access_code: &str) -> Option<FormData>;
}

/// Channel-backed submission source
///
/// The UI side keeps the [`mpsc::Sender`] returned by
/// [`ChannelSubmissions::new`] and sends a [`FormData`] per submit.
#[derive(Debug)]
pub struct ChannelSubmissions {
    receiver: Mutex<mpsc::Receiver<FormData>>,
}

impl ChannelSubmissions {
    /// Create source and its sender
    #[must_use]
    pub fn new(buffer: usize) -> (mpsc::Sender<FormData>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            tx,
            Self {
                receiver: Mutex::new(rx),
            },
        )
    }
}

#[async_trait::async_trait]
impl SubmissionSource for ChannelSubmissions {
    async fn next_submission(&self, access_code: &str) -> Option<FormData> {
        tracing::debug!(access_code, "waiting for submission");
        self.receiver.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use its123_store::MemoryBackend;
    use std::sync::Arc;

    #[test]
    fn recorder_writes_field_keys() {
        let store = PersistentStore::new(Arc::new(MemoryBackend::new()));
        let recorder = FieldRecorder::new(store.clone(), "I1");
        recorder.record("q1", "4");
        assert_eq!(store.get("I1-q1").as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn channel_source_yields_then_closes() {
        let (tx, source) = ChannelSubmissions::new(4);
        tx.send(FormData::new().with_field("q1", "a")).await.unwrap();
        drop(tx);

        let first = source.next_submission("I1").await.unwrap();
        assert_eq!(first.get("q1"), Some("a"));
        assert!(source.next_submission("I1").await.is_none());
    }
}
