//! Per-instrument state machine
//!
//! Drives one instrument from its first page to a terminal status:
//!
//! ```text
//! Requested ──started|in-progress──▶ Presented ──▶ WaitingForSubmission
//!     ▲                                                   │ submit
//!     └──────────────success─────────── Submitting ◀──────┘
//!                                           │ failure, attempts left
//!                                           └──▶ WaitingForSubmission
//! Requested ──ended-*──▶ Completed
//! any ──unrecoverable──▶ Failed
//! ```
//!
//! The loop is explicit; a submission answer is evaluated by the next
//! iteration rather than a nested call.

use crate::api::ApiClient;
use crate::error::ClientError;
use crate::events::{EventBus, EventData, EventKind, Severity};
use crate::render::{FieldRecorder, Renderer, SubmissionSource};
use crate::resources::{load_resources, run_resource_functions};
use crate::retry::{RetryAttempt, RetryPolicy};
use crate::types::{InstrumentResponse, InstrumentStatus};
use its123_store::{keys, PersistentStore};
use parking_lot::Mutex;

/// Phase of an instrument run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentPhase {
    /// Page fetched or submission answered, status not yet evaluated
    Requested,
    /// Page rendered with its resources
    Presented,
    /// Suspended until the respondent submits
    WaitingForSubmission,
    /// Submission in flight
    Submitting,
    /// Terminal status reached
    Completed,
    /// Run aborted with an error
    Failed,
}

impl InstrumentPhase {
    /// Every phase
    pub const ALL: [InstrumentPhase; 6] = [
        Self::Requested,
        Self::Presented,
        Self::WaitingForSubmission,
        Self::Submitting,
        Self::Completed,
        Self::Failed,
    ];

    /// Phases reachable in one step
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [InstrumentPhase] {
        use InstrumentPhase::*;
        match self {
            Requested => &[Presented, Completed, Failed],
            Presented => &[WaitingForSubmission, Failed],
            WaitingForSubmission => &[Submitting, Failed],
            Submitting => &[Requested, WaitingForSubmission, Failed],
            Completed | Failed => &[],
        }
    }

    /// Check a single step
    #[inline]
    #[must_use]
    pub fn can_transition_to(self, next: InstrumentPhase) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// No further transitions
    #[inline]
    #[must_use]
    pub fn is_final(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

/// Runs one instrument to completion
pub struct InstrumentStateMachine<'a> {
    api: &'a ApiClient,
    renderer: &'a dyn Renderer,
    submissions: &'a dyn SubmissionSource,
    events: &'a EventBus,
    store: Option<&'a PersistentStore>,
    retry: RetryPolicy,
    phase: Mutex<InstrumentPhase>,
}

impl<'a> InstrumentStateMachine<'a> {
    /// Create machine; retries follow the client's submit retry settings
    #[must_use]
    pub fn new(
        api: &'a ApiClient,
        renderer: &'a dyn Renderer,
        submissions: &'a dyn SubmissionSource,
        events: &'a EventBus,
    ) -> Self {
        Self {
            api,
            renderer,
            submissions,
            events,
            store: None,
            retry: RetryPolicy::from_config(&api.config().submit_retry),
            phase: Mutex::new(InstrumentPhase::Requested),
        }
    }

    /// Persist statuses and answers to `store`; `None` disables caching
    #[must_use]
    pub fn with_store(mut self, store: Option<&'a PersistentStore>) -> Self {
        self.store = store;
        self
    }

    /// Override the submission retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> InstrumentPhase {
        *self.phase.lock()
    }

    /// Run instrument `access_code` until it reaches a terminal status
    ///
    /// # Errors
    /// - read failures of the first request, unretried
    /// - `ProtocolError::UnknownStatus` for a status outside the lifecycle
    /// - render failures
    /// - the last submission error once attempts are used up
    pub async fn run(&self, access_code: &str) -> Result<InstrumentStatus, ClientError> {
        *self.phase.lock() = InstrumentPhase::Requested;
        tracing::info!(access_code, "starting instrument");

        let mut response = match self.api.request_instrument(access_code).await {
            Ok(response) => response,
            Err(e) => return self.fail(e),
        };
        self.events.trigger(
            EventKind::InstrumentStarted,
            EventData::instrument(access_code, &response.status),
        );

        loop {
            let status: InstrumentStatus = match response.status.parse() {
                Ok(status) => status,
                Err(e) => {
                    tracing::error!(access_code, status = %response.status, "unknown instrument status");
                    return self.fail(ClientError::from(e));
                }
            };

            if let Some(store) = self.store {
                store.set(&keys::instrument(access_code), status.as_str());
            }

            if status.is_terminal() {
                self.transition(InstrumentPhase::Completed);
                tracing::info!(access_code, %status, "instrument completed");
                self.events.trigger(
                    EventKind::InstrumentCompleted,
                    EventData::instrument(access_code, status.as_str()),
                );
                return Ok(status);
            }

            self.present(access_code, &response).await?;
            response = self
                .retry
                .retry_if(
                    |attempt| self.attempt_submission(access_code, attempt),
                    ClientError::is_retryable,
                )
                .await?;
            self.transition(InstrumentPhase::Requested);
        }
    }

    async fn present(&self, access_code: &str, response: &InstrumentResponse) -> Result<(), ClientError> {
        if let Err(e) = load_resources(self.renderer, &response.resources).await {
            return self.fail(e.into());
        }
        if let Err(e) = self.renderer.render_instrument(&response.body) {
            return self.fail(e.into());
        }

        if let Some(store) = self.store {
            let mut restored = 0;
            for name in self.renderer.field_names() {
                if let Some(value) = store.get(&keys::field(access_code, &name)) {
                    self.renderer.set_field_value(&name, &value);
                    restored += 1;
                }
            }
            if restored > 0 {
                tracing::debug!(access_code, restored, "restored cached answers");
            }
            self.renderer
                .bind_field_changes(FieldRecorder::new(store.clone(), access_code));
        }

        run_resource_functions(self.renderer, &response.resources, self.api.config());
        self.transition(InstrumentPhase::Presented);
        Ok(())
    }

    async fn attempt_submission(
        &self,
        access_code: &str,
        attempt: RetryAttempt,
    ) -> Result<InstrumentResponse, ClientError> {
        self.transition(InstrumentPhase::WaitingForSubmission);
        let Some(form) = self.submissions.next_submission(access_code).await else {
            return self.fail(ClientError::SubmissionClosed(access_code.to_string()));
        };

        self.transition(InstrumentPhase::Submitting);
        match self.api.submit_instrument(access_code, &form).await {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::warn!(
                    access_code,
                    attempt = attempt.attempt_number,
                    max_attempts = attempt.max_attempts,
                    error = %e,
                    "submission failed"
                );
                self.events.trigger_with(
                    EventKind::InstrumentSubmitFailed,
                    EventData::SubmitFailed {
                        access_code: access_code.to_string(),
                        attempt: attempt.attempt_number,
                        max_attempts: attempt.max_attempts,
                        message: e.to_string(),
                    },
                    Severity::Warning,
                );
                if attempt.is_last() || !e.is_retryable() {
                    self.transition(InstrumentPhase::Failed);
                }
                Err(e)
            }
        }
    }

    fn transition(&self, next: InstrumentPhase) {
        let mut phase = self.phase.lock();
        debug_assert!(
            phase.can_transition_to(next),
            "illegal instrument transition {:?} -> {next:?}",
            *phase
        );
        *phase = next;
    }

    fn fail<T>(&self, error: ClientError) -> Result<T, ClientError> {
        self.transition(InstrumentPhase::Failed);
        Err(error)
    }
}

impl std::fmt::Debug for InstrumentStateMachine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentStateMachine")
            .field("phase", &self.phase())
            .field("caching", &self.store.is_some())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn final_phases_have_no_exits() {
        assert!(InstrumentPhase::Completed.is_final());
        assert!(InstrumentPhase::Failed.is_final());
        assert!(!InstrumentPhase::Submitting.is_final());
    }

    #[test]
    fn only_requested_completes() {
        for phase in InstrumentPhase::ALL {
            assert_eq!(
                phase.can_transition_to(InstrumentPhase::Completed),
                phase == InstrumentPhase::Requested
            );
        }
    }

    #[test]
    fn every_live_phase_can_fail() {
        for phase in InstrumentPhase::ALL.into_iter().filter(|p| !p.is_final()) {
            assert!(phase.can_transition_to(InstrumentPhase::Failed));
        }
    }

    proptest! {
        #[test]
        fn prop_walks_end_in_final_or_live_phase(choices in prop::collection::vec(0usize..4, 0..40)) {
            let mut phase = InstrumentPhase::Requested;
            for choice in choices {
                let next = phase.allowed_transitions();
                if next.is_empty() {
                    break;
                }
                let to = next[choice % next.len()];
                prop_assert!(phase.can_transition_to(to));
                phase = to;
            }
            prop_assert!(InstrumentPhase::ALL.contains(&phase));
            if phase.is_final() {
                prop_assert!(phase.allowed_transitions().is_empty());
            }
        }

        #[test]
        fn prop_no_self_loops(index in 0usize..6) {
            let phase = InstrumentPhase::ALL[index];
            prop_assert!(!phase.can_transition_to(phase));
        }
    }
}
