//! The per-visit session: form state, response state and the submit lifecycle.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::constants::APOLOGY_MESSAGE;
use crate::form::{FormError, FormState};
use crate::llm_interaction::{GenerationError, GenerationRequest, TextGenerator};
use crate::prompt;

/// What the user sees below the form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResponseState {
    pub text: String,
    pub is_loading: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// A required field was blank; nothing was sent and nothing changed.
    Skipped,
    /// A request for this session is already in flight.
    Busy,
    Completed,
    Failed,
    /// The settlement belonged to a request that is no longer current.
    Stale,
}

/// A request that has been started by [`CounselSession::begin_submit`] and
/// must be handed back to [`CounselSession::settle`].
#[derive(Debug)]
pub struct PendingRequest {
    ticket: u64,
    pub request: GenerationRequest,
}

impl PendingRequest {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

pub type SharedSession = Arc<Mutex<CounselSession>>;

#[derive(Debug, Default)]
pub struct CounselSession {
    form: FormState,
    response: ResponseState,
    // Ticket of the request in flight, if any
    in_flight: Option<u64>,
    next_ticket: u64,
}

impl CounselSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    pub fn response(&self) -> &ResponseState {
        &self.response
    }

    pub fn set_field(&mut self, name: &str, value: &str) -> Result<(), FormError> {
        self.form.set_field(name, value)
    }

    pub fn set_fields<'a>(
        &mut self,
        fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<(), FormError> {
        self.form.set_fields(fields)
    }

    /// Checks the required fields, marks the session as loading and builds the
    /// request. Returns the outcome instead when nothing should be dispatched.
    pub fn begin_submit(&mut self) -> Result<PendingRequest, SubmitOutcome> {
        if !prompt::is_dispatchable(&self.form) {
            return Err(SubmitOutcome::Skipped);
        }
        if self.in_flight.is_some() {
            return Err(SubmitOutcome::Busy);
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight = Some(ticket);
        self.response.is_loading = true;

        Ok(PendingRequest {
            ticket,
            request: GenerationRequest::new(prompt::build_prompt(&self.form)),
        })
    }

    /// Records the result of the request identified by `ticket` and clears
    /// the loading flag.
    pub fn settle(
        &mut self,
        ticket: u64,
        result: Result<Option<String>, GenerationError>,
    ) -> SubmitOutcome {
        if self.in_flight != Some(ticket) {
            return SubmitOutcome::Stale;
        }

        let outcome = match result {
            Ok(text) => {
                self.response.text = text.unwrap_or_default();
                SubmitOutcome::Completed
            }
            Err(e) => {
                error!(error = %e, "Text generation failed");
                self.response.text = APOLOGY_MESSAGE.to_string();
                SubmitOutcome::Failed
            }
        };

        self.in_flight = None;
        self.response.is_loading = false;
        outcome
    }
}

/// Runs one submission without holding the session lock across the network call.
pub async fn run_submit(generator: Arc<dyn TextGenerator>, session: SharedSession) -> SubmitOutcome {
    let pending = match session.lock().await.begin_submit() {
        Ok(pending) => pending,
        Err(outcome) => {
            debug!(?outcome, "Submission not dispatched");
            return outcome;
        }
    };

    // Settle on its own task so a dropped connection can't leave the session loading
    let task = tokio::spawn(async move {
        let result = generator.generate(&pending.request).await;
        session.lock().await.settle(pending.ticket(), result)
    });

    match task.await {
        Ok(outcome) => {
            info!(?outcome, "Submission settled");
            outcome
        }
        Err(e) => {
            error!("Submission task failed: {}", e);
            SubmitOutcome::Failed
        }
    }
}
