use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::{EntrigError, Result};
use crate::models::RegistrationAck;
use crate::platform::{PermissionPrompt, SurfaceId};

pub type RegistrationHandler = Box<dyn FnOnce(Result<RegistrationAck>) + Send + 'static>;
pub type PermissionHandler = Box<dyn FnOnce(Result<bool>) + Send + 'static>;

/// A registration waiting on the consent prompt.
pub struct PendingRegistration {
    pub user_id: String,
    pub sdk_label: String,
    pub handler: RegistrationHandler,
}

impl fmt::Debug for PendingRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRegistration")
            .field("user_id", &self.user_id)
            .field("sdk_label", &self.sdk_label)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum GateDecision {
    /// Register now.
    Proceed(PendingRegistration),
    /// Parked until a consent result arrives.
    Deferred,
    /// A later call already reached the gate; the request is dropped.
    Superseded,
    /// Fail the handler with the given error.
    Rejected(PendingRegistration, EntrigError),
}

/// What a consent result releases.
#[derive(Debug, Default)]
pub struct ConsentOutcome {
    pub registration: Option<PendingRegistration>,
    pub waiter: Option<PermissionWaiter>,
}

pub struct PermissionWaiter(pub PermissionHandler);

impl fmt::Debug for PermissionWaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PermissionWaiter")
    }
}

#[derive(Default)]
struct GateState {
    pending: Option<(u64, PendingRegistration)>,
    waiter: Option<PermissionHandler>,
    // Highest ticket that reached the gate or settled before it
    latest_arrived: u64,
    // Tickets up to here were issued before the last consent result
    answered_through: u64,
}

/// Orders registrations by call, not by when their task reaches the gate.
/// Callers take a ticket synchronously with [`PermissionGate::issue_ticket`].
pub struct PermissionGate {
    prompt: Arc<dyn PermissionPrompt>,
    handle_automatically: bool,
    issued: AtomicU64,
    state: Mutex<GateState>,
}

impl PermissionGate {
    pub fn new(prompt: Arc<dyn PermissionPrompt>, handle_automatically: bool) -> Self {
        Self {
            prompt,
            handle_automatically,
            issued: AtomicU64::new(0),
            state: Mutex::new(GateState::default()),
        }
    }

    pub fn issue_ticket(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Records a ticket that finished without reaching the gate.
    pub fn settle(&self, ticket: u64) {
        let mut state = self.lock();
        state.latest_arrived = state.latest_arrived.max(ticket);
    }

    pub fn request_registration(
        &self,
        ticket: u64,
        user_id: &str,
        sdk_label: &str,
        surface: Option<SurfaceId>,
        handler: RegistrationHandler,
    ) -> GateDecision {
        let request = PendingRegistration {
            user_id: user_id.to_string(),
            sdk_label: sdk_label.to_string(),
            handler,
        };

        if !self.handle_automatically
            || !self.prompt.consent_required()
            || self.prompt.consent_granted()
        {
            self.settle(ticket);
            return GateDecision::Proceed(request);
        }

        let mut state = self.lock();
        if ticket < state.latest_arrived {
            debug!(user_id = %user_id, "A later registration already reached the gate");
            return GateDecision::Superseded;
        }
        state.latest_arrived = ticket;

        // Consent was answered while this call was still in flight
        if ticket <= state.answered_through {
            info!(user_id = %user_id, "Consent already answered, registering");
            return GateDecision::Proceed(request);
        }

        // Last caller wins; an earlier pending handler is dropped uninvoked
        if let Some((_, previous)) = state.pending.replace((ticket, request)) {
            debug!(user_id = %previous.user_id, "Superseding pending registration");
        }

        match surface {
            Some(surface) => {
                info!(
                    user_id = %user_id,
                    surface = ?surface,
                    "Deferring registration until consent result"
                );
                self.prompt.request_consent(surface);
                GateDecision::Deferred
            }
            None => {
                warn!(user_id = %user_id, "No surface available for permission prompt");
                match state.pending.take() {
                    Some((_, request)) => {
                        GateDecision::Rejected(request, EntrigError::PermissionSurfaceUnavailable)
                    }
                    None => GateDecision::Deferred,
                }
            }
        }
    }

    /// Manual consent request. Answers immediately when no prompt is needed,
    /// otherwise shows the prompt and parks `handler` until the result.
    pub fn request_permission(
        &self,
        surface: Option<SurfaceId>,
        handler: PermissionHandler,
    ) -> Option<(PermissionHandler, Result<bool>)> {
        if !self.prompt.consent_required() || self.prompt.consent_granted() {
            return Some((handler, Ok(true)));
        }
        let Some(surface) = surface else {
            warn!("No surface available for permission prompt");
            return Some((handler, Err(EntrigError::PermissionSurfaceUnavailable)));
        };

        if self.lock().waiter.replace(handler).is_some() {
            debug!("Superseding pending permission request");
        }
        self.prompt.request_consent(surface);
        None
    }

    /// Releases the pending registration whatever the outcome; registering the
    /// token does not depend on notifications being visible right now. A
    /// registration older than a call still in flight is dropped instead.
    pub fn on_consent_result(&self, granted: bool) -> ConsentOutcome {
        let issued = self.issued.load(Ordering::SeqCst);
        let mut state = self.lock();
        state.answered_through = issued;
        let waiter = state.waiter.take().map(PermissionWaiter);

        let registration = match state.pending.take() {
            Some((_, request)) if issued > state.latest_arrived => {
                debug!(
                    user_id = %request.user_id,
                    "A later registration is in flight, dropping pending one"
                );
                None
            }
            Some((_, request)) => {
                info!(
                    user_id = %request.user_id,
                    granted = granted,
                    "Consent result received, resuming registration"
                );
                Some(request)
            }
            None => {
                debug!(granted = granted, "Consent result with no pending registration");
                None
            }
        };

        ConsentOutcome {
            registration,
            waiter,
        }
    }

    pub fn pending_user(&self) -> Option<String> {
        self.lock().pending.as_ref().map(|(_, p)| p.user_id.clone())
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
