use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::backend::BackendClient;
use crate::error::{EntrigError, Result};
use crate::metrics::{REGISTRATIONS_SENT, REGISTRATIONS_SKIPPED};
use crate::models::{RegistrationAck, RegistrationRecord};
use crate::platform::TokenProvider;
use crate::token_store::TokenStore;

/// Label sent with registrations that do not name their SDK, e.g. token rotation.
pub const DEFAULT_SDK_LABEL: &str = "android";

pub struct RegistrationClient {
    backend: BackendClient,
    store: Arc<dyn TokenStore>,
    tokens: Arc<dyn TokenProvider>,
    initialized: AtomicBool,
}

impl RegistrationClient {
    pub fn new(
        backend: BackendClient,
        store: Arc<dyn TokenStore>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            backend,
            store,
            tokens,
            initialized: AtomicBool::new(false),
        }
    }

    /// Fetches transport parameters and configures the token provider. Every
    /// other operation fails with `NotInitialized` until this succeeds.
    pub async fn bootstrap(&self, app_id: &str) -> Result<()> {
        let params = self.backend.fcm_params(app_id).await?;
        self.tokens.configure(&params).await?;
        self.initialized.store(true, Ordering::SeqCst);
        info!(app_id = %app_id, project_id = ?params.project_id, "Push transport configured");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub async fn register(&self, user_id: &str, sdk_label: &str) -> Result<RegistrationAck> {
        self.ensure_initialized()?;

        if let Some(record) = self.store.load().await? {
            if record.user_id == user_id {
                REGISTRATIONS_SKIPPED.inc();
                debug!(user_id = %user_id, "Already registered, skipping token fetch");
                return Ok(RegistrationAck::AlreadyRegistered);
            }
        }

        let token = self.tokens.get_token().await?;
        self.register_with_token(user_id, &token, sdk_label).await
    }

    pub async fn register_with_token(
        &self,
        user_id: &str,
        token: &str,
        sdk_label: &str,
    ) -> Result<RegistrationAck> {
        self.ensure_initialized()?;

        if let Some(record) = self.store.load().await? {
            if record.user_id == user_id && record.push_token == token {
                REGISTRATIONS_SKIPPED.inc();
                debug!(user_id = %user_id, "Already registered with same user and token");
                return Ok(RegistrationAck::AlreadyRegistered);
            }
        }

        let registration_id = match self.backend.register(user_id, token, sdk_label).await {
            Ok(id) => id,
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Token registration failed");
                return Err(e);
            }
        };
        REGISTRATIONS_SENT.inc();

        let record = RegistrationRecord {
            registration_id,
            user_id: user_id.to_string(),
            push_token: token.to_string(),
        };
        self.store.save(&record).await?;

        info!(
            user_id = %user_id,
            registration_id = %record.registration_id,
            "Registered push token"
        );
        Ok(RegistrationAck::Registered(record))
    }

    pub async fn refresh_token(&self, user_id: &str, new_token: &str) -> Result<()> {
        self.register_with_token(user_id, new_token, DEFAULT_SDK_LABEL)
            .await
            .map(|_| ())
    }

    /// Re-registers the stored user with a rotated token. No-op without a record.
    pub async fn on_token_rotated(&self, new_token: &str) -> Result<bool> {
        let Some(record) = self.store.load().await? else {
            debug!("Token rotated with no registered user, nothing to refresh");
            return Ok(false);
        };
        self.refresh_token(&record.user_id, new_token).await?;
        Ok(true)
    }

    pub async fn unregister(&self) -> Result<()> {
        self.ensure_initialized()?;

        let record = self.store.load().await?.ok_or(EntrigError::NotRegistered)?;

        self.tokens.delete_token().await?;

        if let Err(e) = self.backend.unregister(&record.registration_id).await {
            warn!(
                registration_id = %record.registration_id,
                error = %e,
                "Backend unregister failed, keeping local record"
            );
            return Err(e);
        }

        self.store.clear().await?;
        info!(user_id = %record.user_id, "Unregistered push token");
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(EntrigError::NotInitialized)
        }
    }
}
