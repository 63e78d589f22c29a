//! In-process platform used by the `entrig-device` host: tokens are random
//! UUIDs, consent is answered through the control API and notifications are
//! logged and kept for inspection.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::info;
use uuid::Uuid;

use crate::error::{EntrigError, Result};
use crate::models::{FcmParams, NotificationEvent, TapIntent};
use crate::platform::{NotificationPresenter, PermissionPrompt, SurfaceId, TokenProvider};

const MAX_SHOWN: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct ShownNotification {
    pub channel_id: String,
    pub event: NotificationEvent,
    pub tap: TapIntent,
    pub shown_at: String,
}

pub struct HeadlessPlatform {
    token: Mutex<Option<String>>,
    params: Mutex<Option<FcmParams>>,
    consent_required: bool,
    consent_granted: AtomicBool,
    prompts: Mutex<Vec<SurfaceId>>,
    channels: Mutex<Vec<(String, String)>>,
    shown: Mutex<Vec<ShownNotification>>,
}

impl HeadlessPlatform {
    pub fn new(consent_required: bool) -> Self {
        Self {
            token: Mutex::new(None),
            params: Mutex::new(None),
            consent_required,
            consent_granted: AtomicBool::new(false),
            prompts: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        *lock(&self.token) = Some(token.into());
        self
    }

    /// Issues a fresh token, as the push transport does on rotation.
    pub fn rotate_token(&self) -> String {
        let token = Uuid::new_v4().to_string();
        *lock(&self.token) = Some(token.clone());
        info!("Push token rotated");
        token
    }

    pub fn set_consent(&self, granted: bool) {
        self.consent_granted.store(granted, Ordering::SeqCst);
    }

    pub fn params(&self) -> Option<FcmParams> {
        lock(&self.params).clone()
    }

    pub fn prompts(&self) -> Vec<SurfaceId> {
        lock(&self.prompts).clone()
    }

    pub fn channels(&self) -> Vec<(String, String)> {
        lock(&self.channels).clone()
    }

    pub fn shown(&self) -> Vec<ShownNotification> {
        lock(&self.shown).clone()
    }
}

#[async_trait]
impl TokenProvider for HeadlessPlatform {
    async fn configure(&self, params: &FcmParams) -> Result<()> {
        if params.app_id.is_empty() {
            return Err(EntrigError::Platform(
                "transport parameters are missing an app id".to_string(),
            ));
        }
        *lock(&self.params) = Some(params.clone());
        Ok(())
    }

    async fn get_token(&self) -> Result<String> {
        let mut token = lock(&self.token);
        Ok(token
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone())
    }

    async fn delete_token(&self) -> Result<()> {
        *lock(&self.token) = None;
        Ok(())
    }
}

impl PermissionPrompt for HeadlessPlatform {
    fn consent_required(&self) -> bool {
        self.consent_required
    }

    fn consent_granted(&self) -> bool {
        self.consent_granted.load(Ordering::SeqCst)
    }

    fn request_consent(&self, surface: SurfaceId) {
        info!(surface = ?surface, "Notification permission requested");
        lock(&self.prompts).push(surface);
    }
}

impl NotificationPresenter for HeadlessPlatform {
    fn create_channel(&self, channel_id: &str, channel_name: &str) {
        info!(
            channel_id = %channel_id,
            channel_name = %channel_name,
            "Notification channel created"
        );
        lock(&self.channels).push((channel_id.to_string(), channel_name.to_string()));
    }

    fn show(&self, channel_id: &str, event: &NotificationEvent, tap: TapIntent) {
        info!(
            channel_id = %channel_id,
            title = %event.title,
            message_id = %tap.message_id,
            "Showing notification"
        );
        let mut shown = lock(&self.shown);
        if shown.len() >= MAX_SHOWN {
            shown.remove(0);
        }
        shown.push(ShownNotification {
            channel_id: channel_id.to_string(),
            event: event.clone(),
            tap,
            shown_at: chrono::Utc::now().to_rfc3339(),
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
