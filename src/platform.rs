//! Platform collaborators the SDK drives but does not implement: the push
//! token provider, the consent prompt and the notification presenter, plus the
//! slot that tracks which UI surface is currently in the foreground.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::error::Result;
use crate::models::{FcmParams, NotificationEvent, TapIntent};

/// Opaque handle for a UI surface (an activity or window) supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(pub u64);

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Configures the underlying transport with bootstrap parameters.
    async fn configure(&self, params: &FcmParams) -> Result<()>;
    async fn get_token(&self) -> Result<String>;
    async fn delete_token(&self) -> Result<()>;
}

pub trait PermissionPrompt: Send + Sync {
    /// Whether this platform needs explicit runtime consent to post notifications.
    fn consent_required(&self) -> bool;
    fn consent_granted(&self) -> bool;
    /// Shows the prompt on `surface`. The outcome is delivered later through
    /// `Entrig::on_permission_result`.
    fn request_consent(&self, surface: SurfaceId);
}

pub trait NotificationPresenter: Send + Sync {
    fn create_channel(&self, channel_id: &str, channel_name: &str);
    fn show(&self, channel_id: &str, event: &NotificationEvent, tap: TapIntent);
}

/// The surface currently in the foreground, if any. Never owns the surface:
/// the host updates it from its lifecycle notifications.
#[derive(Debug, Default)]
pub struct ForegroundSlot {
    current: Mutex<Option<SurfaceId>>,
}

impl ForegroundSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resumed(&self, surface: SurfaceId) {
        *self.lock() = Some(surface);
    }

    /// Clears the slot only if `surface` is the one currently held.
    pub fn left(&self, surface: SurfaceId) {
        let mut current = self.lock();
        if *current == Some(surface) {
            *current = None;
        }
    }

    pub fn current(&self) -> Option<SurfaceId> {
        *self.lock()
    }

    pub fn is_foreground(&self) -> bool {
        self.current().is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<SurfaceId>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
