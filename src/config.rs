use std::env;

use crate::error::{EntrigError, Result};

pub const DEFAULT_BASE_URL: &str = "https://wlbsugnskuojugsubnjj.supabase.co/functions/v1";
pub const DEFAULT_CHANNEL_ID: &str = "default";
pub const DEFAULT_CHANNEL_NAME: &str = "General";
pub const DEFAULT_APP_ID: &str = "com.entrig.device";

/// SDK configuration. Validated once and never mutated after the SDK is built.
#[derive(Debug, Clone)]
pub struct SdkConfig {
    pub api_key: String,
    pub app_id: String,
    pub base_url: String,
    pub handle_permission_automatically: bool,
    pub notification_channel_id: String,
    pub notification_channel_name: String,
    pub show_foreground_notification: bool,
}

impl SdkConfig {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let config = Self {
            api_key: api_key.into(),
            app_id: DEFAULT_APP_ID.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            handle_permission_automatically: true,
            notification_channel_id: DEFAULT_CHANNEL_ID.to_string(),
            notification_channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            show_foreground_notification: true,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        let api_key = env::var("ENTRIG_API_KEY")
            .map_err(|_| EntrigError::InvalidConfig("ENTRIG_API_KEY must be set".to_string()))?;

        let mut config = Self::new(api_key)?;
        if let Ok(app_id) = env::var("ENTRIG_APP_ID") {
            config.app_id = app_id;
        }
        if let Ok(base_url) = env::var("ENTRIG_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(channel_id) = env::var("ENTRIG_CHANNEL_ID") {
            config.notification_channel_id = channel_id;
        }
        if let Ok(channel_name) = env::var("ENTRIG_CHANNEL_NAME") {
            config.notification_channel_name = channel_name;
        }
        config.handle_permission_automatically = env_flag("ENTRIG_HANDLE_PERMISSION", true);
        config.show_foreground_notification = env_flag("ENTRIG_SHOW_FOREGROUND", true);

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(EntrigError::InvalidConfig(
                "API key cannot be empty".to_string(),
            ));
        }
        if self.base_url.is_empty() {
            return Err(EntrigError::InvalidConfig(
                "base URL cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    pub fn with_permission_handling(mut self, automatic: bool) -> Self {
        self.handle_permission_automatically = automatic;
        self
    }

    pub fn with_channel(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.notification_channel_id = id.into();
        self.notification_channel_name = name.into();
        self
    }

    pub fn with_foreground_notifications(mut self, show: bool) -> Self {
        self.show_foreground_notification = show;
        self
    }
}

/// `true` or `1` enable a flag; anything else set disables it.
pub fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}
