//! Client-side push registration and delivery tracking for the Entrig
//! notification service.
//!
//! ```no_run
//! use std::sync::Arc;
//! use entrig_sdk::{Entrig, HeadlessPlatform, MemoryTokenStore, Platform, SdkConfig};
//!
//! # async fn run() -> entrig_sdk::Result<()> {
//! let config = SdkConfig::new("your-api-key")?;
//! let platform = Platform::from_shared(Arc::new(HeadlessPlatform::new(false)));
//! let (sdk, ui) = Entrig::new(config, platform, Arc::new(MemoryTokenStore::new()))?;
//! tokio::spawn(ui.run());
//!
//! sdk.initialize().await?;
//! sdk.register("user-123", "android", None, |result| {
//!     if let Err(e) = result {
//!         eprintln!("registration failed: {}", e);
//!     }
//! });
//! sdk.set_opened_listener(Some(|event: entrig_sdk::NotificationEvent| {
//!     println!("opened: {}", event.title);
//! }));
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod backend;
pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod headless;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod permission;
pub mod platform;
pub mod registration;
pub mod router;
pub mod sdk;
pub mod token_store;

pub use config::SdkConfig;
pub use dispatch::{UiDispatcher, UiLoop};
pub use error::{EntrigError, Result};
pub use headless::HeadlessPlatform;
pub use models::{
    InboundMessage, NotificationEvent, OpenIntent, RegistrationAck, RegistrationRecord, TapIntent,
};
pub use platform::{NotificationPresenter, PermissionPrompt, SurfaceId, TokenProvider};
pub use sdk::{Entrig, Platform};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
