use anyhow::{Context, Result};
use entrig_sdk::api;
use entrig_sdk::config::{env_flag, SdkConfig};
use entrig_sdk::logging;
use entrig_sdk::{Entrig, FileTokenStore, HeadlessPlatform, Platform};
use std::sync::Arc;
use std::time::Duration;
use tokio::{signal, sync::oneshot};
use tracing::{error, info};

fn main() -> Result<()> {
    // Build custom runtime with explicit thread configuration
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(num_cpus::get);

    println!("Starting with {} Tokio worker threads", worker_threads);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async {
        // Initialize logging first thing
        logging::setup_logging();

        // Load environment variables from .env file if present
        dotenv::dotenv().ok();

        info!("Starting Entrig device host");

        let config = SdkConfig::from_env()?;

        let store = match std::env::var("ENTRIG_STATE_DIR") {
            Ok(dir) => FileTokenStore::new(dir),
            Err(_) => FileTokenStore::in_default_location()?,
        };
        info!("Registration state at {}", store.path().display());

        let platform = Arc::new(HeadlessPlatform::new(env_flag(
            "ENTRIG_REQUIRE_CONSENT",
            false,
        )));

        let (sdk, ui_loop) = Entrig::new(
            config,
            Platform::from_shared(platform.clone()),
            Arc::new(store),
        )?;

        // Handlers and listeners run here
        let ui_handle = tokio::spawn(ui_loop.run());

        sdk.set_opened_listener(Some(|event: entrig_sdk::NotificationEvent| {
            info!(title = %event.title, "Notification opened");
        }));

        // The host keeps serving when bootstrap fails; register answers NotInitialized
        if let Err(e) = sdk.initialize().await {
            error!("Push transport bootstrap failed: {}", e);
        }

        let api_state = Arc::new(api::ApiState {
            sdk,
            platform,
            register_wait: Duration::from_secs(5),
        });
        let api_router = api::create_api_router(api_state);

        let addr =
            std::env::var("API_BIND_ADDRESS").unwrap_or_else(|_| "127.0.0.1:8686".to_string());
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        info!("Starting API server on {}", addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let api_handle = tokio::spawn(async move {
            let server = axum::serve(listener, api_router).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                error!("API server error: {}", e);
            }
        });

        // Handle graceful shutdown
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received shutdown signal, shutting down gracefully");
            }
        }

        let _ = shutdown_tx.send(());
        let _ = api_handle.await;
        ui_handle.abort();

        info!("Shutdown complete");
        Ok(())
    })
}
