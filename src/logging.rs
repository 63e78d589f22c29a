use std::env;
use tracing_subscriber::{fmt, EnvFilter};

// Third-party targets that only matter when something is wrong
const QUIET_TARGETS: [&str; 3] = ["hyper", "reqwest", "tower_http"];

/// Installs the fmt subscriber. `RUST_LOG` wins when set; otherwise `LOG_LEVEL`
/// (default `info`) applies to the SDK and the device host.
pub fn setup_logging() {
    let level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = vec![
            format!("entrig_sdk={}", level),
            format!("entrig_device={}", level),
            // Per-message duplicate and status-report logs
            "entrig_sdk::delivery=warn".to_string(),
        ];
        directives.extend(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)));
        EnvFilter::new(directives.join(","))
    });

    // An embedding host may already own the global subscriber
    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(level = %level, "Logging initialized");
    }
}
