//! Receives conflict reports from the browser-side detector.
//!
//! When several plugins or themes load their own copy of Font Awesome, the
//! detector running on the page reports each script or style that looks like
//! Font Awesome but was not loaded by Font Awesome itself. Reports are only
//! accepted while the detection window is open, and are merged into the map
//! of unregistered clients kept in the options store.

pub mod admin;
pub mod auth;
pub mod clock;
pub mod config;
pub mod errors;
pub mod merger;
pub mod metrics_defs;
pub mod report;
pub mod router;
pub mod service;
pub mod window;

#[cfg(test)]
mod testutils;

use clock::SystemClock;
use merger::ConflictReportMerger;
use service::ConflictDetectionService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub use errors::ConflictDetectionError;

const READINESS_PROBE_INTERVAL: Duration = Duration::from_secs(5);

pub async fn run(config: config::Config) -> Result<(), ConflictDetectionError> {
    shared::metrics_defs::describe_all(metrics_defs::ALL_METRICS);

    let store = options_store::from_config(&config.options_store)?;
    let merger = Arc::new(ConflictReportMerger::new(store, Arc::new(SystemClock)));

    // Ready once the options store has answered a read.
    let ready = Arc::new(AtomicBool::new(false));
    tokio::spawn(probe_store(
        merger.clone(),
        ready.clone(),
        READINESS_PROBE_INTERVAL,
    ));

    let service = ConflictDetectionService::from_config(&config, merger);
    for route in service.router().routes() {
        tracing::info!(method = %route.method, path = %route.path, "serving route");
    }

    let admin_service: AdminService<_, ConflictDetectionError> =
        AdminService::new(move || ready.load(Ordering::Relaxed));

    let service_task = run_http_service(&config.listener.host, config.listener.port, service);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(service_task, admin_task)?;
    Ok(())
}

async fn probe_store(
    merger: Arc<ConflictReportMerger>,
    ready: Arc<AtomicBool>,
    retry_interval: Duration,
) {
    loop {
        match merger.detection_window().await {
            Ok(window) => {
                tracing::info!(
                    detecting_until = ?window.expires_at(),
                    "options store is reachable"
                );
                ready.store(true, Ordering::Relaxed);
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "options store is not reachable");
                tokio::time::sleep(retry_interval).await;
            }
        }
    }
}
