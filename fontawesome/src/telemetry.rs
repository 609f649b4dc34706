use crate::config::CommonConfig;
use metrics_exporter_statsd::StatsdBuilder;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const METRICS_PREFIX: &str = "fontawesome";

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("could not install log subscriber: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
}

/// Keeps the sentry client alive; events still queued are flushed on drop.
pub struct TelemetryGuard {
    _sentry: Option<sentry::ClientInitGuard>,
}

/// Installs logging, sentry and the statsd recorder as configured.
/// `RUST_LOG` takes precedence over the configured log level.
pub fn init(config: &CommonConfig) -> Result<TelemetryGuard, TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let sentry = config.logging.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .try_init()?;

    if let Some(metrics) = &config.metrics {
        let recorder = StatsdBuilder::from(metrics.statsd_host.clone(), metrics.statsd_port)
            .build(Some(METRICS_PREFIX))
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        metrics::set_global_recorder(recorder)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        tracing::info!(
            host = %metrics.statsd_host,
            port = metrics.statsd_port,
            "sending metrics to statsd"
        );
    }

    Ok(TelemetryGuard { _sentry: sentry })
}
