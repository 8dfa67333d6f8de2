use crate::helper::error_chain_fmt;
use tracing::subscriber::{set_global_default, SetGlobalDefaultError};
use tracing::Subscriber;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::{log_tracer::SetLoggerError, LogTracer};
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, EnvFilter, Registry};

/// Builds the subscriber used by the service and by the integration tests.
///
/// Layers, from bottom to top:
/// - an `EnvFilter` reading `RUST_LOG`, falling back to `fallback_env_filter`
/// - a `JsonStorageLayer` keeping span fields so children inherit their parent context
///   (ex: the `permalink` of the post being ingested is visible on every modality event)
/// - a bunyan JSON formatter writing to `sink`
///
/// # Arguments
/// - `name`: name of the app, written on every record
/// - `fallback_env_filter`: filter level if `RUST_LOG` has not been set
/// - `sink`: where records are written (`std::io::stdout`, `std::io::sink` in tests)
pub fn get_tracing_subscriber<Sink>(
    name: String,
    fallback_env_filter: String,
    sink: Sink,
) -> impl Subscriber + Send + Sync
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_env_filter));

    let formatting_layer = BunyanFormattingLayer::new(name, sink);

    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
}

/// Registers `subscriber` as the global default and redirects `log` records to it.
///
/// Must only be called once per process: a second call fails with
/// `TelemetryError::SubscriberAlreadySet` or `TelemetryError::LoggerAlreadySet`.
pub fn init_tracing_subscriber(
    subscriber: impl Subscriber + Send + Sync,
) -> Result<(), TelemetryError> {
    // Dependencies such as `reqwest` and `rust-bert` still log through the `log` facade
    LogTracer::init()?;
    set_global_default(subscriber)?;

    Ok(())
}

#[derive(thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to redirect `log` records to tracing")]
    LoggerAlreadySet(#[from] SetLoggerError),
    #[error("Failed to set the global tracing subscriber")]
    SubscriberAlreadySet(#[from] SetGlobalDefaultError),
}

impl std::fmt::Debug for TelemetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
