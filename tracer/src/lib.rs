use tracing::subscriber::set_global_default;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// Installs the process-wide tracing subscriber for a simulation run: an `EnvFilter`
/// layer driven by `log_level` (falling back to `"info"`) plus a human-readable pretty
/// layer and a machine-parseable JSON layer, both writing to stdout.
pub fn init_tracing(service_name: &'static str, log_level: Option<&str>) {
    let env_filter = EnvFilter::new(log_level.unwrap_or("info"));

    let pretty_layer = tracing_subscriber::fmt::layer().pretty();
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_level(true)
        .with_current_span(true)
        .with_thread_names(true);

    let subscriber = Registry::default()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer);

    set_global_default(subscriber)
        .unwrap_or_else(|_| panic!("failed to set tracing subscriber for {service_name}"));
}

#[cfg(test)]
mod tests {}
