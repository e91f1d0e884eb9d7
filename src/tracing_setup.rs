use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber: `level` is an `EnvFilter` directive, `json_format`
/// picks JSON over pretty output. Logs go to stderr.
pub fn init_tracing_with_config(level: &str, json_format: bool, include_spans: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}"))?;

    // stdout carries generated documents
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json_format {
        Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(include_spans)
                    .with_span_list(include_spans),
            )
            .init();
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .init();
    }

    tracing::debug!(level, json_format, include_spans, "sbforge logging initialized");
    Ok(())
}

/// Configure tracing for specific service components
pub fn configure_component_tracing(component: &str) -> tracing::Span {
    tracing::info_span!("component", name = component)
}

/// Create a span covering one compilation of the engine document
pub fn create_compile_span(engine_version: &str) -> tracing::Span {
    tracing::info_span!(
        "compile",
        engine.version = engine_version,
        engine.dialect = tracing::field::Empty,
        inbounds = tracing::field::Empty,
        skipped = tracing::field::Empty,
    )
}

/// Create a span around writing the engine document
pub fn create_deploy_span(target: &str) -> tracing::Span {
    tracing::info_span!(
        "deploy",
        target = target,
        bytes = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}
