use color_eyre::eyre;
use tracing_subscriber::layer::SubscriberExt;

#[derive(Debug, Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogFormat {
    Json,
    #[default]
    Compact,
}

/// Map the number of `-v` flags to a level. Warnings are always shown.
pub fn level_from_verbosity(verbose: u8) -> tracing::metadata::Level {
    match verbose {
        0 => tracing::metadata::Level::WARN,
        1 => tracing::metadata::Level::INFO,
        2 => tracing::metadata::Level::DEBUG,
        _ => tracing::metadata::Level::TRACE,
    }
}

/// Install the global subscriber. Logs go to stderr so rendered output on
/// stdout stays clean. `RUST_LOG` takes precedence over `log_level`.
pub fn setup_logging(
    log_level: Option<tracing::metadata::Level>,
    log_format: Option<LogFormat>,
) -> eyre::Result<LogFormat> {
    let default_log_level = log_level.unwrap_or(tracing::metadata::Level::WARN);
    let default_env_filter = tracing_subscriber::filter::EnvFilter::builder()
        .with_default_directive(default_log_level.into())
        .parse(default_log_level.to_string().to_ascii_lowercase())?;

    let env_filter = match std::env::var("RUST_LOG").ok() {
        Some(directive) => match tracing_subscriber::filter::EnvFilter::builder().parse(&directive) {
            Ok(env_filter) => env_filter,
            Err(err) => {
                eprintln!("invalid log filter: {err}");
                eprintln!("falling back to default logging");
                default_env_filter
            }
        },
        None => default_env_filter,
    };

    let log_format = log_format.unwrap_or_default();
    let use_color = std::io::IsTerminal::is_terminal(&std::io::stderr());

    let fmt_layer_compact = tracing_subscriber::fmt::Layer::new()
        .compact()
        .without_time()
        .with_target(false)
        .with_ansi(use_color)
        .with_writer(std::io::stderr);
    let fmt_layer_json = tracing_subscriber::fmt::Layer::new()
        .json()
        .without_time()
        .with_writer(std::io::stderr);

    let subscriber = tracing_subscriber::registry()
        .with((log_format == LogFormat::Json).then_some(fmt_layer_json))
        .with((log_format == LogFormat::Compact).then_some(fmt_layer_compact))
        .with(env_filter);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(log_format)
}
