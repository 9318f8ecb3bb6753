use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Rolling file appender for the configured rotation ("hourly", "daily",
/// anything else never rotates).
fn file_appender(config: &AppConfig) -> RollingFileAppender {
    match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    }
}

/// `RUST_LOG` wins over `log_level`; sqlx statement logging stays at warn
/// unless asked for explicitly.
fn env_filter(config: &AppConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", config.log_level)))
}

/// Install the global subscriber. Keep the guard alive for the process
/// lifetime or buffered lines are lost on exit.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender(config));
    let registry = tracing_subscriber::registry().with(env_filter(config));

    // The console layer is typed by the stack beneath it, so each branch
    // builds its own.
    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let console_layer = config
            .log_console
            .then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));
        registry.with(file_layer).with(console_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let console_layer = config
            .log_console
            .then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));
        registry.with(file_layer).with(console_layer).init();
    }

    guard
}
