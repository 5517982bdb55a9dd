use std::env;
use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, fmt::time};

/// Logs go to stderr so the translation on stdout stays pipeable.
pub fn init_logger() {
    let log_level_str = get_env_var("LOG_LEVEL", "info");
    let log_level = log_level_str.parse::<Level>().unwrap_or(Level::INFO);
    let env_filter = EnvFilter::new(log_level_str);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_timer(time::ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .init();

    tracing::debug!("Logger initialized with level: {}", log_level);
}

fn get_env_var(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
