use std::path::Path;

use slog::Logger;
use sloggers::{Config, LoggerConfig};

fn default_toml() -> &'static str {
    r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#
}

/// Builds the root logger from a config file if one is given, falling back to the same terminal
/// default `flux::logging::init` uses. Every reactor component threads the resulting `Logger`
/// through explicitly rather than reaching for a global.
pub fn root_logger<P: AsRef<Path>>(config_path: Option<P>) -> Logger {
    let config: LoggerConfig = match config_path {
        Some(path) => serdeconv::from_toml_file(path).expect("error loading logging configuration"),
        None => serdeconv::from_toml_str(default_toml()).expect("default logging config is malformed"),
    };
    config.build_logger().expect("failed to build logger from config")
}

pub fn init() -> Logger {
    root_logger::<&str>(None)
}
