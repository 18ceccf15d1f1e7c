//! Structured logging for the engine and FIFO, built on `slog`.
//!
//! Hosts that already run their own `slog::Logger` should build a session
//! directly from it (`Logger` is just a type alias); `default()` exists for
//! callers who have none.

pub use slog::{debug, error, info, o, warn, Logger};

/// Builds a terminal-backed logger at debug level, the way `flux::logging`
/// wires up its default sink before any host configuration is loaded.
pub fn default() -> Logger {
    use sloggers::{Config, LoggerConfig};

    let config: LoggerConfig = serdeconv::from_toml_str(
        r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#,
    )
    .expect("embedded default logger config is valid toml");

    config.build_logger().expect("terminal logger always builds")
}
