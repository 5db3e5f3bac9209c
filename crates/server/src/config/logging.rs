use serde::Deserialize;

/// Log output configuration.
///
/// `RUST_LOG` takes precedence over `level` when set.
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `"info"` or `"hookline_gateway=debug"`.
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit one JSON object per line instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".to_owned()
}
