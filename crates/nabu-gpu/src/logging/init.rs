use std::sync::Once;

/// Logger configuration.
///
/// `env_filter` follows the `env_logger` filter syntax (e.g. "info",
/// "nabu_gpu=debug,wgpu_core=warn"). When unset, `RUST_LOG` is consulted, then
/// `default_level` applies to this crate while wgpu stays at `warn`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub default_level: log::LevelFilter,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            default_level: log::LevelFilter::Info,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

impl LoggingConfig {
    /// The filter string handed to `env_logger`.
    pub fn resolve_filter(&self) -> String {
        if let Some(filter) = &self.env_filter {
            return filter.clone();
        }
        if let Ok(filter) = std::env::var("RUST_LOG") {
            return filter;
        }
        // wgpu is chatty at info; keep it to problems unless asked.
        format!(
            "{},wgpu_core=warn,wgpu_hal=warn,naga=warn",
            self.default_level.to_string().to_lowercase()
        )
    }
}

static INIT: Once = Once::new();

/// Initializes the global logger once.
///
/// This function is idempotent; subsequent calls are ignored.
/// Intended usage is early in `main`.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder.parse_filters(&config.resolve_filter());
        builder.write_style(config.write_style);

        // Another logger may already be installed (tests, host applications).
        if builder.try_init().is_err() {
            return;
        }

        log::debug!("logging initialized");
    });
}
