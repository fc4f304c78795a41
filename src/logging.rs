use crate::error::{Error, Result};
use tracing::Level;
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Install the global subscriber. `RUST_LOG` overrides `level`.
///
/// Logs go to stderr so that reports printed on stdout stay machine readable.
pub fn init_logging(level: Level, json_output: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let installed = if json_output {
        let fmt_layer = fmt::layer()
            .json()
            .with_timer(SystemTime)
            .with_target(true)
            .with_thread_names(true)
            .with_writer(std::io::stderr);

        Registry::default().with(env_filter).with(fmt_layer).try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_timer(SystemTime)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(true)
            .with_writer(std::io::stderr);

        Registry::default().with(env_filter).with(fmt_layer).try_init()
    };

    installed.map_err(|e| Error::Generic(format!("logging already initialized: {}", e)))
}

fn default_directives(level: Level) -> String {
    format!("hybridjoin_dw={},warn", level.as_str().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives(Level::INFO), "hybridjoin_dw=info,warn");
        assert_eq!(default_directives(Level::DEBUG), "hybridjoin_dw=debug,warn");
    }
}
