//! Subscriber setup from the `logging` config section.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use edu_avatar_core::config::LoggingConfig;

/// Filter directives: base level (`--verbose` wins over config) then per-crate overrides.
fn directives(logging: &LoggingConfig, verbose: bool) -> String {
    let level = if verbose {
        "debug"
    } else {
        logging.level.as_deref().unwrap_or("info")
    };
    std::iter::once(level)
        .chain(logging.filters.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. `RUST_LOG` takes precedence over config.
pub fn init(logging: &LoggingConfig, verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives = directives(logging, verbose);
        EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let writer = if logging.output == "stdout" {
        BoxMakeWriter::new(std::io::stdout)
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(directives(&LoggingConfig::default(), false), "info");
    }

    #[test]
    fn test_verbose_overrides_level_and_keeps_filters() {
        let logging = LoggingConfig {
            level: Some("warn".into()),
            filters: vec!["edu_avatar_speech=trace".into(), "reqwest=off".into()],
            ..LoggingConfig::default()
        };
        assert_eq!(
            directives(&logging, false),
            "warn,edu_avatar_speech=trace,reqwest=off"
        );
        assert_eq!(
            directives(&logging, true),
            "debug,edu_avatar_speech=trace,reqwest=off"
        );
    }
}
