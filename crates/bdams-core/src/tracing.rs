use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "warn";

/// Initialize JSON tracing on stderr, filtered by `RUST_LOG`.
///
/// Stdout is left to the caller (the CLI prints results there). Later calls
/// are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_ignore_repeated_initialization() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn should_parse_default_filter() {
        assert!(DEFAULT_FILTER.parse::<EnvFilter>().is_ok());
    }
}
