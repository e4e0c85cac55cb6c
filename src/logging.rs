use log::LevelFilter;

/// Initialise `env_logger`: `info` for this crate, `warn` for dependencies, `RUST_LOG` wins.
/// Safe to call more than once.
pub fn init() {
    let _ = env_logger::Builder::new()
        .filter_level(LevelFilter::Warn)
        .filter_module("outrank", LevelFilter::Info)
        .parse_default_env()
        .format_timestamp(None)
        .try_init();
}
