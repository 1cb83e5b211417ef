//! Subscriber setup for the binaries.
//!
//! The library only emits `tracing` events; nothing is printed unless a
//! binary installs a subscriber here.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a console subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the level is `info`, or `debug` for
/// this crate when `verbose` is on. Calling this twice is harmless.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose { "info,island_generator=debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let console_layer = fmt::layer()
        .with_target(verbose)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init();
}
