//! Tracing and diagnostics bootstrap for binaries and demos.
//!
//! Library code only emits through `tracing` macros; wiring a subscriber is
//! the embedding application's call. These helpers give applications the
//! standard setup in one line each.

use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber: env-filtered fmt output plus span
/// traces for error reports. Respects `RUST_LOG`; defaults to warnings from
/// this crate only. Panics if a global subscriber is already set.
pub fn init_tracing() {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn,flowgrid=warn"))
        .expect("static filter directive parses");

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

/// Install miette's panic hook for pretty panic reports.
pub fn init_miette() {
    miette::set_panic_hook();
}
