// ─────────────────────────────────────────────────────────────────────
// tracing-subscriber setup for the binary
// ─────────────────────────────────────────────────────────────────────

use tracing_subscriber::EnvFilter;

/// Stage timings and per-period progress are `info`, so that is the
/// default; `-q` drops to warnings, each `-v` goes one level further.
fn level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "warn";
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// `RUST_LOG`, when set, wins over the flags.
pub fn init(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tiffs_to_netcdf={}", level(verbose, quiet))));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
