// ─────────────────────────────────────────────────────────────────────
// Stage timing
// ─────────────────────────────────────────────────────────────────────

use std::time::Instant;
use tracing::info;

/// Run `f` and log how long it took under `label`.
pub fn timeit<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let t0 = Instant::now();
    let out = f();
    info!("{label:<20}{:?}", t0.elapsed());
    out
}
