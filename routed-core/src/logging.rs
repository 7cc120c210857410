//! Process-wide `tracing` setup: a `fmt` subscriber driven by `RUST_LOG`.
//! Deliberately just the `fmt` + `EnvFilter` layer — no CORS/trace/catch-panic
//! layers, since those belong to a Tower-based host this crate doesn't
//! depend on.

use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber honoring `RUST_LOG`, falling back to
/// `info` when unset. Call once, at the start of `main`, before any
/// `tracing` macro fires. Safe to call more than once — later calls are
/// no-ops (the underlying `tracing` global dispatcher can only be set once
/// per process).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
