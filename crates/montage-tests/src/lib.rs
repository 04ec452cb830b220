//! Integration test crate for the Montage engine.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on every montage crate to verify they work together.

#[cfg(test)]
mod compositor;

#[cfg(test)]
mod scheduling;

#[cfg(test)]
mod persistence;

/// Install a test subscriber so `RUST_LOG` works during test runs.
#[cfg(test)]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
