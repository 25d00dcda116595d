//! Optional structured-logging bootstrap.
//!
//! The pool itself only emits `tracing` events; it never owns a sink. This
//! helper is a convenience for embedding applications that have not
//! already installed their own subscriber.

/// Install a default env-filtered `tracing-subscriber` if none has been set
/// yet. Idempotent: calling this more than once, or after the embedder has
/// installed its own subscriber, is a no-op.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
