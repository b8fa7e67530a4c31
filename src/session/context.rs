//! Host application hooks.

/// Host-side policy the session consults before acting.
pub trait SessionContext: Send + Sync {
    /// Whether high-frequency watches may be opened right now (e.g. the host
    /// UI is in the foreground).
    fn high_frequency_allowed(&self) -> bool {
        true
    }
}

/// Context that allows everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullContext;

impl SessionContext for NullContext {}
