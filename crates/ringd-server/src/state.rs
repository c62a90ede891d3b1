//! Application state shared across handlers.

use std::sync::Arc;

use ringd_core::{RingdConfig, Session, Storage};
use tokio::sync::RwLock;

/// Shared application state.
pub struct AppState {
    /// The one device session this daemon owns.
    pub session: Session,
    /// Snapshot storage, for the readings query path.
    pub storage: Arc<Storage>,
    /// Mutable configuration (the tracked ring can change at runtime).
    pub config: RwLock<RingdConfig>,
}

/// Handler-facing handle to [`AppState`].
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wraps the session, storage, and configuration for sharing across
    /// handlers.
    pub fn shared(session: Session, storage: Arc<Storage>, config: RingdConfig) -> SharedState {
        Arc::new(Self {
            session,
            storage,
            config: RwLock::new(config),
        })
    }
}
