//! # ringd-server
//!
//! HTTP server for the ringd smart ring logging system.
//!
//! This binary provides:
//! - REST API for ring discovery, session control, and stored readings
//! - Server-sent event stream of session notifications
//! - OpenAPI documentation via Swagger UI
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package ringd-server
//!
//! # Production (on the logging host)
//! RINGD_ENV=production ./ringd-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;
use std::sync::Arc;

use ringd_core::{RingdConfig, Session, SnapshotStore, Storage, TransportLink};
use tokio::net::TcpListener;
use tracing::{info, warn};

use ringd_server::{api, logging, state::AppState};

#[cfg(all(not(feature = "bluetooth"), not(feature = "mock-link")))]
compile_error!("ringd-server needs a transport; enable the 'bluetooth' or 'mock-link' feature");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let is_production = std::env::var("RINGD_ENV")
        .map(|value| value == "production")
        .unwrap_or(false);
    logging::init(is_production)?;

    info!("Starting ringd-server");

    let config = RingdConfig::load().unwrap_or_else(|err| {
        warn!(%err, "failed to load configuration; using defaults");
        RingdConfig::default()
    });
    let storage = Arc::new(Storage::open_default()?);

    #[cfg(feature = "bluetooth")]
    let link: Arc<dyn TransportLink> = Arc::new(ringd_core::BleLink::new().await?);
    #[cfg(all(not(feature = "bluetooth"), feature = "mock-link"))]
    let link: Arc<dyn TransportLink> = Arc::new(ringd_core::MockLink::new());

    let session = Session::new(
        link,
        Arc::clone(&storage) as Arc<dyn SnapshotStore>,
        config.sampling.session(),
    );

    let port = config.server.port;
    let state = AppState::shared(session, storage, config);

    // Build the application router
    let app = api::create_router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
