//! ==============================================================================
//! main.rs - sensor dashboard entry point
//! ==============================================================================
//!
//! purpose:
//!     accepts numeric sensor readings over http, stores them in sqlite and
//!     pushes the latest ones to every open dashboard over a websocket.
//!
//! responsibilities:
//!     - load configuration (config/dashboard.toml or defaults)
//!     - initialize tracing
//!     - open the sqlite store
//!     - serve the json api, the dashboard page and the push channel
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                    dashboard process                         │
//!     │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//!     │  │ http api    │  │ websocket   │  │ broadcast loop      │  │
//!     │  │ (crud)      │  │ (/ws)       │  │ (1s tick, lazy)     │  │
//!     │  └──────┬──────┘  └──────┬──────┘  └──────────┬──────────┘  │
//!     │         │                │ sort/filter        │             │
//!     │         │                ▼                    │             │
//!     │         │         ┌─────────────┐             │             │
//!     │         │         │ViewSettings │◄────────────┤             │
//!     │         │         └─────────────┘             │             │
//!     │         │                                     │             │
//!     │         └──────────────►┌─────────┐◄──────────┘             │
//!     │                         │ sqlite  │                         │
//!     │                         └─────────┘                         │
//!     └─────────────────────────────────────────────────────────────┘
//!
//! ==============================================================================

use anyhow::{Context, Result};
use sensor_dashboard::clock::Clock;
use sensor_dashboard::{logging, server, AppState, DashboardConfig, Store};

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Sensor Dashboard");
    println!("===========================================================");

    // step 1: load configuration
    let config = DashboardConfig::load_or_default();
    config.print_summary();

    // step 2: logging
    logging::init(&config.logging.level)?;

    // step 3: open the store
    let clock = Clock::with_offset_minutes(config.clock.utc_offset_minutes);
    let store = Store::open(&config.database.path, &clock)
        .with_context(|| format!("failed to open database {}", config.database.path.display()))?;

    // step 4: serve until the process dies
    let state = AppState::new(store, &config);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!("dashboard live at http://{}", listener.local_addr()?);

    if let Err(e) = server::serve(listener, state).await {
        tracing::error!(error = %e, "web server error");
        return Err(e);
    }
    Ok(())
}
