//! sensor-dashboard: readings in over http, latest readings out over websocket.

pub mod broadcast;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod server;
pub mod store;
pub mod ws;

pub use broadcast::{BroadcastSettings, Broadcaster};
pub use config::DashboardConfig;
pub use domain::{ClientEvent, Reading, SensorUpdate, ServerEvent, SortOrder, ViewSettings};
pub use server::{router, serve, AppState};
pub use store::{Store, StoreError};
