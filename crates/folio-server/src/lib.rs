//! Folio server: HTTP surface and offline setup for the portfolio chat.

pub mod routes;
pub mod setup;
pub mod state;
pub mod transport;

pub use routes::build_router;
pub use state::AppState;
