//! HTTP boundary of the id service.
//!
//! Exposes `GET /uuid` on top of any [`IdGenerator`](snowkeeper_flake::IdGenerator).

pub mod app;
pub mod error;
pub mod handlers;
pub mod model;
pub mod state;

pub use app::App;
pub use state::AppState;
