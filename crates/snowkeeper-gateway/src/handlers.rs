mod health;
mod id;

pub use health::health_handler;
pub use id::{identity_handler, uuid_handler};
