//! The relay core: bearer-token authentication gate, live connection
//! registry, per-connection lifecycle, and the classifier that fans
//! platform events out to the matching subscribers.

pub mod auth;
pub mod client;
pub mod message;
pub mod router;
pub mod server;

pub use auth::{AuthedGuild, TokenResolver};
pub use client::{ConnectionRegistry, GREETING};
pub use router::EventRouter;
pub use server::{start, ServerConfig, ServerHandle};
