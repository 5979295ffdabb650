//! WebSocket gateway for real-time room-state sync.
//!
//! Clients connect to `/roomhub`, join rooms, and push state changes that
//! fan out to every member of the room.

pub mod auth;
pub mod config;
pub mod connection;
pub mod gateway;
pub mod handlers;
pub mod registry;
pub mod router;
pub mod rpc;
pub mod server;
pub mod session;

pub use auth::JwtAuthenticator;
pub use config::{load_settings, Settings, SettingsError};
pub use gateway::Gateway;
pub use server::{start, ServerHandle};
