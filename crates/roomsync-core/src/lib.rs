pub mod auth;
pub mod errors;
pub mod events;
pub mod ids;
pub mod room;

pub use auth::{AuthError, Authenticator, Identity};
pub use errors::SyncError;
pub use events::{Interaction, ServerEvent};
pub use ids::ConnectionId;
pub use room::{RoomId, RoomState};
