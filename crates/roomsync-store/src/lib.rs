pub mod database;
pub mod error;
pub mod memory;
pub mod rooms;
pub mod row_helpers;
pub mod schema;
pub mod store;

pub use database::Database;
pub use error::StoreError;
pub use memory::MemoryStateStore;
pub use rooms::RoomStateRepo;
pub use store::{SqliteStateStore, StateStore};
