// Persistence gateway: the transactional store of users and access records.
//
// Access records are only ever created through `Store`; nothing else in the
// crate talks to SQLite.

mod db;
mod models;

pub use db::Store;
pub use models::{AccessRecord, Direction, User, normalize_identifier};
