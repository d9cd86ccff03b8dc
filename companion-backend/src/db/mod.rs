pub mod cache;
pub mod sqlite;
pub mod tables;

pub use cache::DbCache;
pub use sqlite::{Database, DbConn};
