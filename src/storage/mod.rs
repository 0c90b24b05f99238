mod categories;
mod downloads;
mod entries;
mod items;
mod preferences;
mod repository;
mod schema;
mod types;

pub use schema::Database;
pub use types::{Category, DatabaseError, QueuedDownload};
