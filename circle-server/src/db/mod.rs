pub mod schema;
pub mod connection;
pub mod repositories;
pub mod rows;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{Database, DbConnection, DbPool};
