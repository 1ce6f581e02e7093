//! SQLite storage for scraped route and stop data
//!
//! Provides persistent storage for the route list, the latest stop list
//! of every swept route, and append-only realtime arrival samples.

pub mod repository;
pub mod schema;

pub use repository::{BusRepository, StoreError};
pub use schema::Schema;
