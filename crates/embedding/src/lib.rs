//! Restaurants with their hygiene inspections embedded.
//!
//! Source data lives in two collections, `restaurants` and `inspections`, where each inspection names its restaurant
//! by the hex form of the restaurant's `_id`.  The [materialize] job joins them into a third collection in which every
//! restaurant carries its inspections inline, guarded by a standing validator ([embedded_restaurant_validator]).
//!
//! The rest of the crate is support for that job: [import] loads exported JSON, [reports] holds the queries run
//! against the result.
mod coercion;
mod config;
mod errors;
pub mod import;
mod materializer;
mod models;
pub mod reports;
mod schema;

pub use coercion::*;
pub use config::*;
pub use errors::*;
pub use materializer::*;
pub use models::*;
pub use schema::*;
