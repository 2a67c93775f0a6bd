//! The datastore crate.
//!
//! This crate stores collections of JSON documents in a single sqlite DB.  There are 3 primary entities:
//!
//! - The database, which takes a directory and scaffolds the sqlite db.
//! - The collection, a table of documents keyed by a unique `_id`, created on first write.
//! - The validator, a [SchemaNode] attached to a collection and checked against every later write.
//!
//! All work happens through a [Transaction].  Collection tables are named like `collection.name` as a quoted sqlite
//! identifier.  Queries go through sqlite's JSON functions, so filters, grouping and indexes address fields by dotted
//! path.  This crate is designed for batch jobs and reports, not to be an ORM.
mod batch;
mod database;
mod errors;
mod object_id;
mod query;
mod schema;
mod validator;

pub use batch::*;
pub use database::*;
pub use errors::*;
pub use object_id::*;
pub use query::{Filter, FindOptions, Sort, SortOrder};
pub use schema::*;
pub use validator::*;
