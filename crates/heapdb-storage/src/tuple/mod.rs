//! Row data model.
//!
//! Rows are fixed-width: every field type has a constant encoded width,
//! so a schema fully determines how many rows fit on a page.

mod row;
mod schema;
mod value;

pub use row::{RecordId, Row};
pub use schema::{FieldType, Schema, SchemaField};
pub use value::Value;
