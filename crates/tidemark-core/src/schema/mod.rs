mod table;
mod types;

pub use table::{AttributeDefinition, KeySchema, TableSpec, TableSpecBuilder};
pub use types::AttributeType;
