//! The parsing-schema data model: typed field definitions, pagination rules,
//! and the [`ParsingSchema`] aggregate that every other crate in this
//! workspace treats as a read-only, versioned value.
//!
//! A schema is immutable within a `version`; this crate enforces the
//! structural invariants (unique field names, dedup keys that exist,
//! valid regexes, self-consistent pagination) but has no opinion on where
//! schemas are persisted — that is the job of the `coordinator` crate's
//! `SchemaStore`.

mod error;
mod field;
mod pagination;
mod schema;

pub use error::{Error, Result};
pub use field::{ExtractionMethod, FieldDefinition, FieldType};
pub use pagination::{PaginationRule, PaginationType};
pub use schema::{FetchMode, NavigationAction, NavigationStep, ParsingSchema};
