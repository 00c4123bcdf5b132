// Submodules for separation of concerns
mod parse;
mod post_filter;
mod projection;
mod sort;
mod translate;
mod types;

pub use parse::{parse_filter_doc, parse_filter_json};
pub use post_filter::post_filter;
pub use projection::{ALWAYS_KEPT, project_keys};
pub use sort::{sort_specs, wrap_orderby};
pub use translate::translate;
pub use types::{
    Filter, FindOptions, NativeFilter, Order, PreparedQuery, SortDatatype, SortSpec, Translation,
};

use crate::errors::DbError;
use crate::schema::SchemaLookup;

/// Translates the filter and resolves the sort map against the schema. No I/O.
///
/// # Errors
/// Returns `DbError::Translation` when either the filter or the sort cannot be expressed natively.
pub fn prepare(
    filter: Filter,
    sort: Option<&[(String, i32)]>,
    schema: &dyn SchemaLookup,
    class_name: &str,
) -> Result<PreparedQuery, DbError> {
    let translation = translate(&filter)?;
    let sort = match sort {
        Some(s) => sort_specs(s, schema, class_name)?,
        None => Vec::new(),
    };
    Ok(PreparedQuery { original: filter, translation, sort })
}
