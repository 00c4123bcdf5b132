use crate::errors::DbError;
use crate::schema::{FieldType, SchemaLookup};
use bson::{Bson, doc};

use super::types::{MAX_SORT_FIELDS, NativeFilter, Order, SortDatatype, SortSpec};

/// Builds typed sort specs from a caller sort map. Fields the schema declares
/// numeric sort as numbers; everything else sorts as strings.
///
/// # Errors
/// Returns `DbError::Translation` for a direction other than 1/-1 or too many sort fields.
pub fn sort_specs(
    sort: &[(String, i32)],
    schema: &dyn SchemaLookup,
    class_name: &str,
) -> Result<Vec<SortSpec>, DbError> {
    if sort.len() > MAX_SORT_FIELDS {
        return Err(DbError::Translation(format!("too many sort fields: {}", sort.len())));
    }
    sort.iter()
        .map(|(field, dir)| {
            let order = match dir {
                1 => Order::Asc,
                -1 => Order::Desc,
                other => {
                    return Err(DbError::Translation(format!(
                        "invalid sort direction {other} for {field}"
                    )));
                }
            };
            let datatype = match schema.field_type(class_name, field) {
                Some(FieldType::Number) => SortDatatype::Number,
                _ => SortDatatype::String,
            };
            Ok(SortSpec { field: field.clone(), order, datatype })
        })
        .collect()
}

/// Wraps a native filter as `{$query, $orderby}`. Without sort specs the filter is returned unchanged.
#[must_use]
pub fn wrap_orderby(filter: &NativeFilter, specs: &[SortSpec]) -> NativeFilter {
    if specs.is_empty() {
        return filter.clone();
    }
    let orderby: Vec<Bson> = specs
        .iter()
        .map(|s| {
            Bson::Document(doc! {
                "path": s.field.as_str(),
                "datatype": match s.datatype { SortDatatype::Number => "number", SortDatatype::String => "string" },
                "order": match s.order { Order::Asc => "asc", Order::Desc => "desc" },
            })
        })
        .collect();
    NativeFilter(doc! { "$query": filter.0.clone(), "$orderby": orderby })
}
