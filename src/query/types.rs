use bson::{Bson, Document as BsonDocument};
use serde::{Deserialize, Serialize};

pub(crate) const MAX_IN_SET: usize = 1000;
pub(crate) const MAX_SORT_FIELDS: usize = 8;
pub(crate) const MAX_FILTER_DEPTH: usize = 32;

/// Rich filter algebra accepted from callers.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    True,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Eq { path: String, value: Bson },
    Ne { path: String, value: Bson },
    In { path: String, values: Vec<Bson> },
    Nin { path: String, values: Vec<Bson> },
    All { path: String, values: Vec<Bson> },
    Exists { path: String, exists: bool },
    /// Array at `path` must be a subset of `values`. Evaluated client-side.
    ContainedBy { path: String, values: Vec<Bson> },
}

impl Filter {
    /// Top-level literal equalities (`{field: value}` with non-null value),
    /// used to seed the content of an upsert insert.
    #[must_use]
    pub fn literal_fields(&self) -> Vec<(String, Bson)> {
        match self {
            Self::Eq { path, value } if !matches!(value, Bson::Null) => {
                vec![(path.clone(), value.clone())]
            }
            Self::And(children) => children.iter().flat_map(Self::literal_fields).collect(),
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::True => "true",
            Self::And(_) => "$and",
            Self::Or(_) => "$or",
            Self::Eq { .. } => "$eq",
            Self::Ne { .. } => "$ne",
            Self::In { .. } => "$in",
            Self::Nin { .. } => "$nin",
            Self::All { .. } => "$all",
            Self::Exists { .. } => "$exists",
            Self::ContainedBy { .. } => "$containedBy",
        }
    }
}

/// A filter in the form the native store executes literally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeFilter(pub BsonDocument);

impl NativeFilter {
    #[must_use]
    pub fn as_document(&self) -> &BsonDocument {
        &self.0
    }

    /// Comma-separated top-level keys; enough to diagnose a failing query in logs.
    #[must_use]
    pub fn shape(&self) -> String {
        self.0.keys().map(String::as_str).collect::<Vec<_>>().join(",")
    }
}

/// Result of translating a [`Filter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    Native(NativeFilter),
    /// The filter can never match; the store must not be queried.
    NoMatch,
}

impl Translation {
    #[must_use]
    pub const fn is_no_match(&self) -> bool {
        matches!(self, Self::NoMatch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDatatype {
    Number,
    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
    pub datatype: SortDatatype,
}

/// Options for `Engine::find`.
///
/// `case_insensitive` and `explain` are accepted for compatibility and have no effect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindOptions {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    /// Caller sort map in order: field and +1/-1.
    pub sort: Option<Vec<(String, i32)>>,
    pub keys: Option<Vec<String>>,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub explain: bool,
    pub hint: Option<String>,
}

/// Original filter threaded alongside its translation and sort.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub original: Filter,
    pub translation: Translation,
    pub sort: Vec<SortSpec>,
}

impl PreparedQuery {
    /// Native filter to submit, with the sort wrapper applied. `None` when nothing can match.
    #[must_use]
    pub fn native(&self) -> Option<NativeFilter> {
        match &self.translation {
            Translation::NoMatch => None,
            Translation::Native(f) => Some(super::sort::wrap_orderby(f, &self.sort)),
        }
    }

    #[must_use]
    pub fn needs_post_filter(&self) -> bool {
        super::post_filter::has_deferred(&self.original)
    }
}
