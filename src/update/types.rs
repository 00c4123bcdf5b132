use bson::Bson;

/// Reserved content key holding per-document metadata.
pub const METADATA_KEY: &str = "_metadata";
/// Metadata sub-key that is always replaced wholesale.
pub const CLASS_PERMISSIONS_KEY: &str = "class_permissions";

pub(crate) const MAX_UPDATE_FIELDS: usize = 128;

/// A parsed update expression. Operators are applied in a fixed order:
/// `unset`, `inc`, `add_to_set`, `pull_all`, then `fields`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpdateDoc {
    pub unset: Vec<String>,
    /// Numeric deltas (Int32, Int64 or Double).
    pub inc: Vec<(String, Bson)>,
    pub add_to_set: Vec<(String, Vec<Bson>)>,
    pub pull_all: Vec<(String, Vec<Bson>)>,
    /// Plain top-level assignments, merged last.
    pub fields: Vec<(String, Bson)>,
}

impl UpdateDoc {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unset.is_empty()
            && self.inc.is_empty()
            && self.add_to_set.is_empty()
            && self.pull_all.is_empty()
            && self.fields.is_empty()
    }

    #[must_use]
    pub fn has_operators(&self) -> bool {
        !(self.unset.is_empty()
            && self.inc.is_empty()
            && self.add_to_set.is_empty()
            && self.pull_all.is_empty())
    }

    /// A schema field definition add: exactly one plain, undotted key whose value is a type name.
    #[must_use]
    pub fn single_field_definition(&self) -> Option<(&str, &Bson)> {
        if self.has_operators() || self.fields.len() != 1 {
            return None;
        }
        let (name, value) = &self.fields[0];
        if name.contains('.') {
            return None;
        }
        match value {
            Bson::String(ty) if crate::schema::FieldType::from_name(ty).is_some() => {
                Some((name.as_str(), value))
            }
            _ => None,
        }
    }
}
