mod apply;
mod parse;
mod types;

pub use apply::apply_update;
pub use parse::{parse_update_doc, parse_update_json};
pub use types::{CLASS_PERMISSIONS_KEY, METADATA_KEY, UpdateDoc};
