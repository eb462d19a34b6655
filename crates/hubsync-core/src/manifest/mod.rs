//! Parsers for the files whose content drives derived repository metadata.

mod library;
mod model_config;
mod readme;

pub use library::library_tag_for_file;
pub use model_config::extract_architecture;
pub use readme::{front_matter, parse_meta_tags, META_TAG_KEYS};
