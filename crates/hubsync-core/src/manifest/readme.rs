//! README front matter → declared meta tags.

use crate::config::ManifestConfig;
use crate::error::{Result, SyncError};
use crate::types::DeclaredTag;
use regex::Regex;
use serde_yaml::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Front-matter keys whose values become meta tags.
pub const META_TAG_KEYS: &[&str] = &[
    "tags",
    "license",
    "language",
    "task_categories",
    "task_ids",
    "pipeline_tag",
    "size_categories",
    "frameworks",
];

/// YAML block between a leading `---` line and the next `---` line.
static FRONT_MATTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)\A\x{FEFF}?---[ \t]*\r?\n(.*?)^---[ \t]*\r?$").unwrap()
});

/// Extract the raw front-matter block, if the document has one.
pub fn front_matter(content: &str) -> Option<&str> {
    FRONT_MATTER
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Parse the meta tags a README declares.
///
/// Empty content or a document without front matter declares nothing.
pub fn parse_meta_tags(content: &str) -> Result<BTreeSet<DeclaredTag>> {
    let mut declared = BTreeSet::new();
    let Some(block) = front_matter(content) else {
        return Ok(declared);
    };
    if block.trim().is_empty() {
        return Ok(declared);
    }

    let document: Value = serde_yaml::from_str(block).map_err(|e| {
        SyncError::parse(
            ManifestConfig::README_FILE_NAME,
            format!("invalid front matter: {}", e),
        )
    })?;
    let mapping = match document {
        Value::Mapping(mapping) => mapping,
        Value::Null => return Ok(declared),
        _ => {
            return Err(SyncError::parse(
                ManifestConfig::README_FILE_NAME,
                "front matter is not a mapping",
            ))
        }
    };

    for key in META_TAG_KEYS {
        let Some(value) = mapping.get(*key) else {
            continue;
        };
        let values = match value {
            Value::Sequence(items) => items.iter().filter_map(scalar_text).collect(),
            other => scalar_text(other).into_iter().collect::<Vec<_>>(),
        };
        for name in values {
            declared.insert(DeclaredTag::new(*key, name));
        }
    }

    Ok(declared)
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tags: &BTreeSet<DeclaredTag>) -> Vec<(String, String)> {
        tags.iter()
            .map(|t| (t.group.clone(), t.name.clone()))
            .collect()
    }

    #[test]
    fn test_parse_meta_tags() {
        let readme = "---\nlicense: apache-2.0\ntags:\n  - nlp\n  - text-classification\nlanguage: [en, zh]\n---\n# Model card\n";
        let tags = parse_meta_tags(readme).unwrap();
        assert_eq!(
            names(&tags),
            vec![
                ("language".into(), "en".into()),
                ("language".into(), "zh".into()),
                ("license".into(), "apache-2.0".into()),
                ("tags".into(), "nlp".into()),
                ("tags".into(), "text-classification".into()),
            ]
        );
    }

    #[test]
    fn test_empty_content_declares_nothing() {
        assert!(parse_meta_tags("").unwrap().is_empty());
        assert!(parse_meta_tags("# Just a heading\n\n---\ntags: [x]\n---\n")
            .unwrap()
            .is_empty());
        assert!(parse_meta_tags("---\n---\nbody").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_keys_and_blank_values_are_ignored() {
        let readme = "---\nlicense: ' '\nwidget: foo\ntags: [a, '', a, b]\nmodel-index:\n  - name: x\n---\n";
        let tags = parse_meta_tags(readme).unwrap();
        assert_eq!(
            names(&tags),
            vec![("tags".into(), "a".into()), ("tags".into(), "b".into())]
        );
    }

    #[test]
    fn test_invalid_yaml_is_a_parse_error() {
        let err = parse_meta_tags("---\ntags: [unterminated\n---\n").unwrap_err();
        assert!(matches!(err, SyncError::ManifestParse { .. }));
    }

    #[test]
    fn test_non_mapping_front_matter() {
        let err = parse_meta_tags("---\n- a\n- b\n---\n").unwrap_err();
        assert!(matches!(err, SyncError::ManifestParse { .. }));
    }

    #[test]
    fn test_crlf_front_matter() {
        let tags = parse_meta_tags("---\r\ntags: [vision]\r\n---\r\nbody").unwrap();
        assert_eq!(names(&tags), vec![("tags".into(), "vision".into())]);
    }
}
