//! Core domain types: repository identity, tag scopes and runtime frameworks.

use crate::config::ManifestConfig;
use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of repository hosted by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoType {
    Dataset,
    Model,
    Prompt,
    Code,
    Space,
}

impl RepoType {
    pub const ALL: [RepoType; 5] = [
        RepoType::Dataset,
        RepoType::Model,
        RepoType::Prompt,
        RepoType::Code,
        RepoType::Space,
    ];

    /// Canonical singular name, as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoType::Dataset => "dataset",
            RepoType::Model => "model",
            RepoType::Prompt => "prompt",
            RepoType::Code => "code",
            RepoType::Space => "space",
        }
    }

    /// Pluralized token used by the git server in full repository names.
    pub fn plural(&self) -> &'static str {
        match self {
            RepoType::Dataset => "datasets",
            RepoType::Model => "models",
            RepoType::Prompt => "prompts",
            RepoType::Code => "codes",
            RepoType::Space => "spaces",
        }
    }

    /// Parse a pluralized type token (`models`, `datasets`, ...).
    ///
    /// A single trailing `s` is trimmed before matching; the singular form is
    /// accepted as well. Unknown tokens return `None`.
    pub fn from_plural_token(token: &str) -> Option<Self> {
        let token = token.trim();
        let singular = token.strip_suffix('s').unwrap_or(token);
        singular.parse().ok()
    }
}

impl fmt::Display for RepoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RepoType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dataset" => Ok(RepoType::Dataset),
            "model" => Ok(RepoType::Model),
            "prompt" => Ok(RepoType::Prompt),
            "code" => Ok(RepoType::Code),
            "space" => Ok(RepoType::Space),
            _ => Err(()),
        }
    }
}

/// Namespace within which a tag's uniqueness and meaning are defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagScope {
    Dataset,
    Model,
    Prompt,
}

impl TagScope {
    /// Resolve a raw repository-type token to a tag scope.
    ///
    /// Code and space repositories, and unknown tokens, are not tag-bearing and
    /// resolve to `None` ("skip", not an error).
    pub fn resolve(token: &str) -> Option<Self> {
        RepoType::from_plural_token(token).and_then(Self::for_repo_type)
    }

    pub fn for_repo_type(repo_type: RepoType) -> Option<Self> {
        match repo_type {
            RepoType::Dataset => Some(TagScope::Dataset),
            RepoType::Model => Some(TagScope::Model),
            RepoType::Prompt => Some(TagScope::Prompt),
            RepoType::Code | RepoType::Space => None,
        }
    }

    pub fn repo_type(&self) -> RepoType {
        match self {
            TagScope::Dataset => RepoType::Dataset,
            TagScope::Model => RepoType::Model,
            TagScope::Prompt => RepoType::Prompt,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.repo_type().as_str()
    }
}

impl std::str::FromStr for TagScope {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse::<RepoType>()
            .ok()
            .and_then(TagScope::for_repo_type)
            .ok_or(())
    }
}

/// Category of a tag; each category has its own update discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagCategory {
    /// Toggled per file as weight/data files appear and disappear.
    Library,
    /// Declared in the README front matter; replaced wholesale.
    Meta,
    /// Mirrors the runtime framework associations of a model.
    RuntimeFramework,
    /// Hardware/vendor resources a model is known to run on.
    Resource,
}

impl TagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagCategory::Library => "library",
            TagCategory::Meta => "meta",
            TagCategory::RuntimeFramework => "runtime_framework",
            TagCategory::Resource => "resource",
        }
    }
}

impl std::str::FromStr for TagCategory {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "library" => Ok(TagCategory::Library),
            "meta" => Ok(TagCategory::Meta),
            "runtime_framework" => Ok(TagCategory::RuntimeFramework),
            "resource" => Ok(TagCategory::Resource),
            _ => Err(()),
        }
    }
}

/// Identity of a repository as named by a push event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoIdentity {
    /// Raw type token from the full name (e.g. `models`).
    pub type_token: String,
    /// Parsed repository type; `None` for unsupported tokens.
    pub repo_type: Option<RepoType>,
    pub namespace: String,
    pub name: String,
}

impl RepoIdentity {
    /// Parse a full repository name of the form `<types>_<namespace>/<name>`.
    pub fn parse(full_name: &str) -> Result<Self> {
        let (full_namespace, name) = full_name.split_once('/').ok_or_else(|| {
            SyncError::InvalidEvent {
                message: format!("repository full name has no '/': {}", full_name),
            }
        })?;
        let (type_token, namespace) = full_namespace
            .split_once(ManifestConfig::TYPE_NAMESPACE_SEPARATOR)
            .ok_or_else(|| SyncError::InvalidEvent {
                message: format!("repository namespace has no type prefix: {}", full_name),
            })?;

        if namespace.is_empty() || name.is_empty() {
            return Err(SyncError::InvalidEvent {
                message: format!("repository full name is incomplete: {}", full_name),
            });
        }

        Ok(Self {
            type_token: type_token.to_string(),
            repo_type: RepoType::from_plural_token(type_token),
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    /// Tag scope of this repository, if it bears tags.
    pub fn scope(&self) -> Option<TagScope> {
        self.repo_type.and_then(TagScope::for_repo_type)
    }

    /// `namespace/name`
    pub fn path(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl fmt::Display for RepoIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}/{}", self.type_token, self.namespace, self.name)
    }
}

/// A repository row as seen by the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub repo_type: RepoType,
    pub namespace: String,
    pub name: String,
    /// Empty when the repository never recorded one.
    pub default_branch: String,
    pub mirror: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Repository {
    /// `namespace/name`
    pub fn path(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Model-name segment used for compatibility and resource lookups.
    pub fn model_name(&self) -> &str {
        &self.name
    }
}

/// A tag catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub scope: TagScope,
    pub category: TagCategory,
    /// Front-matter key for meta tags; empty otherwise.
    pub group: String,
    pub name: String,
}

/// A meta tag declared by a README, before it is resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeclaredTag {
    pub group: String,
    pub name: String,
}

impl DeclaredTag {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }
}

/// A runtime framework a model can be served or fine-tuned with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeFramework {
    pub id: i64,
    pub name: String,
    /// Name of the `runtime_framework` tag representing this framework.
    pub tag_name: String,
    pub framework_type: i32,
}

/// A compatibility-table hit: a framework the model should be associated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkCandidate {
    pub runtime_framework_id: i64,
    pub association_type: i32,
}

/// Stored edge between a model repository and a runtime framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuntimeFrameworkAssociation {
    pub repository_id: i64,
    pub runtime_framework_id: i64,
    pub association_type: i32,
}
