//! Prefab errors.

use engine_reflect::{CodecError, CopyError, MetadataError};
use thiserror::Error;

/// Errors raised while building, resolving or flattening prefabs.
#[derive(Debug, Error)]
pub enum PrefabError {
    #[error("unknown prefab: {0}")]
    UnknownPrefab(String),

    #[error("prefab `{0}` is defined more than once")]
    DuplicatePrefab(String),

    #[error("prefab `{prefab}` inherits from unknown prefab `{parent}`")]
    UnknownParent { prefab: String, parent: String },

    #[error("prefab `{prefab}` declares unknown child prefab `{child}`")]
    UnknownChild { prefab: String, child: String },

    /// A prefab reaches itself through parents or children.
    #[error("prefab `{0}` is part of a cycle")]
    Cycle(String),

    #[error("prefab `{prefab}` uses unregistered component `{component}`")]
    UnknownComponent { prefab: String, component: String },

    #[error("prefab `{prefab}` sets unknown field `{field}` on `{component}`")]
    UnknownField {
        prefab: String,
        component: String,
        field: String,
    },

    #[error("prefab `{prefab}`: {reason}")]
    InvalidDefinition { prefab: String, reason: String },

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Copy(#[from] CopyError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("malformed prefab file: {0}")]
    Json(#[from] serde_json::Error),
}
