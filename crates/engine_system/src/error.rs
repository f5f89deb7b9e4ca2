//! System and environment errors.

use engine_prefab::PrefabError;
use engine_reflect::MetadataError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("a system named `{0}` is already registered")]
    DuplicateSystem(String),

    #[error("no system named `{0}`")]
    UnknownSystem(String),
}

/// Reasons a module environment could not be built. The previously active
/// environment, if any, stays active.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("module `{0}` is listed more than once")]
    DuplicateModule(String),

    #[error("failed to describe module types: {0}")]
    Metadata(#[from] MetadataError),

    #[error("failed to load prefabs: {0}")]
    Prefab(#[from] PrefabError),

    #[error("module `{module}` failed to supply its content")]
    Module {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    System(#[from] SystemError),
}
