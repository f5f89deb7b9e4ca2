use engine_component::Entity;
use engine_prefab::PrefabError;
use engine_reflect::{CodecError, CopyError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldError {
    /// The handle is null, stale, or was never allocated.
    #[error("entity {0} does not exist")]
    EntityNotFound(Entity),

    #[error("entity {entity} has no `{component}` component")]
    MissingComponent { entity: Entity, component: String },

    #[error("component type `{0}` is not registered in this environment")]
    UnregisteredComponent(String),

    #[error("event type `{0}` is not registered in this environment")]
    UnregisteredEvent(String),

    #[error(transparent)]
    Prefab(#[from] PrefabError),

    #[error("failed to copy component: {0}")]
    Copy(#[from] CopyError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
