//! # engine_reflect
//!
//! Makes component and event types inspectable and copyable.
//!
//! - [`CopyStrategyLibrary`]: how to produce an independent copy of a value,
//!   by explicit registration or synthesized field by field.
//! - [`TypeLibrary`]: per-environment metadata for every component and
//!   event type: fields, markers, copy strategies and codec hooks.
//! - [`ComponentCodec`]: MessagePack and JSON conversion for components.

pub mod codec;
pub mod copy;
pub mod error;
pub mod metadata;

pub use codec::ComponentCodec;
pub use copy::{CloneStrategy, CopyStrategy, CopyStrategyLibrary, FnStrategy};
pub use error::{CodecError, CopyError, MetadataError};
pub use metadata::{FieldDescriptor, TypeDescriptor, TypeKind, TypeLibrary, TypeLibraryBuilder};
