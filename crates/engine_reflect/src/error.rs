//! Error types for copy strategies, codecs, and metadata builds.

use thiserror::Error;

/// Errors produced while copying a value.
#[derive(Debug, Error)]
pub enum CopyError {
    /// No strategy is registered and the type is not a known aggregate.
    #[error("no copy strategy for type `{0}`")]
    NoStrategy(&'static str),

    /// A strategy was handed a value of a different type.
    #[error("copy strategy for `{expected}` applied to a value of another type")]
    TypeMismatch {
        /// The type the strategy copies.
        expected: &'static str,
    },

    /// A declared field could not be read from the source or written to the copy.
    #[error("field `{field}` of `{type_name}` is not accessible")]
    Field {
        /// The aggregate being copied.
        type_name: &'static str,
        /// The offending field.
        field: &'static str,
    },

    /// An aggregate contains itself through its declared fields.
    #[error("aggregate `{0}` contains itself")]
    Recursive(&'static str),
}

/// Errors produced while encoding or decoding component values.
#[derive(Debug, Error)]
pub enum CodecError {
    /// MessagePack encoding failed.
    #[error("failed to encode component: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding failed.
    #[error("failed to decode component: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// JSON conversion failed.
    #[error("invalid component JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The value handed to the codec is not of the codec's type.
    #[error("value is not a `{0}`")]
    TypeMismatch(&'static str),
}

/// Errors that abort a type library build.
///
/// All of these are configuration-fatal: the module environment that
/// produced them cannot be activated.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// A type URI is not of the form `module:TypeName`.
    #[error("invalid type uri `{0}` (expected `module:TypeName`)")]
    InvalidUri(String),

    /// Two registrations share a URI.
    #[error("duplicate type: {0}")]
    DuplicateType(String),

    /// Two distinct URIs hash to the same id.
    #[error("type id collision between `{0}` and `{1}`")]
    IdCollision(String, String),

    /// A field's value type has no resolvable copy strategy.
    #[error("field `{field}` of `{type_uri}` has type `{value_type}` with no copy strategy")]
    NoCopyStrategy {
        /// The type being described.
        type_uri: String,
        /// The offending field.
        field: &'static str,
        /// The field's value type.
        value_type: &'static str,
        /// The underlying resolution failure.
        #[source]
        source: CopyError,
    },

    /// A field marked as an owning reference cannot hold entity handles.
    #[error("field `{field}` of `{type_uri}` is marked owned but has type `{value_type}`")]
    InvalidOwningReference {
        /// The type being described.
        type_uri: String,
        /// The offending field.
        field: &'static str,
        /// The field's value type.
        value_type: &'static str,
    },

    /// A name does not resolve to any registered type.
    #[error("unknown type referenced: {0}")]
    UnknownType(String),

    /// A short name matches several registered types.
    #[error("type name `{name}` is ambiguous between {}", .candidates.join(", "))]
    AmbiguousName {
        /// The name as written.
        name: String,
        /// Every URI it could refer to.
        candidates: Vec<String>,
    },
}
