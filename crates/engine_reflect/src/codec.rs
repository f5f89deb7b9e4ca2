//! Type-erased serialisation hooks for component types.
//!
//! Replication and persistence records carry MessagePack payloads
//! (`rmp_serde::to_vec_named`, so field names survive schema drift); prefab
//! files describe components as JSON objects. Replication sends a subset of
//! fields as a name-keyed map that the receiver merges onto its own value.

use std::any::Any;

use serde_json::{Map, Value};

use engine_component::{Component, Reflect};

use crate::error::CodecError;

/// Encode/decode functions for one component type.
#[derive(Debug, Clone, Copy)]
pub struct ComponentCodec {
    encode: fn(&dyn Any) -> Result<Vec<u8>, CodecError>,
    decode: fn(&[u8]) -> Result<Box<dyn Reflect>, CodecError>,
    to_json: fn(&dyn Any) -> Result<serde_json::Value, CodecError>,
    from_json: fn(serde_json::Value) -> Result<Box<dyn Reflect>, CodecError>,
}

impl ComponentCodec {
    /// The codec for component type `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self {
            encode: encode::<T>,
            decode: decode::<T>,
            to_json: to_json::<T>,
            from_json: from_json::<T>,
        }
    }

    /// Encode a value to MessagePack.
    pub fn encode(&self, value: &dyn Any) -> Result<Vec<u8>, CodecError> {
        (self.encode)(value)
    }

    /// Decode a MessagePack payload.
    pub fn decode(&self, bytes: &[u8]) -> Result<Box<dyn Reflect>, CodecError> {
        (self.decode)(bytes)
    }

    /// Convert a value to a JSON object.
    pub fn to_json(&self, value: &dyn Any) -> Result<serde_json::Value, CodecError> {
        (self.to_json)(value)
    }

    /// Build a value from JSON.
    pub fn from_json(&self, json: serde_json::Value) -> Result<Box<dyn Reflect>, CodecError> {
        (self.from_json)(json)
    }

    /// Encode only `fields` of a value, as a MessagePack map keyed by field
    /// name.
    pub fn encode_fields(&self, value: &dyn Any, fields: &[&str]) -> Result<Vec<u8>, CodecError> {
        let mut json = self.to_json(value)?;
        if let Value::Object(map) = &mut json {
            map.retain(|name, _| fields.contains(&name.as_str()));
        }
        Ok(rmp_serde::to_vec_named(&json)?)
    }

    /// Decode a field map written by [`ComponentCodec::encode_fields`] and
    /// merge it onto a copy of `base`. Only names listed in `fields` are
    /// taken from the payload; every other field keeps `base`'s value.
    pub fn merge_fields(
        &self,
        base: &dyn Any,
        bytes: &[u8],
        fields: &[&str],
    ) -> Result<Box<dyn Reflect>, CodecError> {
        let incoming: Map<String, Value> = rmp_serde::from_slice(bytes)?;
        let mut merged = match self.to_json(base)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (name, value) in incoming {
            if fields.contains(&name.as_str()) {
                merged.insert(name, value);
            }
        }
        self.from_json(Value::Object(merged))
    }
}

fn downcast<T: Component>(value: &dyn Any) -> Result<&T, CodecError> {
    value
        .downcast_ref::<T>()
        .ok_or(CodecError::TypeMismatch(T::type_name()))
}

fn encode<T: Component>(value: &dyn Any) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec_named(downcast::<T>(value)?)?)
}

fn decode<T: Component>(bytes: &[u8]) -> Result<Box<dyn Reflect>, CodecError> {
    let value: T = rmp_serde::from_slice(bytes)?;
    Ok(Box::new(value))
}

fn to_json<T: Component>(value: &dyn Any) -> Result<serde_json::Value, CodecError> {
    Ok(serde_json::to_value(downcast::<T>(value)?)?)
}

fn from_json<T: Component>(json: serde_json::Value) -> Result<Box<dyn Reflect>, CodecError> {
    let value: T = serde_json::from_value(json)?;
    Ok(Box::new(value))
}
