//! JSON prefab source files.
//!
//! A file holds one prefab object or an array of them:
//!
//! ```json
//! {
//!   "name": "core:goblin",
//!   "parent": "core:creature",
//!   "components": { "Health": { "max": 40.0 } },
//!   "children": ["core:dagger"]
//! }
//! ```
//!
//! Component keys are URIs or bare type names, resolved against the type
//! library. A component object may list a subset of the fields: the listed
//! ones are merged onto the component's blank value, and only they override
//! an inherited value when the prefab has a parent.

use serde::Deserialize;
use serde_json::{Map, Value};

use engine_reflect::TypeLibrary;

use crate::error::PrefabError;
use crate::prefab::{ComponentPrototype, Prefab};

/// The on-disk shape of one prefab.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrefabDefinition {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub components: Map<String, Value>,
    #[serde(default)]
    pub children: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PrefabFile {
    Many(Vec<PrefabDefinition>),
    One(PrefabDefinition),
}

/// Parse a prefab file into its definitions.
pub fn parse_definitions(json: &str) -> Result<Vec<PrefabDefinition>, PrefabError> {
    Ok(match serde_json::from_str(json)? {
        PrefabFile::Many(definitions) => definitions,
        PrefabFile::One(definition) => vec![definition],
    })
}

/// Parse a prefab file and turn every definition into a [`Prefab`].
pub fn load_prefabs(json: &str, library: &TypeLibrary) -> Result<Vec<Prefab>, PrefabError> {
    parse_definitions(json)?
        .into_iter()
        .map(|definition| definition.into_prefab(library))
        .collect()
}

impl PrefabDefinition {
    /// Resolve component names and decode component values.
    pub fn into_prefab(self, library: &TypeLibrary) -> Result<Prefab, PrefabError> {
        let mut prefab = Prefab::new(self.name.clone());
        if let Some(parent) = self.parent {
            prefab = prefab.with_parent(parent);
        }

        for (key, value) in self.components {
            let descriptor = library.resolve_component(&key)?;
            let Value::Object(overrides) = value else {
                return Err(PrefabError::InvalidDefinition {
                    prefab: self.name,
                    reason: format!("component `{key}` must be a JSON object"),
                });
            };
            let codec = descriptor
                .codec()
                .ok_or_else(|| PrefabError::UnknownComponent {
                    prefab: self.name.clone(),
                    component: key.clone(),
                })?;

            let blank = descriptor.blank();
            let mut merged = match codec.to_json(blank.as_any())? {
                Value::Object(fields) => fields,
                _ => Map::new(),
            };
            let mut fields = Vec::with_capacity(overrides.len());
            for (field, field_value) in overrides {
                let info = descriptor.field(&field).ok_or_else(|| PrefabError::UnknownField {
                    prefab: self.name.clone(),
                    component: descriptor.uri().to_string(),
                    field: field.clone(),
                })?;
                fields.push(info.name());
                merged.insert(field, field_value);
            }

            let value = codec.from_json(Value::Object(merged))?;
            prefab = prefab.with_prototype(ComponentPrototype::partial(
                descriptor.component_type_id(),
                value,
                fields,
            ));
        }

        for child in self.children {
            prefab = prefab.with_child(child);
        }
        Ok(prefab)
    }
}
