use std::collections::BTreeMap;

use serde_norway::Value;

use crate::config::{ConfigKey, ConfigLoader};

/// A YAML world description: a forest of entities.
///
/// ```yaml
/// models:
///   - name: robot
///     type: model
///     pose: [0, 0, 0, 0]
///     size: [0.5, 0.5, 0.2]
///     children:
///       - type: bumper
///         bcount: 2
///         blength: 0.1
///         bpose[0]: [0.25, 0.1, 0, 0]
///         bpose[1]: [0.25, -0.1, 0, 0]
///         blength[1]: 0.2
/// ```
#[derive(serde::Deserialize, Debug, Clone, Default)]
pub struct WorldFile {
    #[serde(default)]
    pub models: Vec<EntityDef>,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct EntityDef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default = "default_type")]
    pub kind: String,
    #[serde(default)]
    pub children: Vec<EntityDef>,
    #[serde(flatten)]
    pub properties: BTreeMap<String, Value>,
}

fn default_type() -> String {
    "model".into()
}

#[derive(Debug, thiserror::Error)]
pub enum WorldFileError {
    #[error("IOError: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Deserialize: {0}")]
    DeserializeError(#[from] serde_norway::Error),
}

impl WorldFile {
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, WorldFileError> {
        log::info!("Loading world file {path:?}", path = path.as_ref());
        let file = std::fs::File::open(path)?;

        Ok(serde_norway::from_reader(file)?)
    }

    pub fn parse(source: &str) -> Result<Self, WorldFileError> {
        Ok(serde_norway::from_str(source)?)
    }
}

impl EntityDef {
    pub fn config(&self) -> EntityConfig<'_> {
        EntityConfig {
            properties: &self.properties,
        }
    }
}

/// [`ConfigLoader`] over the free-form properties of one [`EntityDef`].
///
/// Angles are stored in degrees.
#[derive(Debug, Clone, Copy)]
pub struct EntityConfig<'a> {
    properties: &'a BTreeMap<String, Value>,
}

impl<'a> EntityConfig<'a> {
    pub fn new(properties: &'a BTreeMap<String, Value>) -> Self {
        Self { properties }
    }

    fn get(&self, key: ConfigKey) -> Option<&'a Value> {
        self.properties.get(&key.to_string())
    }

    fn get_tuple_element(&self, key: ConfigKey, index: usize) -> Option<f32> {
        match self.get(key)? {
            Value::Sequence(items) => finite(items.get(index)?),
            _ => None,
        }
    }
}

fn finite(value: &Value) -> Option<f32> {
    value
        .as_f64()
        .map(|v| v as f32)
        .filter(|v| v.is_finite())
}

impl ConfigLoader for EntityConfig<'_> {
    fn has_field(&self, key: ConfigKey) -> bool {
        self.get(key).is_some()
    }

    fn read_int(&self, key: ConfigKey, default: i64) -> i64 {
        self.get(key).and_then(Value::as_i64).unwrap_or(default)
    }

    fn read_length(&self, key: ConfigKey, default: f32) -> f32 {
        self.get(key).and_then(finite).unwrap_or(default)
    }

    fn read_tuple_length(&self, key: ConfigKey, index: usize, default: f32) -> f32 {
        self.get_tuple_element(key, index).unwrap_or(default)
    }

    fn read_tuple_angle(&self, key: ConfigKey, index: usize, default: f32) -> f32 {
        self.get_tuple_element(key, index)
            .map(f32::to_radians)
            .unwrap_or(default)
    }

    fn read_bool(&self, key: ConfigKey, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }
}
