//! Typed reads of declarative model properties.
//!
//! Properties are addressed by a [`ConfigKey`], a textual name with an
//! optional slot index (`bpose[2]`). Missing or malformed values fall back to
//! the caller's default, so partially configured entities still load.

pub mod worldfile;

pub use worldfile::{EntityConfig, EntityDef, WorldFile, WorldFileError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConfigKey<'a> {
    pub name: &'a str,
    pub index: Option<usize>,
}

impl<'a> ConfigKey<'a> {
    #[inline]
    pub const fn new(name: &'a str) -> Self {
        Self { name, index: None }
    }

    #[inline]
    pub const fn indexed(name: &'a str, index: usize) -> Self {
        Self {
            name,
            index: Some(index),
        }
    }
}

impl std::fmt::Display for ConfigKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}[{index}]", self.name),
            None => f.write_str(self.name),
        }
    }
}

/// Source of model configuration, keyed per entity.
///
/// Lengths are in meters. Angles are returned in radians regardless of how
/// the source stores them.
pub trait ConfigLoader {
    fn has_field(&self, key: ConfigKey) -> bool;

    fn read_int(&self, key: ConfigKey, default: i64) -> i64;

    fn read_length(&self, key: ConfigKey, default: f32) -> f32;

    fn read_tuple_length(&self, key: ConfigKey, index: usize, default: f32) -> f32;

    fn read_tuple_angle(&self, key: ConfigKey, index: usize, default: f32) -> f32;

    fn read_bool(&self, key: ConfigKey, default: bool) -> bool;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing Field: `{0}`")]
    MissingField(String),
    #[error("Invalid Value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },
}
