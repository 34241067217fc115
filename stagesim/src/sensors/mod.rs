use std::any::Any;

use crate::{
    config::{ConfigError, ConfigLoader},
    math::{Geom, Pose, Size},
    model::{ModelBase, ModelError},
    world::spatial::SpatialQuery,
};

pub mod bumper;

pub use bumper::{BumperArray, SensorSample, TransducerConfig};

/// What a model sees of the world during one tick.
#[derive(Clone, Copy)]
pub struct UpdateContext<'a> {
    pub tick: u64,
    pub spatial: &'a dyn SpatialQuery,
}

/// Variant-specific behaviour layered on top of [`ModelBase`].
///
/// Startup hooks run after the base has started, shutdown hooks before the
/// base tears down.
pub trait Sensorable: Any + Send + std::fmt::Debug {
    fn type_token(&self) -> &'static str;

    fn construct(&mut self, _base: &mut ModelBase) {}

    fn load(&mut self, _base: &mut ModelBase, _config: &dyn ConfigLoader) -> Result<(), ConfigError> {
        Ok(())
    }

    fn startup(&mut self, _base: &mut ModelBase) -> Result<(), ModelError> {
        Ok(())
    }

    fn update(&mut self, _base: &ModelBase, _ctx: &UpdateContext) -> Result<(), ModelError> {
        Ok(())
    }

    fn shutdown(&mut self, _base: &mut ModelBase) -> Result<(), ModelError> {
        Ok(())
    }

    /// Whether `update` touches nothing but this model's own state and may run
    /// alongside other models.
    fn is_thread_safe(&self) -> bool {
        false
    }

    /// One-line dump of the current readings.
    fn describe(&self) -> Option<String> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// A plain body with no sensing of its own, e.g. a robot chassis.
#[derive(Debug, Clone, Copy, Default)]
pub struct Body;

impl Sensorable for Body {
    fn type_token(&self) -> &'static str {
        "model"
    }

    fn construct(&mut self, base: &mut ModelBase) {
        base.set_geom(Geom {
            pose: Pose::ZERO,
            size: Size::default(),
        });
    }

    fn is_thread_safe(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    Model,
    Bumper,
}

impl ModelType {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "model" | "position" => Some(Self::Model),
            "bumper" => Some(Self::Bumper),
            _ => None,
        }
    }

    pub fn construct(self) -> Box<dyn Sensorable> {
        match self {
            Self::Model => Box::new(Body),
            Self::Bumper => Box::new(BumperArray::default()),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::sensors::ModelType;

    #[test]
    fn test_model_types() {
        assert_eq!(ModelType::from_token("bumper"), Some(ModelType::Bumper));
        assert_eq!(ModelType::from_token("position"), Some(ModelType::Model));
        assert_eq!(ModelType::from_token("laser"), None);

        assert_eq!(ModelType::Bumper.construct().type_token(), "bumper");
        assert!(ModelType::Model.construct().is_thread_safe());
    }
}
