pub mod config;
pub mod math;
pub mod model;
pub mod sensors;
pub mod world;

pub use config::{ConfigLoader, WorldFile};
pub use model::{Model, ModelId, ModelView};
pub use sensors::{BumperArray, ModelType, Sensorable};
pub use world::World;
