use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::{
    config::{ConfigKey, ConfigLoader},
    math::{Geom, Pose, Size},
    model::{LifecycleState, ModelError, ModelId, UpdateCallbacks, options::ModelOption},
};

/// Shared handle on the world's update counter.
#[derive(Debug, Clone, Default)]
pub struct WorldTicks(Arc<AtomicU64>);

impl WorldTicks {
    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PowerDraw {
    /// No power accounting: the model is not running.
    #[default]
    Unset,
    Watts(f32),
}

/// State every simulated body carries regardless of what it senses.
#[derive(Debug)]
pub struct ModelBase {
    pub(crate) id: ModelId,
    pub(crate) name: String,
    pub(crate) parent: Option<ModelId>,
    pub pose: Pose,
    pub geom: Geom,
    pub obstacle_return: bool,
    pub(crate) state: LifecycleState,
    pub(crate) power: PowerDraw,
    pub(crate) ticks: WorldTicks,
    pub(crate) last_update: Option<u64>,
    pub(crate) options: Vec<&'static ModelOption>,
    pub(crate) callbacks: UpdateCallbacks,
}

impl ModelBase {
    pub fn new(id: ModelId, name: String, parent: Option<ModelId>, ticks: WorldTicks) -> Self {
        Self {
            id,
            name,
            parent,
            pose: Pose::ZERO,
            geom: Geom::default(),
            obstacle_return: true,
            state: LifecycleState::Constructed,
            power: PowerDraw::Unset,
            ticks,
            last_update: None,
            options: Vec::new(),
            callbacks: UpdateCallbacks::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> ModelId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn parent(&self) -> Option<ModelId> {
        self.parent
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[inline]
    pub fn power(&self) -> PowerDraw {
        self.power
    }

    /// Number of world ticks completed so far.
    #[inline]
    pub fn update_count(&self) -> u64 {
        self.ticks.get()
    }

    #[inline]
    pub fn last_update(&self) -> Option<u64> {
        self.last_update
    }

    #[inline]
    pub fn options(&self) -> &[&'static ModelOption] {
        &self.options
    }

    pub fn set_geom(&mut self, geom: Geom) {
        self.geom = geom;
    }

    /// Set the power this model draws. Only meaningful while running.
    pub fn set_watts(&mut self, watts: f32) -> Result<(), ModelError> {
        if self.state != LifecycleState::Running {
            return Err(ModelError::Lifecycle {
                operation: "set power draw on",
                state: self.state,
            });
        }

        self.power = PowerDraw::Watts(watts);
        Ok(())
    }

    pub fn register_option(&mut self, option: &'static ModelOption) {
        super::options::register_option(option);

        if !self.options.iter().any(|o| std::ptr::eq(*o, option)) {
            self.options.push(option);
        }
    }

    pub(crate) fn load(&mut self, config: &dyn ConfigLoader) {
        let pose = ConfigKey::new("pose");
        if config.has_field(pose) {
            self.pose = Pose {
                x: config.read_tuple_length(pose, 0, self.pose.x),
                y: config.read_tuple_length(pose, 1, self.pose.y),
                z: config.read_tuple_length(pose, 2, self.pose.z),
                a: config.read_tuple_angle(pose, 3, self.pose.a),
            };
        }

        let size = ConfigKey::new("size");
        if config.has_field(size) {
            let current = self.geom.size;
            self.geom.size = Size {
                x: config.read_tuple_length(size, 0, current.x).max(0.),
                y: config.read_tuple_length(size, 1, current.y).max(0.),
                z: config.read_tuple_length(size, 2, current.z).max(0.),
            };
        }

        self.obstacle_return =
            config.read_bool(ConfigKey::new("obstacle_return"), self.obstacle_return);
    }

    pub(crate) fn startup(&mut self) {
        log::debug!("Starting up {} ({:?})", self.name, self.id);
        self.state = LifecycleState::Running;
        self.power = PowerDraw::Watts(0.);
    }

    pub(crate) fn update(&mut self, tick: u64) {
        self.last_update = Some(tick);
    }

    pub(crate) fn shutdown(&mut self) {
        log::debug!("Shutting down {} ({:?})", self.name, self.id);
        self.power = PowerDraw::Unset;
        self.state = LifecycleState::Stopped;
    }
}
