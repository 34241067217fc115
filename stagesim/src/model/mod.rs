use std::any::Any;

use crate::{
    config::{ConfigError, ConfigLoader},
    sensors::{Sensorable, UpdateContext},
    world::spatial::QueryUnavailable,
};

pub mod base;
pub mod callbacks;
pub mod options;

pub use base::{ModelBase, PowerDraw, WorldTicks};
pub use callbacks::{CallbackFn, CallbackId, CallbackStatus, UpdateCallbacks, UserData};
pub use options::ModelOption;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModelId(pub(crate) u64);

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Constructed,
    Loaded,
    Running,
    Stopped,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Lifecycle Error: cannot {operation} a model that is {state:?}")]
    Lifecycle {
        operation: &'static str,
        state: LifecycleState,
    },
    #[error(transparent)]
    QueryUnavailable(#[from] QueryUnavailable),
}

/// A simulated body: shared lifecycle bookkeeping plus the variant-specific
/// behaviour behind [`Sensorable`].
#[derive(Debug)]
pub struct Model {
    base: ModelBase,
    sensor: Box<dyn Sensorable>,
}

/// Read-only access handed to update callbacks and renderers.
#[derive(Debug, Clone, Copy)]
pub struct ModelView<'a> {
    base: &'a ModelBase,
    sensor: &'a dyn Sensorable,
}

impl<'a> ModelView<'a> {
    #[inline]
    pub fn base(&self) -> &'a ModelBase {
        self.base
    }

    #[inline]
    pub fn id(&self) -> ModelId {
        self.base.id
    }

    #[inline]
    pub fn name(&self) -> &'a str {
        &self.base.name
    }

    #[inline]
    pub fn update_count(&self) -> u64 {
        self.base.update_count()
    }

    pub fn sensor<T: Sensorable>(&self) -> Option<&'a T> {
        let sensor: &'a dyn Any = self.sensor.as_any();
        sensor.downcast_ref()
    }
}

impl Model {
    /// Construct a model around `sensor`, letting it install its defaults.
    pub fn new(mut base: ModelBase, mut sensor: Box<dyn Sensorable>) -> Self {
        log::debug!(
            "Constructing {} {} ({})",
            sensor.type_token(),
            base.id,
            base.name
        );
        sensor.construct(&mut base);

        Self { base, sensor }
    }

    #[inline]
    pub fn base(&self) -> &ModelBase {
        &self.base
    }

    #[inline]
    pub fn base_mut(&mut self) -> &mut ModelBase {
        &mut self.base
    }

    #[inline]
    pub fn id(&self) -> ModelId {
        self.base.id
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        self.base.state
    }

    #[inline]
    pub fn type_token(&self) -> &'static str {
        self.sensor.type_token()
    }

    #[inline]
    pub fn is_thread_safe(&self) -> bool {
        self.sensor.is_thread_safe()
    }

    pub fn view(&self) -> ModelView<'_> {
        ModelView {
            base: &self.base,
            sensor: &*self.sensor,
        }
    }

    pub fn sensor<T: Sensorable>(&self) -> Option<&T> {
        self.sensor.as_any().downcast_ref()
    }

    /// Attach controller logic that runs after this model's own update every tick.
    pub fn add_update_callback<F>(&mut self, func: F, user_data: impl Any + Send) -> CallbackId
    where
        F: FnMut(ModelView<'_>, &mut (dyn Any + Send)) -> CallbackStatus + Send + 'static,
    {
        self.base.callbacks.add(func, user_data)
    }

    pub fn remove_update_callback(&mut self, id: CallbackId) -> bool {
        self.base.callbacks.remove(id)
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[LifecycleState],
    ) -> Result<(), ModelError> {
        if allowed.contains(&self.base.state) {
            Ok(())
        } else {
            Err(ModelError::Lifecycle {
                operation,
                state: self.base.state,
            })
        }
    }

    /// Read configuration. Allowed until the model starts; reloading a running
    /// model is rejected.
    pub fn load(&mut self, config: &dyn ConfigLoader) -> Result<(), ModelError> {
        self.expect_state(
            "load",
            &[LifecycleState::Constructed, LifecycleState::Loaded],
        )?;

        self.sensor.load(&mut self.base, config)?;
        self.base.load(config);
        self.base.state = LifecycleState::Loaded;

        Ok(())
    }

    pub fn startup(&mut self) -> Result<(), ModelError> {
        self.expect_state(
            "start",
            &[LifecycleState::Constructed, LifecycleState::Loaded],
        )?;

        self.base.startup();
        self.sensor.startup(&mut self.base)
    }

    /// One world tick: base bookkeeping, the variant's own logic, then every
    /// registered callback in order.
    pub fn update(&mut self, ctx: &UpdateContext) -> Result<(), ModelError> {
        self.expect_state("update", &[LifecycleState::Running])?;

        self.base.update(ctx.tick);
        self.sensor.update(&self.base, ctx)?;

        let mut callbacks = std::mem::take(&mut self.base.callbacks);
        callbacks.run(self.view());
        self.base.callbacks = callbacks;

        Ok(())
    }

    pub fn shutdown(&mut self) -> Result<(), ModelError> {
        self.expect_state("shut down", &[LifecycleState::Running])?;

        let result = self.sensor.shutdown(&mut self.base);
        self.base.shutdown();

        result
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self { base, sensor } = self;
        let pose = base.pose;

        write!(
            f,
            "Model {} {} ({}) [{:?}] pose [{:.3} {:.3} {:.3} {:.3}]",
            base.name,
            base.id,
            sensor.type_token(),
            base.state,
            pose.x,
            pose.y,
            pose.z,
            pose.a.to_degrees()
        )?;

        if let Some(description) = sensor.describe() {
            write!(f, "\n\t{description}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{any::Any, sync::Arc};

    use parking_lot::Mutex;

    use crate::{
        config::{ConfigError, ConfigLoader, EntityDef},
        math::Pose,
        model::{
            CallbackStatus, LifecycleState, Model, ModelBase, ModelError, ModelId, ModelView,
            PowerDraw, WorldTicks,
        },
        sensors::{Sensorable, UpdateContext},
        world::spatial::SpatialIndex,
    };

    /// Records the base state each hook observes.
    #[derive(Debug, Default)]
    struct Probe {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Sensorable for Probe {
        fn type_token(&self) -> &'static str {
            "probe"
        }

        fn load(
            &mut self,
            _base: &mut ModelBase,
            config: &dyn ConfigLoader,
        ) -> Result<(), ConfigError> {
            if config.read_bool(crate::config::ConfigKey::new("fail"), false) {
                return Err(ConfigError::MissingField("fail".into()));
            }
            self.log.lock().push("load".into());
            Ok(())
        }

        fn startup(&mut self, base: &mut ModelBase) -> Result<(), ModelError> {
            self.log
                .lock()
                .push(format!("startup {:?} {:?}", base.state(), base.power()));
            base.set_watts(2.)
        }

        fn update(&mut self, _base: &ModelBase, ctx: &UpdateContext) -> Result<(), ModelError> {
            self.log.lock().push(format!("update {}", ctx.tick));
            Ok(())
        }

        fn shutdown(&mut self, base: &mut ModelBase) -> Result<(), ModelError> {
            self.log
                .lock()
                .push(format!("shutdown {:?} {:?}", base.state(), base.power()));
            base.set_watts(0.)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn probe_model() -> (Model, Arc<Mutex<Vec<String>>>) {
        let probe = Probe::default();
        let log = Arc::clone(&probe.log);
        let base = ModelBase::new(ModelId(1), "probe".into(), None, WorldTicks::default());

        (Model::new(base, Box::new(probe)), log)
    }

    fn index_for(model: &Model) -> SpatialIndex {
        let mut index = SpatialIndex::default();
        index.insert(model.base(), Pose::ZERO);
        index
    }

    fn entity(source: &str) -> EntityDef {
        serde_norway::from_str(source).unwrap()
    }

    #[test]
    fn test_lifecycle_ordering() {
        let (mut model, log) = probe_model();
        let index = index_for(&model);

        model.load(&entity("type: probe").config()).unwrap();
        assert_eq!(model.state(), LifecycleState::Loaded);

        model.startup().unwrap();
        assert_eq!(model.base().power(), PowerDraw::Watts(2.));

        model
            .update(&UpdateContext {
                tick: 1,
                spatial: &index,
            })
            .unwrap();

        model.shutdown().unwrap();
        assert_eq!(model.state(), LifecycleState::Stopped);
        assert_eq!(model.base().power(), PowerDraw::Unset);

        assert_eq!(
            *log.lock(),
            vec![
                "load".to_string(),
                "startup Running Watts(0.0)".to_string(),
                "update 1".to_string(),
                "shutdown Running Watts(2.0)".to_string(),
            ]
        );
    }

    #[test]
    fn test_disallowed_transitions() {
        let (mut model, _) = probe_model();
        let index = index_for(&model);
        let ctx = UpdateContext {
            tick: 1,
            spatial: &index,
        };

        assert_eq!(
            model.update(&ctx),
            Err(ModelError::Lifecycle {
                operation: "update",
                state: LifecycleState::Constructed
            })
        );
        assert!(model.shutdown().is_err());

        model.startup().unwrap();
        assert!(matches!(
            model.load(&entity("type: probe").config()),
            Err(ModelError::Lifecycle { .. })
        ));
        assert!(model.startup().is_err());

        model.shutdown().unwrap();
        assert!(model.startup().is_err());
        assert!(model.update(&ctx).is_err());
    }

    #[test]
    fn test_failed_load_keeps_state() {
        let (mut model, _) = probe_model();

        let result = model.load(&entity("fail: true").config());
        assert!(matches!(result, Err(ModelError::Config(_))));
        assert_eq!(model.state(), LifecycleState::Constructed);
    }

    #[test]
    fn test_base_properties() {
        let (mut model, _) = probe_model();

        model
            .load(&entity("pose: [1, 2, 0.5, 180]\nsize: [0.4, 0.2]\nobstacle_return: false").config())
            .unwrap();

        let base = model.base();
        assert_eq!(base.pose.x, 1.);
        assert_eq!(base.pose.y, 2.);
        assert_eq!(base.pose.z, 0.5);
        assert!((base.pose.a - std::f32::consts::PI).abs() < 1e-6);
        assert_eq!(base.geom.size.x, 0.4);
        assert_eq!(base.geom.size.y, 0.2);
        assert_eq!(base.geom.size.z, 1.);
        assert!(!base.obstacle_return);
    }

    #[test]
    fn test_callbacks_run_in_order() {
        let (mut model, log) = probe_model();
        let index = index_for(&model);

        let first = Arc::clone(&log);
        model.add_update_callback(
            move |view: ModelView<'_>, data: &mut (dyn Any + Send)| {
                let calls = data.downcast_mut::<u32>().unwrap();
                *calls += 1;
                first.lock().push(format!("first {} {calls}", view.name()));

                if *calls == 2 {
                    CallbackStatus::Remove
                } else {
                    CallbackStatus::Continue
                }
            },
            0u32,
        );

        let second = Arc::clone(&log);
        let id = model.add_update_callback(
            move |view: ModelView<'_>, _: &mut (dyn Any + Send)| {
                assert!(view.sensor::<Probe>().is_some());
                second.lock().push("second".into());
                CallbackStatus::Continue
            },
            (),
        );

        model.startup().unwrap();
        for tick in 1..=3 {
            model
                .update(&UpdateContext {
                    tick,
                    spatial: &index,
                })
                .unwrap();
        }

        assert_eq!(model.base().callbacks.len(), 1);
        assert!(model.remove_update_callback(id));
        assert!(!model.remove_update_callback(id));

        let log = log.lock();
        let updates: Vec<_> = log
            .iter()
            .filter(|l| l.starts_with("first") || l.starts_with("second"))
            .cloned()
            .collect();

        assert_eq!(
            updates,
            vec![
                "first probe 1",
                "second",
                "first probe 2",
                "second",
                "second",
            ]
        );
    }
}
