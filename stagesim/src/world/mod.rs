use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    config::{EntityDef, WorldFile, WorldFileError},
    math::Pose,
    model::{LifecycleState, Model, ModelBase, ModelError, ModelId, WorldTicks},
    sensors::{ModelType, Sensorable, UpdateContext},
    world::spatial::SpatialIndex,
};

pub mod spatial;

#[derive(thiserror::Error, Debug)]
pub enum WorldError {
    #[error("Unknown Model: {0}")]
    UnknownModel(ModelId),
    #[error("Unknown Model Type `{0}`")]
    UnknownModelType(String),
    #[error("Model `{name}`: {source}")]
    Model {
        name: String,
        #[source]
        source: ModelError,
    },
    #[error(transparent)]
    WorldFile(#[from] WorldFileError),
}

/// A tree of models advanced in lock-step ticks.
///
/// Before each tick the world snapshots every body's global footprint into a
/// [`SpatialIndex`]; models then update against that snapshot, thread-safe
/// ones in parallel and the rest one at a time. All updates of a tick finish
/// before the next one starts.
#[derive(Debug, Default)]
pub struct World {
    models: FxHashMap<ModelId, Model>,
    /// Insertion order; parents always precede their children.
    order: Vec<ModelId>,
    ticks: WorldTicks,
    next_id: u64,
    halted: FxHashSet<ModelId>,
    index: Arc<SpatialIndex>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn update_count(&self) -> u64 {
        self.ticks.get()
    }

    #[inline]
    pub fn ticks(&self) -> &WorldTicks {
        &self.ticks
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn model(&self, id: ModelId) -> Option<&Model> {
        self.models.get(&id)
    }

    pub fn model_mut(&mut self, id: ModelId) -> Option<&mut Model> {
        self.models.get_mut(&id)
    }

    pub fn find(&self, name: &str) -> Option<&Model> {
        self.models().find(|m| m.base().name() == name)
    }

    /// Models in insertion order.
    pub fn models(&self) -> impl Iterator<Item = &Model> + '_ {
        self.order.iter().filter_map(|id| self.models.get(id))
    }

    pub fn children(&self, parent: ModelId) -> impl Iterator<Item = ModelId> + '_ {
        self.models()
            .filter(move |m| m.base().parent() == Some(parent))
            .map(Model::id)
    }

    #[inline]
    pub fn is_halted(&self, id: ModelId) -> bool {
        self.halted.contains(&id)
    }

    /// Spatial snapshot the last tick ran against.
    pub fn spatial_index(&self) -> Arc<SpatialIndex> {
        Arc::clone(&self.index)
    }

    pub fn add_model(
        &mut self,
        parent: Option<ModelId>,
        name: Option<&str>,
        sensor: Box<dyn Sensorable>,
    ) -> Result<ModelId, WorldError> {
        if let Some(parent) = parent
            && !self.models.contains_key(&parent)
        {
            return Err(WorldError::UnknownModel(parent));
        }

        let id = ModelId(self.next_id);
        self.next_id += 1;

        let name = match name {
            Some(name) => name.to_string(),
            None => format!("{}:{}", sensor.type_token(), id.0),
        };

        let base = ModelBase::new(id, name, parent, self.ticks.clone());
        self.models.insert(id, Model::new(base, sensor));
        self.order.push(id);

        Ok(id)
    }

    pub fn add_model_type(
        &mut self,
        parent: Option<ModelId>,
        name: Option<&str>,
        model_type: ModelType,
    ) -> Result<ModelId, WorldError> {
        self.add_model(parent, name, model_type.construct())
    }

    /// Remove `id` and its descendants, shutting down any that are running.
    pub fn remove_model(&mut self, id: ModelId) -> Vec<Model> {
        let mut doomed = vec![id];
        let mut i = 0;
        while let Some(&current) = doomed.get(i) {
            doomed.extend(self.children(current));
            i += 1;
        }

        let doomed_set: FxHashSet<_> = doomed.iter().copied().collect();
        self.order.retain(|id| !doomed_set.contains(id));

        doomed
            .into_iter()
            .rev()
            .filter_map(|id| {
                self.halted.remove(&id);
                let mut model = self.models.remove(&id)?;

                if model.state() == LifecycleState::Running
                    && let Err(e) = model.shutdown()
                {
                    log::warn!("Shutting down removed model {id}: {e}");
                }

                Some(model)
            })
            .collect()
    }

    /// Build every entity of `file`. An entity that fails to load is dropped
    /// together with its children; its siblings are unaffected.
    pub fn load_file(&mut self, file: &WorldFile) -> Vec<WorldError> {
        let mut failures = Vec::new();

        for entity in &file.models {
            self.load_entity(None, entity, &mut failures);
        }

        failures
    }

    fn load_entity(
        &mut self,
        parent: Option<ModelId>,
        entity: &EntityDef,
        failures: &mut Vec<WorldError>,
    ) {
        let Some(model_type) = ModelType::from_token(&entity.kind) else {
            log::error!("Skipping entity of unknown type `{}`", entity.kind);
            failures.push(WorldError::UnknownModelType(entity.kind.clone()));
            return;
        };

        let id = match self.add_model_type(parent, entity.name.as_deref(), model_type) {
            Ok(id) => id,
            Err(e) => {
                failures.push(e);
                return;
            }
        };

        let result = self
            .models
            .get_mut(&id)
            .map(|model| model.load(&entity.config()));

        if let Some(Err(source)) = result {
            let name = self
                .models
                .get(&id)
                .map(|m| m.base().name().to_string())
                .unwrap_or_default();
            log::error!("Model `{name}` failed to load: {source}");
            self.remove_model(id);
            failures.push(WorldError::Model { name, source });
            return;
        }

        for child in &entity.children {
            self.load_entity(Some(id), child, failures);
        }
    }

    /// Start every model that is not yet running, parents first.
    pub fn startup(&mut self) -> Result<(), WorldError> {
        for id in &self.order {
            let Some(model) = self.models.get_mut(id) else {
                continue;
            };

            if matches!(
                model.state(),
                LifecycleState::Constructed | LifecycleState::Loaded
            ) {
                model.startup().map_err(|source| WorldError::Model {
                    name: model.base().name().to_string(),
                    source,
                })?;
            }
        }

        self.index = Arc::new(self.build_index());

        Ok(())
    }

    /// Stop every running model, children first.
    pub fn shutdown(&mut self) {
        for id in self.order.iter().rev() {
            if let Some(model) = self.models.get_mut(id)
                && model.state() == LifecycleState::Running
                && let Err(e) = model.shutdown()
            {
                log::warn!("Shutting down {id}: {e}");
            }
        }
    }

    fn build_index(&self) -> SpatialIndex {
        let mut index = SpatialIndex::default();
        let mut globals: FxHashMap<ModelId, Pose> = FxHashMap::default();

        for model in self.models() {
            let base = model.base();
            let global = match base.parent().and_then(|p| globals.get(&p)) {
                Some(parent) => parent.compose(&base.pose),
                None => base.pose,
            };

            globals.insert(base.id(), global);
            index.insert(base, global);
        }

        index
    }

    /// Advance one tick. Returns the new update count.
    pub fn update(&mut self) -> u64 {
        puffin::profile_function!();

        let index = Arc::new(self.build_index());
        let tick = self.ticks.advance();
        let faults = Mutex::new(Vec::new());

        let Self {
            models,
            order,
            halted,
            ..
        } = self;

        let schedulable = |id: &ModelId, model: &Model| {
            model.state() == LifecycleState::Running && !halted.contains(id)
        };

        models
            .par_iter_mut()
            .filter(|(id, model)| model.is_thread_safe() && schedulable(id, model))
            .for_each(|(id, model)| {
                puffin::profile_scope!("model_update", model.type_token());

                let ctx = UpdateContext {
                    tick,
                    spatial: &*index,
                };
                if let Err(e) = model.update(&ctx) {
                    faults.lock().push((*id, e));
                }
            });

        for id in order.iter() {
            let Some(model) = models.get_mut(id) else {
                continue;
            };

            if model.is_thread_safe() || !schedulable(id, model) {
                continue;
            }

            let ctx = UpdateContext {
                tick,
                spatial: &*index,
            };
            if let Err(e) = model.update(&ctx) {
                faults.lock().push((*id, e));
            }
        }

        for (id, e) in faults.into_inner() {
            log::error!("Halting {id} after failed update: {e}");
            halted.insert(id);
        }

        self.index = index;

        tick
    }
}

#[cfg(test)]
mod test {
    use std::{any::Any, sync::Arc};

    use parking_lot::Mutex;

    use crate::{
        config::WorldFile,
        model::{CallbackStatus, LifecycleState, ModelBase, ModelError, ModelView, PowerDraw},
        sensors::{BumperArray, ModelType, Sensorable, UpdateContext},
        world::{World, WorldError},
    };

    const WORLD: &str = r#"
models:
  - name: robot
    size: [1, 1, 0.5]
    children:
      - name: front
        type: bumper
        bcount: 2
        blength: 0.2
        bpose[0]: [0.5, 0.2, 0, 90]
        bpose[1]: [0.5, -0.2, 0, 90]
      - name: broken
        type: bumper
        blength: 0.2
        children:
          - name: orphan
  - name: wall
    pose: [0.55, 0.2, 0, 0]
    size: [0.02, 0.1, 0.5]
  - name: mystery
    type: laser
"#;

    fn world() -> (World, Vec<WorldError>) {
        let file = WorldFile::parse(WORLD).unwrap();
        let mut world = World::new();
        let failures = world.load_file(&file);

        (world, failures)
    }

    #[test]
    fn test_load_isolates_failures() {
        let (world, failures) = world();

        assert_eq!(failures.len(), 2);
        assert!(matches!(
            &failures[0],
            WorldError::Model {
                name,
                source: ModelError::Config(_)
            } if name == "broken"
        ));
        assert!(matches!(&failures[1], WorldError::UnknownModelType(t) if t == "laser"));

        assert!(world.find("robot").is_some());
        assert!(world.find("front").is_some());
        assert!(world.find("wall").is_some());
        assert!(world.find("broken").is_none());
        assert!(world.find("orphan").is_none());
        assert_eq!(world.len(), 3);
    }

    #[test]
    fn test_ticks_sample_against_the_world() {
        let (mut world, _) = world();
        world.startup().unwrap();

        let front = world.find("front").unwrap().id();
        assert_eq!(
            world.model(front).unwrap().base().power(),
            PowerDraw::Watts(0.1)
        );

        assert_eq!(world.update(), 1);
        assert_eq!(world.update(), 2);
        assert_eq!(world.update_count(), 2);

        let bumper = world.model(front).unwrap().sensor::<BumperArray>().unwrap();
        let hits: Vec<_> = bumper.samples().unwrap().iter().map(|s| s.hit).collect();
        assert_eq!(hits, vec![true, false]);
        assert_eq!(world.model(front).unwrap().base().last_update(), Some(2));

        world.shutdown();
        let model = world.model(front).unwrap();
        assert_eq!(model.state(), LifecycleState::Stopped);
        assert!(model.sensor::<BumperArray>().unwrap().samples().is_none());
    }

    #[test]
    fn test_callbacks_see_world_ticks() {
        let (mut world, _) = world();
        let front = world.find("front").unwrap().id();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        world.model_mut(front).unwrap().add_update_callback(
            move |view: ModelView<'_>, data: &mut (dyn Any + Send)| {
                let interval = *data.downcast_ref::<u64>().unwrap();
                if view.update_count() % interval != 0 {
                    return CallbackStatus::Continue;
                }

                let hits = view
                    .sensor::<BumperArray>()
                    .and_then(BumperArray::samples)
                    .map(|s| s.iter().filter(|s| s.hit).count())
                    .unwrap_or_default();
                log.lock().push((view.update_count(), hits));

                CallbackStatus::Continue
            },
            2u64,
        );

        world.startup().unwrap();
        for _ in 0..5 {
            world.update();
        }

        assert_eq!(*seen.lock(), vec![(2, 1), (4, 1)]);
    }

    #[derive(Debug)]
    struct Faulty;

    impl Sensorable for Faulty {
        fn type_token(&self) -> &'static str {
            "faulty"
        }

        fn update(&mut self, base: &ModelBase, _ctx: &UpdateContext) -> Result<(), ModelError> {
            Err(ModelError::Lifecycle {
                operation: "sense with",
                state: base.state(),
            })
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_failed_update_halts_only_that_model() {
        let mut world = World::new();
        let faulty = world.add_model(None, None, Box::new(Faulty)).unwrap();
        let body = world
            .add_model_type(None, Some("body"), ModelType::Model)
            .unwrap();

        world.startup().unwrap();
        world.update();
        world.update();

        assert!(world.is_halted(faulty));
        assert!(!world.is_halted(body));
        assert_eq!(world.model(faulty).unwrap().base().last_update(), Some(1));
        assert_eq!(world.model(body).unwrap().base().last_update(), Some(2));
        assert_eq!(world.model(faulty).unwrap().base().name(), "faulty:0");
    }

    #[test]
    fn test_remove_subtree() {
        let (mut world, _) = world();
        world.startup().unwrap();
        let robot = world.find("robot").unwrap().id();

        let removed = world.remove_model(robot);

        assert_eq!(removed.len(), 2);
        assert!(removed.iter().all(|m| m.state() == LifecycleState::Stopped));
        assert_eq!(world.len(), 1);
        assert!(world.add_model_type(Some(robot), None, ModelType::Model).is_err());
    }
}
