//! Arrays of binary touch sensors (bumpers, whiskers).
//!
//! Each transducer is a segment of `length` centred at `pose` and lying along
//! its heading. Every tick a single ray is cast across the segment: rotated a
//! quarter turn from the heading and starting half a length back, so it
//! sweeps the segment's extent. This approximates coverage of the whole
//! segment; it is not an exact area test.
//!
//! ```yaml
//! type: bumper
//! bcount: 3
//! blength: 0.1          # applied to every transducer first
//! bpose[0]: [0.2, 0.1, 0, 45]
//! blength[1]: 0.2       # then per-index overrides, whatever the order
//! ```

use std::{any::Any, f32::consts::FRAC_PI_2};

use itertools::Itertools;

use crate::{
    config::{ConfigError, ConfigKey, ConfigLoader},
    math::{Geom, LineSegment, Pose, Size},
    model::{ModelBase, ModelError, ModelOption},
    sensors::{Sensorable, UpdateContext},
    world::spatial::{Candidate, QueryUnavailable},
};

pub const BUMPER_WATTS: f32 = 0.1;
pub const DEFAULT_SIZE: Size = Size::new(0.1, 0.1, 0.1);
/// Transducer length used when the array sets no `blength`.
pub const DEFAULT_LENGTH: f32 = 0.1;
pub const HIT_THICKNESS: f32 = 0.02;
pub const NOHIT_THICKNESS: f32 = 0.01;

pub static SHOW_BUMPER_DATA: ModelOption =
    ModelOption::new("Show Bumper Data", "show_bumper", true);

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransducerConfig {
    /// Centre of the segment relative to the owning body.
    pub pose: Pose,
    pub length: f32,
}

impl TransducerConfig {
    /// Origin and heading of the ray that sweeps this transducer's segment.
    pub fn sensing_pose(&self) -> Pose {
        let a = self.pose.a + FRAC_PI_2;
        let half = self.length / 2.;

        Pose {
            x: self.pose.x - half * a.cos(),
            y: self.pose.y - half * a.sin(),
            z: self.pose.z,
            a,
        }
    }

    /// The segment itself, in the owning body's frame.
    pub fn segment(&self) -> LineSegment {
        let half = self.pose.heading() * (self.length / 2.);
        let centre = self.pose.position();

        LineSegment(centre - half, centre + half)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorSample {
    pub hit: bool,
    /// Global contact point. Meaningless unless `hit`.
    pub hit_point: glam::Vec2,
}

impl SensorSample {
    #[inline]
    pub fn contact(&self) -> Option<glam::Vec2> {
        self.hit.then_some(self.hit_point)
    }
}

/// Drawable state of one transducer for an external renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransducerSegment {
    pub segment: LineSegment,
    pub hit: bool,
    pub thickness: f32,
}

#[derive(Debug, Clone, Default)]
pub struct BumperArray {
    transducers: Vec<TransducerConfig>,
    samples: Option<Vec<SensorSample>>,
}

impl BumperArray {
    #[inline]
    pub fn count(&self) -> usize {
        self.transducers.len()
    }

    #[inline]
    pub fn transducers(&self) -> &[TransducerConfig] {
        &self.transducers
    }

    /// Readings from the latest tick. Absent until the first update after
    /// startup and again after shutdown.
    #[inline]
    pub fn samples(&self) -> Option<&[SensorSample]> {
        self.samples.as_deref()
    }

    pub fn data_visualization(&self) -> Option<Vec<TransducerSegment>> {
        let samples = self.samples.as_ref()?;

        if self.transducers.is_empty() || !SHOW_BUMPER_DATA.is_enabled() {
            return None;
        }

        Some(
            self.transducers
                .iter()
                .zip(samples)
                .map(|(transducer, sample)| TransducerSegment {
                    segment: transducer.segment(),
                    hit: sample.hit,
                    thickness: if sample.hit {
                        HIT_THICKNESS
                    } else {
                        NOHIT_THICKNESS
                    },
                })
                .collect(),
        )
    }
}

fn valid_length(length: f32) -> bool {
    length.is_finite() && length >= 0.
}

impl Sensorable for BumperArray {
    fn type_token(&self) -> &'static str {
        "bumper"
    }

    fn construct(&mut self, base: &mut ModelBase) {
        base.set_geom(Geom {
            pose: Pose::ZERO,
            size: DEFAULT_SIZE,
        });
        base.register_option(&SHOW_BUMPER_DATA);

        self.transducers.clear();
        self.samples = None;
    }

    fn load(&mut self, base: &mut ModelBase, config: &dyn ConfigLoader) -> Result<(), ConfigError> {
        let count_key = ConfigKey::new("bcount");

        if !config.has_field(count_key) {
            return Err(ConfigError::MissingField(count_key.to_string()));
        }

        let count = config.read_int(count_key, 0);
        let count = usize::try_from(count)
            .ok()
            .filter(|&c| c > 0)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: count_key.to_string(),
                reason: format!("expected a positive transducer count, got {count}"),
            })?;

        let mut common_length = config.read_length(ConfigKey::new("blength"), DEFAULT_LENGTH);
        if !valid_length(common_length) {
            log::warn!(
                "{}: ignoring blength {common_length}, using {DEFAULT_LENGTH}",
                base.name()
            );
            common_length = DEFAULT_LENGTH;
        }

        // Array-wide settings first, then per-index overrides.
        let mut transducers = vec![
            TransducerConfig {
                pose: Pose::ZERO,
                length: common_length,
            };
            count
        ];

        for (i, transducer) in transducers.iter_mut().enumerate() {
            let pose = ConfigKey::indexed("bpose", i);
            transducer.pose = Pose {
                x: config.read_tuple_length(pose, 0, 0.),
                y: config.read_tuple_length(pose, 1, 0.),
                z: config.read_tuple_length(pose, 2, 0.),
                a: config.read_tuple_angle(pose, 3, 0.),
            };

            let length = config.read_length(ConfigKey::indexed("blength", i), transducer.length);
            if valid_length(length) {
                transducer.length = length;
            } else {
                log::warn!("{}: ignoring blength[{i}] {length}", base.name());
            }
        }

        log::debug!("{}: loaded {count} bumper configs", base.name());
        self.transducers = transducers;

        Ok(())
    }

    fn startup(&mut self, base: &mut ModelBase) -> Result<(), ModelError> {
        log::debug!("{}: bumper startup", base.name());
        base.set_watts(BUMPER_WATTS)
    }

    fn update(&mut self, base: &ModelBase, ctx: &UpdateContext) -> Result<(), ModelError> {
        if self.transducers.is_empty() {
            return Ok(());
        }

        puffin::profile_function!();

        let spatial = ctx.spatial;
        let global = spatial
            .global_pose(base.id())
            .ok_or(QueryUnavailable(base.id()))?;

        // Ignore myself, my ancestors and my descendants.
        let bumper_match = |candidate: &Candidate, finder| {
            candidate.obstacle_return && !spatial.is_related(candidate.id, finder)
        };

        let count = self.transducers.len();
        let samples = self
            .samples
            .get_or_insert_with(|| vec![SensorSample::default(); count]);

        for (transducer, sample) in self.transducers.iter().zip(samples.iter_mut()) {
            let ray = global.compose(&transducer.sensing_pose());
            let hit = spatial.raytrace(&ray, transducer.length, base.id(), &bumper_match)?;

            *sample = match hit {
                Some(hit) => SensorSample {
                    hit: true,
                    hit_point: hit.point(),
                },
                None => SensorSample::default(),
            };
        }

        Ok(())
    }

    fn shutdown(&mut self, base: &mut ModelBase) -> Result<(), ModelError> {
        log::debug!("{}: bumper shutdown", base.name());
        self.samples = None;
        base.set_watts(0.)
    }

    fn is_thread_safe(&self) -> bool {
        true
    }

    fn describe(&self) -> Option<String> {
        let flags = match &self.samples {
            Some(samples) => samples.iter().map(|s| u8::from(s.hit)).join(" "),
            None => String::new(),
        };

        Some(format!("Bumpers[ {flags} ]"))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
