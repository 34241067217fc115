use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::{
    math::{Box2D, LineSegment, Pose, intersect_ray_box, intersect_ray_line_segment, rectangle_edges},
    model::{ModelBase, ModelId},
};

/// The world has no spatial state for the requesting model yet.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Spatial query unavailable for model {0}")]
pub struct QueryUnavailable(pub ModelId);

/// What a ray filter gets to know about a body it is about to test.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub id: ModelId,
    pub obstacle_return: bool,
}

/// Decides whether `candidate` may stop a ray cast on behalf of `requester`.
pub type RayFilter<'a> = dyn Fn(&Candidate, ModelId) -> bool + 'a;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaytraceHit {
    /// Contact point, carrying the ray's height and heading.
    pub pose: Pose,
    pub model: ModelId,
    pub range: f32,
}

impl RaytraceHit {
    #[inline]
    pub fn point(&self) -> glam::Vec2 {
        self.pose.position()
    }
}

/// Read-only view of body placement that sensors query during a tick.
pub trait SpatialQuery: Sync {
    fn global_pose(&self, model: ModelId) -> Option<Pose>;

    /// True for the same model or when one is an ancestor of the other.
    fn is_related(&self, a: ModelId, b: ModelId) -> bool;

    /// Nearest body accepted by `filter` along the ray from `origin` within `range`.
    fn raytrace(
        &self,
        origin: &Pose,
        range: f32,
        requester: ModelId,
        filter: &RayFilter,
    ) -> Result<Option<RaytraceHit>, QueryUnavailable>;
}

#[derive(Debug, Clone)]
struct IndexedBody {
    id: ModelId,
    obstacle_return: bool,
    bounds: Box2D,
    edges: SmallVec<[LineSegment; 4]>,
}

/// Snapshot of every body's global footprint, built between ticks.
///
/// Rays are tested against every body; there is no acceleration structure.
#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    bodies: Vec<IndexedBody>,
    poses: FxHashMap<ModelId, Pose>,
    parents: FxHashMap<ModelId, ModelId>,
}

impl SpatialIndex {
    /// Add a body at its global pose.
    pub fn insert(&mut self, base: &ModelBase, global: Pose) {
        let footprint = global.compose(&base.geom.pose);
        let edges: SmallVec<[LineSegment; 4]> =
            rectangle_edges(&footprint, base.geom.size).into_iter().collect();

        let bounds = edges
            .iter()
            .map(LineSegment::get_box)
            .reduce(|a, b| a.encase(&b))
            .unwrap_or(Box2D {
                min: footprint.position(),
                max: footprint.position(),
            });

        self.bodies.push(IndexedBody {
            id: base.id(),
            obstacle_return: base.obstacle_return,
            bounds,
            edges,
        });
        self.poses.insert(base.id(), global);

        if let Some(parent) = base.parent() {
            self.parents.insert(base.id(), parent);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn ancestors(&self, id: ModelId) -> impl Iterator<Item = ModelId> + '_ {
        std::iter::successors(self.parents.get(&id).copied(), |p| self.parents.get(p).copied())
    }
}

impl SpatialQuery for SpatialIndex {
    fn global_pose(&self, model: ModelId) -> Option<Pose> {
        self.poses.get(&model).copied()
    }

    fn is_related(&self, a: ModelId, b: ModelId) -> bool {
        a == b || self.ancestors(a).any(|p| p == b) || self.ancestors(b).any(|p| p == a)
    }

    fn raytrace(
        &self,
        origin: &Pose,
        range: f32,
        requester: ModelId,
        filter: &RayFilter,
    ) -> Result<Option<RaytraceHit>, QueryUnavailable> {
        if !self.poses.contains_key(&requester) {
            return Err(QueryUnavailable(requester));
        }

        if range <= 0. || !range.is_finite() {
            return Ok(None);
        }

        let pos = origin.position();
        let dir = origin.heading();

        let mut nearest: Option<(f32, ModelId)> = None;

        for body in &self.bodies {
            let candidate = Candidate {
                id: body.id,
                obstacle_return: body.obstacle_return,
            };

            if !filter(&candidate, requester) || intersect_ray_box(pos, dir, body.bounds).is_none() {
                continue;
            }

            for edge in &body.edges {
                if let Some(t) = intersect_ray_line_segment(pos, dir, edge)
                    && t <= range
                    && nearest.is_none_or(|(best, _)| t < best)
                {
                    nearest = Some((t, body.id));
                }
            }
        }

        log::trace!("Ray from {pos} along {dir} ({range} m) for {requester}: {nearest:?}");

        Ok(nearest.map(|(t, model)| {
            let point = pos + dir * t;

            RaytraceHit {
                pose: Pose::new(point.x, point.y, origin.z, origin.a),
                model,
                range: t,
            }
        }))
    }
}

#[cfg(test)]
mod test {
    use crate::{
        math::{Pose, Size},
        model::{ModelBase, ModelId, WorldTicks},
        world::spatial::{Candidate, SpatialIndex, SpatialQuery},
    };

    fn body(id: u64, parent: Option<u64>, size: Size, obstacle_return: bool) -> ModelBase {
        let mut base = ModelBase::new(
            ModelId(id),
            format!("body{id}"),
            parent.map(ModelId),
            WorldTicks::default(),
        );
        base.geom.size = size;
        base.obstacle_return = obstacle_return;
        base
    }

    fn any_obstacle(candidate: &Candidate, _: ModelId) -> bool {
        candidate.obstacle_return
    }

    #[test]
    fn test_lineage() {
        let mut index = SpatialIndex::default();
        index.insert(&body(0, None, Size::default(), true), Pose::ZERO);
        index.insert(&body(1, Some(0), Size::default(), true), Pose::ZERO);
        index.insert(&body(2, Some(1), Size::default(), true), Pose::ZERO);
        index.insert(&body(3, Some(0), Size::default(), true), Pose::ZERO);
        index.insert(&body(4, None, Size::default(), true), Pose::ZERO);

        assert_eq!(
            index.ancestors(ModelId(2)).collect::<Vec<_>>(),
            vec![ModelId(1), ModelId(0)]
        );
        assert!(index.is_related(ModelId(2), ModelId(2)));
        assert!(index.is_related(ModelId(2), ModelId(0)));
        assert!(index.is_related(ModelId(0), ModelId(2)));
        assert!(!index.is_related(ModelId(2), ModelId(3)));
        assert!(!index.is_related(ModelId(4), ModelId(0)));
    }

    #[test]
    fn test_nearest_hit() {
        let mut index = SpatialIndex::default();
        index.insert(&body(0, None, Size::new(0.1, 0.1, 0.1), false), Pose::ZERO);
        index.insert(&body(1, None, Size::new(1., 1., 1.), true), Pose::new(2., 0., 0., 0.));
        index.insert(&body(2, None, Size::new(1., 1., 1.), true), Pose::new(4., 0., 0., 0.));

        let hit = index
            .raytrace(&Pose::ZERO, 10., ModelId(0), &any_obstacle)
            .unwrap()
            .unwrap();

        assert_eq!(hit.model, ModelId(1));
        assert!((hit.range - 1.5).abs() < 1e-5);
        assert!((hit.point() - glam::vec2(1.5, 0.)).length() < 1e-5);

        assert_eq!(
            index.raytrace(&Pose::ZERO, 1., ModelId(0), &any_obstacle),
            Ok(None)
        );
        assert_eq!(
            index.raytrace(&Pose::ZERO, 0., ModelId(0), &any_obstacle),
            Ok(None)
        );
    }

    #[test]
    fn test_unknown_requester() {
        let index = SpatialIndex::default();

        assert!(
            index
                .raytrace(&Pose::ZERO, 1., ModelId(9), &any_obstacle)
                .is_err()
        );
    }
}
