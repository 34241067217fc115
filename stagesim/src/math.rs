use std::f32::consts::PI;

/// A pose in a parent frame: planar position, height, and heading in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub a: f32,
}

impl Pose {
    pub const ZERO: Pose = Pose {
        x: 0.,
        y: 0.,
        z: 0.,
        a: 0.,
    };

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32, a: f32) -> Self {
        Self { x, y, z, a }
    }

    #[inline]
    pub fn position(&self) -> glam::Vec2 {
        glam::vec2(self.x, self.y)
    }

    #[inline]
    pub fn heading(&self) -> glam::Vec2 {
        glam::Vec2::from_angle(self.a)
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.a.is_finite()
    }

    /// Express `local`, given in this pose's frame, in the frame this pose lives in.
    #[inline]
    pub fn compose(&self, local: &Pose) -> Pose {
        let offset = self.heading().rotate(local.position());

        Pose {
            x: self.x + offset.x,
            y: self.y + offset.y,
            z: self.z + local.z,
            a: normalize_angle(self.a + local.a),
        }
    }
}

/// Wrap an angle into `[-PI, PI)`.
#[inline]
pub fn normalize_angle(a: f32) -> f32 {
    (a + PI).rem_euclid(2. * PI) - PI
}

/// Body extents along its local axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Size {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Default for Size {
    fn default() -> Self {
        Self::new(1., 1., 1.)
    }
}

/// Body geometry: footprint offset within the body frame plus its size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Geom {
    pub pose: Pose,
    pub size: Size,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box2D {
    pub min: glam::Vec2,
    pub max: glam::Vec2,
}

impl Box2D {
    #[inline]
    pub fn contains(&self, point: glam::Vec2) -> bool {
        (point.cmple(self.max) & point.cmpge(self.min)).all()
    }

    #[inline]
    pub fn encase(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment(pub glam::Vec2, pub glam::Vec2);

impl LineSegment {
    #[inline]
    pub fn midpoint(&self) -> glam::Vec2 {
        self.0.midpoint(self.1)
    }

    #[inline]
    pub fn get_box(&self) -> Box2D {
        Box2D {
            min: self.0.min(self.1),
            max: self.0.max(self.1),
        }
    }
}

/// Outline of a rectangle of `size` centred on `pose`, as four edges.
pub fn rectangle_edges(pose: &Pose, size: Size) -> [LineSegment; 4] {
    let half = glam::vec2(size.x, size.y) / 2.;
    let rot = pose.heading();
    let centre = pose.position();

    let [a, b, c, d] = [
        glam::vec2(-half.x, -half.y),
        glam::vec2(half.x, -half.y),
        glam::vec2(half.x, half.y),
        glam::vec2(-half.x, half.y),
    ]
    .map(|corner| centre + rot.rotate(corner));

    [
        LineSegment(a, b),
        LineSegment(b, c),
        LineSegment(c, d),
        LineSegment(d, a),
    ]
}

/// Entry distance of a ray into an axis-aligned box, or the exit distance
/// when the ray starts inside it.
#[inline]
pub fn intersect_ray_box(
    pos: glam::Vec2,
    dir: glam::Vec2,
    Box2D { min, max }: Box2D,
) -> Option<f32> {
    let center = (min + max) / 2.0;
    let half_extent = (max - min) / 2.0;
    let shifted_pos = pos - center;
    let m = 1.0 / dir;
    let n = m * shifted_pos;
    let k = m.abs() * half_extent;

    let t_n = (-n.x - k.x).max(-n.y - k.y);
    let t_f = (-n.x + k.x).min(-n.y + k.y);

    if t_n > t_f || t_f < 0. {
        None
    } else if t_n < 0. {
        Some(t_f)
    } else {
        Some(t_n)
    }
}

/// Distance along `dir` at which the ray crosses `line_seg`, in units of `dir`.
#[inline]
pub fn intersect_ray_line_segment(
    pos: glam::Vec2,
    dir: glam::Vec2,
    line_seg: &LineSegment,
) -> Option<f32> {
    let shift = line_seg.0 - pos;
    let disp = line_seg.1 - line_seg.0;

    let denom = dir.perp_dot(disp);

    if denom.abs() < f32::EPSILON {
        return None;
    }

    let u = -dir.perp_dot(shift) / denom;

    if (0.0..=1.0).contains(&u) {
        let t = shift.perp_dot(disp) / denom;

        if t > f32::EPSILON { Some(t) } else { None }
    } else {
        None
    }
}
