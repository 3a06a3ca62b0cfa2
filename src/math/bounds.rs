use glam::{Mat4, Vec3};

/// Result of a volume containment test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intersection {
    Outside,
    Intersects,
    Inside,
}

/// Axis-aligned bounding box. The default value is undefined (`min > max`)
/// and acts as the neutral element for merging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }
}

impl BoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_size(center: Vec3, half_size: Vec3) -> Self {
        Self::new(center - half_size, center + half_size)
    }

    pub fn from_sphere(sphere: &Sphere) -> Self {
        Self::from_center_half_size(sphere.center, Vec3::splat(sphere.radius))
    }

    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        let mut result = Self::default();
        for point in points {
            result.merge_point(point);
        }
        result
    }

    pub fn is_defined(&self) -> bool {
        self.min.x <= self.max.x
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn half_size(&self) -> Vec3 {
        self.size() * 0.5
    }

    pub fn merge_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn merge(&mut self, other: &BoundingBox) {
        if other.is_defined() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (min, max) = (self.min, self.max);
        [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(max.x, max.y, max.z),
        ]
    }

    /// Axis-aligned box containing the transformed corners. Conservative for
    /// rotations, exact for translation and scaling.
    pub fn transformed(&self, matrix: &Mat4) -> BoundingBox {
        if !self.is_defined() {
            return *self;
        }
        BoundingBox::from_points(
            self.corners()
                .into_iter()
                .map(|corner| matrix.transform_point3(corner)),
        )
    }

    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        (point.clamp(self.min, self.max) - point).length()
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Enclosing sphere of a point cloud: centroid plus the farthest radius.
    /// Not minimal, but conservative and stable.
    pub fn from_points(points: &[Vec3]) -> Self {
        if points.is_empty() {
            return Self::new(Vec3::ZERO, 0.0);
        }
        let center = points.iter().copied().sum::<Vec3>() / points.len() as f32;
        let radius = points
            .iter()
            .map(|p| p.distance(center))
            .fold(0.0, f32::max);
        Self::new(center, radius)
    }

    pub fn intersects_box(&self, bbox: &BoundingBox) -> bool {
        bbox.is_defined() && bbox.distance_to_point(self.center) <= self.radius
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.distance_squared(self.center) <= self.radius * self.radius
    }
}
