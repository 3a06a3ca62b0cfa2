use glam::{Mat4, Vec2, Vec3};

use super::bounds::{BoundingBox, Intersection};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    pub fn from_normal_point(normal: Vec3, point: Vec3) -> Self {
        Self {
            normal,
            d: -normal.dot(point),
        }
    }

    pub fn from_points(a: Vec3, b: Vec3, c: Vec3) -> Self {
        let normal = (b - a).cross(c - a).normalize_or_zero();
        Self::from_normal_point(normal, a)
    }

    /// Signed distance; positive on the side the normal points to.
    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }
}

/// Convex camera volume described by eight corner vertices and six planes
/// with inward-pointing normals.
///
/// Vertices 0..4 form the near quad, 4..8 the far quad, both wound the same
/// way. The degenerate case (near quad equals far quad) is representable and
/// must be detected by callers before using the volume.
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    planes: [Plane; 6],
    vertices: [Vec3; 8],
}

const FACES: [[usize; 4]; 6] = [
    [0, 1, 2, 3], // near
    [4, 5, 6, 7], // far
    [0, 1, 5, 4],
    [1, 2, 6, 5],
    [2, 3, 7, 6],
    [3, 0, 4, 7],
];

impl Frustum {
    /// Perspective frustum looking down −Z in local space, transformed into
    /// world space by `world`.
    pub fn perspective(
        fov_y: f32,
        aspect: f32,
        zoom: f32,
        near: f32,
        far: f32,
        world: &Mat4,
    ) -> Self {
        let half_h_near = (fov_y * 0.5).tan() * near / zoom;
        let half_w_near = half_h_near * aspect;
        let half_h_far = (fov_y * 0.5).tan() * far / zoom;
        let half_w_far = half_h_far * aspect;

        Self::from_quads(
            Vec2::new(half_w_near, half_h_near),
            near,
            Vec2::new(half_w_far, half_h_far),
            far,
            world,
        )
    }

    /// Orthographic frustum with the given full view size, looking down −Z.
    pub fn orthographic(ortho_size: Vec2, zoom: f32, near: f32, far: f32, world: &Mat4) -> Self {
        let half = ortho_size * 0.5 / zoom;
        Self::from_quads(half, near, half, far, world)
    }

    fn from_quads(near_half: Vec2, near: f32, far_half: Vec2, far: f32, world: &Mat4) -> Self {
        let local = [
            Vec3::new(near_half.x, near_half.y, -near),
            Vec3::new(near_half.x, -near_half.y, -near),
            Vec3::new(-near_half.x, -near_half.y, -near),
            Vec3::new(-near_half.x, near_half.y, -near),
            Vec3::new(far_half.x, far_half.y, -far),
            Vec3::new(far_half.x, -far_half.y, -far),
            Vec3::new(-far_half.x, -far_half.y, -far),
            Vec3::new(-far_half.x, far_half.y, -far),
        ];
        let mut vertices = [Vec3::ZERO; 8];
        for (dst, src) in vertices.iter_mut().zip(local) {
            *dst = world.transform_point3(src);
        }
        Self::from_vertices(vertices)
    }

    pub fn from_vertices(vertices: [Vec3; 8]) -> Self {
        let centroid = vertices.iter().copied().sum::<Vec3>() / 8.0;
        let mut planes = [Plane::from_normal_point(Vec3::ZERO, Vec3::ZERO); 6];
        for (plane, face) in planes.iter_mut().zip(FACES) {
            let mut candidate =
                Plane::from_points(vertices[face[0]], vertices[face[1]], vertices[face[2]]);
            if candidate.distance(centroid) < 0.0 {
                candidate.normal = -candidate.normal;
                candidate.d = -candidate.d;
            }
            *plane = candidate;
        }
        Self { planes, vertices }
    }

    pub fn vertices(&self) -> &[Vec3; 8] {
        &self.vertices
    }

    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let mut vertices = [Vec3::ZERO; 8];
        for (dst, src) in vertices.iter_mut().zip(self.vertices) {
            *dst = matrix.transform_point3(src);
        }
        Self::from_vertices(vertices)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(self.vertices.iter().copied())
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance(point) >= 0.0)
    }

    /// Conservative plane test against an axis-aligned box. Zero-length
    /// normals (degenerate frustum faces) never reject.
    pub fn intersects_box(&self, bbox: &BoundingBox) -> Intersection {
        if !bbox.is_defined() {
            return Intersection::Outside;
        }

        let center = bbox.center();
        let half = bbox.half_size();
        let mut all_inside = true;
        for plane in &self.planes {
            let projected = half.dot(plane.normal.abs());
            let distance = plane.distance(center);
            if distance < -projected {
                return Intersection::Outside;
            }
            if distance < projected {
                all_inside = false;
            }
        }
        if all_inside {
            Intersection::Inside
        } else {
            Intersection::Intersects
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn look_frustum() -> Frustum {
        Frustum::perspective(
            60_f32.to_radians(),
            1.0,
            1.0,
            0.1,
            100.0,
            &Mat4::IDENTITY,
        )
    }

    #[test]
    fn box_in_front_is_inside() {
        let frustum = look_frustum();
        let bbox = BoundingBox::from_center_half_size(Vec3::new(0.0, 0.0, -10.0), Vec3::ONE);
        assert_eq!(frustum.intersects_box(&bbox), Intersection::Inside);
    }

    #[test]
    fn box_behind_camera_is_outside() {
        let frustum = look_frustum();
        let bbox = BoundingBox::from_center_half_size(Vec3::new(0.0, 0.0, 10.0), Vec3::ONE);
        assert_eq!(frustum.intersects_box(&bbox), Intersection::Outside);
    }

    #[test]
    fn box_straddling_near_plane_intersects() {
        let frustum = look_frustum();
        let bbox = BoundingBox::from_center_half_size(Vec3::new(0.0, 0.0, -0.1), Vec3::ONE);
        assert_eq!(frustum.intersects_box(&bbox), Intersection::Intersects);
    }

    #[test]
    fn transformed_frustum_follows_rotation() {
        let frustum = look_frustum();
        let rotation = Mat4::from_quat(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
        let rotated = frustum.transformed(&rotation);

        // Looking down −Z rotated by +90° about Y faces −X.
        assert!(rotated.contains_point(Vec3::new(-10.0, 0.0, 0.0)));
        assert!(!rotated.contains_point(Vec3::new(0.0, 0.0, -10.0)));
    }
}
