use glam::{Mat4, Vec3};

use super::bounds::{BoundingBox, Sphere};
use super::frustum::{Frustum, Plane};

/// Convex volume stored as a face soup. Used to clip a camera split frustum
/// by the bounds of lit geometry before fitting a shadow camera.
///
/// Clipping keeps only face fragments on the positive side of each plane; no
/// cap polygon is generated, which is sufficient because every cap vertex
/// already lies on a clipped face edge and bounding volumes only look at
/// vertices.
#[derive(Debug, Clone, Default)]
pub struct Polyhedron {
    faces: Vec<Vec<Vec3>>,
}

impl Polyhedron {
    pub fn from_frustum(frustum: &Frustum) -> Self {
        let v = frustum.vertices();
        let faces = vec![
            vec![v[0], v[1], v[2], v[3]],
            vec![v[4], v[5], v[6], v[7]],
            vec![v[0], v[1], v[5], v[4]],
            vec![v[1], v[2], v[6], v[5]],
            vec![v[2], v[3], v[7], v[6]],
            vec![v[3], v[0], v[4], v[7]],
        ];
        Self { faces }
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn clip_to_box(&mut self, bbox: &BoundingBox) {
        if !bbox.is_defined() {
            return;
        }
        let planes = [
            Plane::from_normal_point(Vec3::X, bbox.min),
            Plane::from_normal_point(Vec3::NEG_X, bbox.max),
            Plane::from_normal_point(Vec3::Y, bbox.min),
            Plane::from_normal_point(Vec3::NEG_Y, bbox.max),
            Plane::from_normal_point(Vec3::Z, bbox.min),
            Plane::from_normal_point(Vec3::NEG_Z, bbox.max),
        ];
        for plane in &planes {
            self.clip(plane);
            if self.is_empty() {
                return;
            }
        }
    }

    /// Sutherland-Hodgman clip of every face against one half-space, keeping
    /// the positive side.
    pub fn clip(&mut self, plane: &Plane) {
        let mut clipped = Vec::with_capacity(self.faces.len());
        for face in &self.faces {
            let mut out = Vec::with_capacity(face.len() + 2);
            for (i, &current) in face.iter().enumerate() {
                let previous = face[(i + face.len() - 1) % face.len()];
                let current_distance = plane.distance(current);
                let previous_distance = plane.distance(previous);

                if current_distance >= 0.0 {
                    if previous_distance < 0.0 {
                        out.push(intersect_edge(previous, current, previous_distance, current_distance));
                    }
                    out.push(current);
                } else if previous_distance >= 0.0 {
                    out.push(intersect_edge(previous, current, previous_distance, current_distance));
                }
            }
            if out.len() >= 3 {
                clipped.push(out);
            }
        }
        self.faces = clipped;
    }

    pub fn transform(&mut self, matrix: &Mat4) {
        for face in &mut self.faces {
            for vertex in face.iter_mut() {
                *vertex = matrix.transform_point3(*vertex);
            }
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(self.faces.iter().flatten().copied())
    }

    pub fn bounding_sphere(&self) -> Sphere {
        let vertices: Vec<Vec3> = self.faces.iter().flatten().copied().collect();
        Sphere::from_points(&vertices)
    }
}

fn intersect_edge(a: Vec3, b: Vec3, da: f32, db: f32) -> Vec3 {
    let t = da / (da - db);
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    fn unit_frustum_volume() -> Polyhedron {
        let frustum = Frustum::orthographic(
            glam::Vec2::splat(4.0),
            1.0,
            0.0,
            4.0,
            &Mat4::IDENTITY,
        );
        Polyhedron::from_frustum(&frustum)
    }

    #[test]
    fn clip_shrinks_bounding_box() {
        let mut volume = unit_frustum_volume();
        let before = volume.bounding_box();

        let clip = BoundingBox::new(
            glam::Vec3::new(-1.0, -1.0, -3.0),
            glam::Vec3::new(1.0, 1.0, -1.0),
        );
        volume.clip_to_box(&clip);

        assert!(!volume.is_empty());
        let after = volume.bounding_box();
        assert!(after.size().x < before.size().x);
        assert!(after.min.cmpge(clip.min - 1e-4).all());
        assert!(after.max.cmple(clip.max + 1e-4).all());
    }

    #[test]
    fn clip_by_disjoint_box_empties_volume() {
        let mut volume = unit_frustum_volume();
        let clip = BoundingBox::new(
            glam::Vec3::new(100.0, 100.0, 100.0),
            glam::Vec3::new(101.0, 101.0, 101.0),
        );
        volume.clip_to_box(&clip);
        assert!(volume.is_empty());
    }

    #[test]
    fn bounding_sphere_encloses_all_vertices() {
        let volume = unit_frustum_volume();
        let sphere = volume.bounding_sphere();
        let bbox = volume.bounding_box();
        for corner in bbox.corners() {
            // The sphere must cover the box corners that came from vertices.
            if volume
                .faces
                .iter()
                .flatten()
                .any(|v| v.abs_diff_eq(corner, 1e-4))
            {
                assert!(sphere.center.distance(corner) <= sphere.radius + 1e-4);
            }
        }
    }
}
