pub mod bounds;
pub mod frustum;
pub mod hashing;
pub mod polyhedron;
pub mod range;
pub mod rect;
pub mod sh;

pub use bounds::{BoundingBox, Intersection, Sphere};
pub use frustum::{Frustum, Plane};
pub use polyhedron::Polyhedron;
pub use range::FloatRange;
pub use rect::IntRect;
pub use sh::SphericalHarmonicsL1;

/// Upper bound used to detect effectively infinite geometry (skyboxes and
/// other unbounded objects must not contribute to depth ranges).
pub const LARGE_VALUE: f32 = 1.0e8;

pub const EPSILON: f32 = 1.0e-6;
