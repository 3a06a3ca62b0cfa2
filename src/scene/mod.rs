pub mod camera;
pub mod drawable;
pub mod light;
pub mod material;

pub use camera::{Camera, CameraOverrideFlags};
pub use drawable::{
    Drawable, DrawableFlags, GeometryUpdateKind, GlobalIlluminationKind, SourceBatch,
};
pub use light::{
    BiasParameters, CascadeParameters, FocusParameters, Light, LightImportance, LightType,
    MAX_CASCADE_SPLITS, MAX_CUBEMAP_FACES, MAX_LIGHT_SPLITS,
};
pub use material::{
    Geometry, GeometryId, GeometryType, Material, MaterialId, MaterialQuality, Pass, PassId,
    PassRegistry, Technique,
};

use glam::Vec3;

use crate::math::{
    BoundingBox, Frustum, Intersection, Sphere, SphericalHarmonicsL1, LARGE_VALUE,
};

/// Ambient lighting region. Zone 0 of every scene is the implicit default
/// zone covering all space.
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub bounds: BoundingBox,
    pub ambient: Vec3,
    pub light_mask: u32,
    pub shadow_mask: u32,
    pub zone_mask: u32,
    pub priority: i32,
}

impl Default for Zone {
    fn default() -> Self {
        Self {
            bounds: BoundingBox::from_center_half_size(Vec3::ZERO, Vec3::splat(LARGE_VALUE)),
            ambient: Vec3::splat(0.1),
            light_mask: !0,
            shadow_mask: !0,
            zone_mask: !0,
            priority: i32::MIN,
        }
    }
}

/// Result of a zone query, cached per drawable between frames. The cache is
/// refreshed once the drawable moves past the invalidation distance from the
/// position it was cached at.
#[derive(Debug, Clone, Copy)]
pub struct CachedDrawableZone {
    pub zone: u32,
    pub cache_position: Vec3,
    pub invalidation_distance_squared: f32,
}

impl Default for CachedDrawableZone {
    fn default() -> Self {
        // NaN position forces the first query through the non-finite check.
        Self {
            zone: 0,
            cache_position: Vec3::splat(f32::NAN),
            invalidation_distance_squared: 0.0,
        }
    }
}

/// Baked light-probe field; sampled per drawable when its GI kind requests
/// probe blending.
#[derive(Debug, Clone, Default)]
pub struct GlobalIllumination {
    probes: Vec<(Vec3, SphericalHarmonicsL1)>,
}

impl GlobalIllumination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_probe(&mut self, position: Vec3, sh: SphericalHarmonicsL1) {
        self.probes.push((position, sh));
    }

    pub fn sample_ambient_sh(&self, position: Vec3) -> SphericalHarmonicsL1 {
        self.probes
            .iter()
            .min_by(|(a, _), (b, _)| {
                a.distance_squared(position)
                    .total_cmp(&b.distance_squared(position))
            })
            .map(|(_, sh)| *sh)
            .unwrap_or_default()
    }
}

/// Arena of scene entities observed by the pipeline. The drawable index (the
/// arena position) is the stable identity all per-frame arrays key on.
///
/// Spatial queries are linear reference scans; the interface is the contract
/// and a real spatial index lives outside this slice.
#[derive(Debug, Default)]
pub struct Scene {
    drawables: Vec<Drawable>,
    zones: Vec<Zone>,
    materials: Vec<Material>,
    geometries: Vec<Geometry>,
    gi: Option<GlobalIllumination>,
    pub pass_registry: PassRegistry,
    default_material: Option<MaterialId>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            zones: vec![Zone::default()],
            ..Self::default()
        }
    }

    pub fn add_drawable(&mut self, drawable: Drawable) -> u32 {
        self.drawables.push(drawable);
        self.drawables.len() as u32 - 1
    }

    pub fn add_zone(&mut self, zone: Zone) -> u32 {
        self.zones.push(zone);
        self.zones.len() as u32 - 1
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        MaterialId(self.materials.len() as u32 - 1)
    }

    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryId {
        self.geometries.push(geometry);
        GeometryId(self.geometries.len() as u32 - 1)
    }

    pub fn drawable(&self, index: u32) -> Option<&Drawable> {
        self.drawables.get(index as usize)
    }

    pub fn drawable_mut(&mut self, index: u32) -> Option<&mut Drawable> {
        self.drawables.get_mut(index as usize)
    }

    pub fn drawables(&self) -> &[Drawable] {
        &self.drawables
    }

    pub fn num_drawables(&self) -> usize {
        self.drawables.len()
    }

    pub fn zone(&self, index: u32) -> &Zone {
        self.zones.get(index as usize).unwrap_or(&self.zones[0])
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0 as usize)
    }

    pub fn geometry(&self, id: GeometryId) -> Option<&Geometry> {
        self.geometries.get(id.0 as usize)
    }

    pub fn set_default_material(&mut self, id: MaterialId) {
        self.default_material = Some(id);
    }

    pub fn default_material(&self) -> Option<MaterialId> {
        self.default_material
    }

    pub fn set_global_illumination(&mut self, gi: GlobalIllumination) {
        self.gi = Some(gi);
    }

    pub fn global_illumination(&self) -> Option<&GlobalIllumination> {
        self.gi.as_ref()
    }

    /// Drawables of the requested kinds whose bounds touch the frustum.
    pub fn query_frustum(
        &self,
        frustum: &Frustum,
        flags: DrawableFlags,
        view_mask: u32,
        out: &mut Vec<u32>,
    ) {
        out.clear();
        for (index, drawable) in self.drawables.iter().enumerate() {
            if drawable.flags.intersects(flags)
                && (drawable.view_mask & view_mask) != 0
                && frustum.intersects_box(&drawable.world_bounds) != Intersection::Outside
            {
                out.push(index as u32);
            }
        }
    }

    pub fn query_sphere(
        &self,
        sphere: &Sphere,
        flags: DrawableFlags,
        view_mask: u32,
        out: &mut Vec<u32>,
    ) {
        out.clear();
        for (index, drawable) in self.drawables.iter().enumerate() {
            if drawable.flags.intersects(flags)
                && (drawable.view_mask & view_mask) != 0
                && sphere.intersects_box(&drawable.world_bounds)
            {
                out.push(index as u32);
            }
        }
    }

    /// Highest-priority zone containing the position and matching the mask.
    /// The returned invalidation distance is a quarter of the distance to the
    /// nearest zone boundary, so small movements keep the cache warm.
    pub fn query_zone(&self, position: Vec3, zone_mask: u32) -> CachedDrawableZone {
        let mut best: u32 = 0;
        let mut best_priority = i32::MIN;
        for (index, zone) in self.zones.iter().enumerate() {
            if (zone.zone_mask & zone_mask) != 0
                && zone.bounds.contains_point(position)
                && (index == 0 || zone.priority > best_priority)
            {
                best = index as u32;
                if index != 0 {
                    best_priority = zone.priority;
                }
            }
        }

        let bounds = &self.zones[best as usize].bounds;
        let to_boundary = (position - bounds.min)
            .abs()
            .min((bounds.max - position).abs())
            .min_element();
        let invalidation = if to_boundary.is_finite() {
            (to_boundary * 0.25).max(1.0)
        } else {
            LARGE_VALUE
        };

        CachedDrawableZone {
            zone: best,
            cache_position: position,
            invalidation_distance_squared: invalidation * invalidation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn frustum_query_filters_by_kind_and_mask() {
        let mut scene = Scene::new();
        let geometry = scene.add_drawable(Drawable::new_geometry(
            BoundingBox::from_center_half_size(Vec3::new(0.0, 0.0, -5.0), Vec3::ONE),
            Vec::new(),
        ));
        let masked = {
            let mut drawable = Drawable::new_geometry(
                BoundingBox::from_center_half_size(Vec3::new(0.0, 0.0, -5.0), Vec3::ONE),
                Vec::new(),
            );
            drawable.view_mask = 0x2;
            scene.add_drawable(drawable)
        };
        let light =
            scene.add_drawable(Drawable::new_light(Light::point(Vec3::new(0.0, 0.0, -5.0), 2.0)));

        let camera = Camera::default();
        let frustum = camera.frustum();

        let mut out = Vec::new();
        scene.query_frustum(&frustum, DrawableFlags::GEOMETRY, 0x1, &mut out);
        assert_eq!(out, vec![geometry]);

        scene.query_frustum(&frustum, DrawableFlags::LIGHT, !0, &mut out);
        assert_eq!(out, vec![light]);

        scene.query_frustum(&frustum, DrawableFlags::GEOMETRY, 0x2, &mut out);
        assert_eq!(out, vec![geometry, masked]);
    }

    #[test]
    fn zone_query_prefers_priority_and_caches_position() {
        let mut scene = Scene::new();
        let inner = scene.add_zone(Zone {
            bounds: BoundingBox::from_center_half_size(Vec3::ZERO, Vec3::splat(4.0)),
            ambient: Vec3::X,
            priority: 10,
            ..Zone::default()
        });

        let cached = scene.query_zone(Vec3::ZERO, !0);
        assert_eq!(cached.zone, inner);
        assert_eq!(cached.cache_position, Vec3::ZERO);
        assert!(cached.invalidation_distance_squared >= 1.0);

        let outside = scene.query_zone(Vec3::splat(100.0), !0);
        assert_eq!(outside.zone, 0);
    }

    #[test]
    fn default_cached_zone_forces_first_update() {
        let cached = CachedDrawableZone::default();
        let distance = (cached.cache_position - Vec3::ZERO).length_squared();
        assert!(!distance.is_finite());
    }

    #[test]
    fn gi_samples_nearest_probe() {
        let mut gi = GlobalIllumination::new();
        gi.add_probe(Vec3::ZERO, SphericalHarmonicsL1::from_ambient(Vec3::X));
        gi.add_probe(
            Vec3::new(10.0, 0.0, 0.0),
            SphericalHarmonicsL1::from_ambient(Vec3::Y),
        );

        let near_origin = gi.sample_ambient_sh(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(near_origin.ambient, Vec3::X);

        let near_far = gi.sample_ambient_sh(Vec3::new(9.0, 0.0, 0.0));
        assert_eq!(near_far.ambient, Vec3::Y);
    }

    #[test]
    fn directional_light_is_returned_by_any_frustum_query() {
        let mut scene = Scene::new();
        let light = scene.add_drawable(Drawable::new_light(Light::directional(
            Quat::from_rotation_x(-1.0),
        )));

        let camera = Camera {
            position: Vec3::new(500.0, 0.0, 500.0),
            ..Camera::default()
        };

        let mut out = Vec::new();
        scene.query_frustum(&camera.frustum(), DrawableFlags::LIGHT, !0, &mut out);
        assert_eq!(out, vec![light]);
    }
}
