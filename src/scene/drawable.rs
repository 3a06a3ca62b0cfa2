use bitflags::bitflags;

use super::light::Light;
use super::material::{GeometryId, GeometryType, MaterialId};
use crate::math::BoundingBox;

bitflags! {
    /// What kind of scene entity a drawable is. An entity may in principle be
    /// both, so the classification is a flag set rather than an enum.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DrawableFlags: u8 {
        const GEOMETRY = 1 << 0;
        const LIGHT = 1 << 1;
    }
}

/// How a drawable's geometry buffers may be refreshed after visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeometryUpdateKind {
    #[default]
    None,
    /// Safe to update from any worker thread.
    WorkerThread,
    /// Must be updated from the orchestrating thread.
    MainThread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GlobalIlluminationKind {
    #[default]
    None,
    BlendLightProbes,
}

/// One renderable piece of a drawable: geometry plus an optional material.
#[derive(Debug, Clone, Copy)]
pub struct SourceBatch {
    pub geometry: GeometryId,
    pub material: Option<MaterialId>,
    pub geometry_type: GeometryType,
}

/// Scene entity observed by the render pipeline. Immutable during a frame;
/// all per-frame bookkeeping lives in the processors, keyed by the drawable
/// index (the position in the scene arena).
#[derive(Debug, Clone)]
pub struct Drawable {
    pub flags: DrawableFlags,
    pub world_bounds: BoundingBox,
    pub view_mask: u32,
    pub light_mask: u32,
    pub shadow_mask: u32,
    pub zone_mask: u32,
    pub cast_shadows: bool,
    /// Maximum view distance; zero means unlimited.
    pub draw_distance: f32,
    /// Maximum distance at which shadows are rendered; zero means unlimited.
    pub shadow_distance: f32,
    pub update_kind: GeometryUpdateKind,
    pub gi_kind: GlobalIlluminationKind,
    pub batches: Vec<SourceBatch>,
    pub light: Option<Light>,
}

impl Drawable {
    pub fn new_geometry(world_bounds: BoundingBox, batches: Vec<SourceBatch>) -> Self {
        Self {
            flags: DrawableFlags::GEOMETRY,
            world_bounds,
            view_mask: !0,
            light_mask: !0,
            shadow_mask: !0,
            zone_mask: !0,
            cast_shadows: false,
            draw_distance: 0.0,
            shadow_distance: 0.0,
            update_kind: GeometryUpdateKind::None,
            gi_kind: GlobalIlluminationKind::None,
            batches,
            light: None,
        }
    }

    pub fn new_light(light: Light) -> Self {
        Self {
            flags: DrawableFlags::LIGHT,
            world_bounds: light.world_bounds(),
            view_mask: !0,
            light_mask: !0,
            shadow_mask: !0,
            zone_mask: !0,
            cast_shadows: false,
            draw_distance: 0.0,
            shadow_distance: 0.0,
            update_kind: GeometryUpdateKind::None,
            gi_kind: GlobalIlluminationKind::None,
            batches: Vec::new(),
            light: Some(light),
        }
    }

    pub fn is_geometry(&self) -> bool {
        self.flags.contains(DrawableFlags::GEOMETRY)
    }

    pub fn is_light(&self) -> bool {
        self.flags.contains(DrawableFlags::LIGHT)
    }
}
