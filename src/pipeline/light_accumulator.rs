use crate::math::SphericalHarmonicsL1;
use crate::scene::LightImportance;

/// Shared parameters for one light being accumulated into many geometries.
#[derive(Debug, Clone, Copy)]
pub struct AccumulatorContext {
    pub max_vertex_lights: usize,
    pub max_pixel_lights: usize,
    pub importance: LightImportance,
    /// Ordinal of the light in the frame's visible-light list.
    pub light_index: u32,
}

/// Bounded per-geometry light list ranked by penalty (lower wins), plus the
/// spherical-harmonics ambient term. Pixel and vertex budgets are separate;
/// important lights may grow the pixel budget so they are never dropped.
#[derive(Debug, Clone, Default)]
pub struct LightAccumulator {
    /// Sorted by (penalty, light index); the index tiebreak keeps the order
    /// reproducible when penalties collide.
    lights: Vec<(f32, u32)>,
    pub sh: SphericalHarmonicsL1,
    num_important: usize,
    first_vertex_light: usize,
}

impl LightAccumulator {
    pub fn reset_lights(&mut self) {
        self.lights.clear();
        self.num_important = 0;
        self.first_vertex_light = 0;
    }

    pub fn accumulate(&mut self, ctx: &AccumulatorContext, penalty: f32) {
        if ctx.importance == LightImportance::Important {
            self.num_important += 1;
        }

        let position = self.lights.partition_point(|&(existing, index)| {
            existing < penalty || (existing == penalty && index < ctx.light_index)
        });
        self.lights.insert(position, (penalty, ctx.light_index));

        self.first_vertex_light = ctx.max_pixel_lights.max(self.num_important);
        let max_lights = ctx.max_vertex_lights + self.first_vertex_light;
        if self.lights.len() > max_lights {
            self.lights.pop();
        }
    }

    /// Per-pixel lights as (penalty, visible-light ordinal), best first.
    pub fn pixel_lights(&self) -> &[(f32, u32)] {
        &self.lights[..self.first_vertex_light.min(self.lights.len())]
    }

    pub fn vertex_lights(&self) -> &[(f32, u32)] {
        &self.lights[self.first_vertex_light.min(self.lights.len())..]
    }

    /// Stable fingerprint of the vertex-light assignment.
    pub fn vertex_lights_hash(&self) -> u32 {
        let mut hash = 0;
        for &(_, index) in self.vertex_lights() {
            crate::math::hashing::combine_hash(&mut hash, index);
        }
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(importance: LightImportance, light_index: u32) -> AccumulatorContext {
        AccumulatorContext {
            max_vertex_lights: 2,
            max_pixel_lights: 2,
            importance,
            light_index,
        }
    }

    #[test]
    fn keeps_lowest_penalty_lights() {
        let mut accumulator = LightAccumulator::default();
        for (index, penalty) in [(0, 0.8), (1, 0.2), (2, 1.5), (3, 0.5), (4, 2.5)] {
            accumulator.accumulate(&ctx(LightImportance::Auto, index), penalty);
        }

        let pixel: Vec<u32> = accumulator.pixel_lights().iter().map(|&(_, i)| i).collect();
        assert_eq!(pixel, vec![1, 3]);
        // Worst light (index 4) was dropped: 2 pixel + 2 vertex budget.
        assert_eq!(accumulator.vertex_lights().len(), 2);
    }

    #[test]
    fn important_lights_extend_the_pixel_budget() {
        let mut accumulator = LightAccumulator::default();
        for index in 0..3 {
            accumulator.accumulate(&ctx(LightImportance::Important, index), -1.0);
        }
        accumulator.accumulate(&ctx(LightImportance::Auto, 3), 0.5);

        assert_eq!(accumulator.pixel_lights().len(), 3);
        assert!(accumulator
            .pixel_lights()
            .iter()
            .all(|&(penalty, _)| penalty == -1.0));
    }

    #[test]
    fn equal_penalties_order_by_light_identity() {
        let mut forward = LightAccumulator::default();
        let mut reverse = LightAccumulator::default();
        for index in [0u32, 1, 2] {
            forward.accumulate(&ctx(LightImportance::Auto, index), 1.0);
        }
        for index in [2u32, 1, 0] {
            reverse.accumulate(&ctx(LightImportance::Auto, index), 1.0);
        }
        assert_eq!(forward.pixel_lights(), reverse.pixel_lights());
        assert_eq!(forward.vertex_lights_hash(), reverse.vertex_lights_hash());
    }

    #[test]
    fn reset_clears_lights_but_not_sh() {
        let mut accumulator = LightAccumulator::default();
        accumulator.accumulate(&ctx(LightImportance::Auto, 0), 0.1);
        accumulator.sh = SphericalHarmonicsL1::from_ambient(glam::Vec3::ONE);
        accumulator.reset_lights();

        assert!(accumulator.pixel_lights().is_empty());
        assert_eq!(accumulator.sh.ambient, glam::Vec3::ONE);
    }
}
