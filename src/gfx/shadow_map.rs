use glam::{IVec2, UVec2};

use super::TextureHandle;
use crate::math::IntRect;

/// Sub-rectangle of a shadow atlas page assigned to one light for one frame.
/// The default value is the "no shadow map" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShadowMapRegion {
    pub texture: Option<TextureHandle>,
    pub texture_size: UVec2,
    pub rect: IntRect,
}

impl ShadowMapRegion {
    pub fn is_valid(&self) -> bool {
        self.texture.is_some() && !self.rect.is_empty()
    }

    /// Carve out the sub-rectangle for one shadow split, given the split grid
    /// of the owning region. Splits fill the grid row-major.
    pub fn split(&self, index: u32, grid: UVec2) -> ShadowMapRegion {
        if !self.is_valid() || grid.x == 0 || grid.y == 0 {
            return ShadowMapRegion::default();
        }

        let split_size = IVec2::new(
            self.rect.width() / grid.x as i32,
            self.rect.height() / grid.y as i32,
        );
        let cell = IVec2::new((index % grid.x) as i32, (index / grid.x) as i32);
        let min = self.rect.min + split_size * cell;

        ShadowMapRegion {
            texture: self.texture,
            texture_size: self.texture_size,
            rect: IntRect::new(min, min + split_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> ShadowMapRegion {
        ShadowMapRegion {
            texture: Some(TextureHandle::new(7)),
            texture_size: UVec2::splat(2048),
            rect: IntRect::from_size(UVec2::new(1536, 1024)),
        }
    }

    #[test]
    fn split_covers_grid_row_major() {
        let grid = UVec2::new(3, 2);
        let region = region();

        let first = region.split(0, grid);
        assert_eq!(first.rect.min, IVec2::ZERO);
        assert_eq!(first.rect.size(), IVec2::new(512, 512));

        let fourth = region.split(3, grid);
        assert_eq!(fourth.rect.min, IVec2::new(0, 512));

        let last = region.split(5, grid);
        assert_eq!(last.rect.min, IVec2::new(1024, 512));
        assert_eq!(last.rect.max, IVec2::new(1536, 1024));
    }

    #[test]
    fn split_of_invalid_region_is_invalid() {
        let invalid = ShadowMapRegion::default();
        assert!(!invalid.split(0, UVec2::new(1, 1)).is_valid());
    }
}
