use glam::UVec2;
use log::warn;

use crate::gfx::{ShadowMapRegion, TextureHandle};
use crate::math::IntRect;
use crate::settings::ShadowMapSettings;

/// One shelf row of an atlas page.
#[derive(Debug, Clone, Copy)]
struct Shelf {
    y: u32,
    height: u32,
    cursor_x: u32,
}

/// One fixed-size atlas page. The texture handle is stable for the lifetime
/// of the pool; only the region bookkeeping resets per frame.
#[derive(Debug)]
struct AtlasPage {
    texture: TextureHandle,
    shelves: Vec<Shelf>,
    next_shelf_y: u32,
}

impl AtlasPage {
    fn reset(&mut self) {
        self.shelves.clear();
        self.next_shelf_y = 0;
    }

    fn allocate(&mut self, size: UVec2, page_size: u32) -> Option<ShadowMapRegion> {
        for shelf in &mut self.shelves {
            if shelf.height >= size.y && shelf.cursor_x + size.x <= page_size {
                let origin = UVec2::new(shelf.cursor_x, shelf.y);
                shelf.cursor_x += size.x;
                return Some(self.region(origin, size, page_size));
            }
        }

        if self.next_shelf_y + size.y <= page_size {
            let shelf = Shelf {
                y: self.next_shelf_y,
                height: size.y,
                cursor_x: size.x,
            };
            let origin = UVec2::new(0, shelf.y);
            self.next_shelf_y += size.y;
            self.shelves.push(shelf);
            return Some(self.region(origin, size, page_size));
        }

        None
    }

    fn region(&self, origin: UVec2, size: UVec2, page_size: u32) -> ShadowMapRegion {
        ShadowMapRegion {
            texture: Some(self.texture),
            texture_size: UVec2::splat(page_size),
            rect: IntRect::from_position_size(origin.as_ivec2(), size),
        }
    }
}

/// Transient shadow atlas: a pool of fixed-size pages carved into regions
/// with a shelf allocator. Regions are valid for one frame only; `reset`
/// reclaims every page at frame begin without touching the textures.
#[derive(Debug, Default)]
pub struct ShadowMapAllocator {
    settings: ShadowMapSettings,
    pages: Vec<AtlasPage>,
    next_texture_id: u64,
}

impl ShadowMapAllocator {
    pub fn new(settings: ShadowMapSettings) -> Self {
        Self {
            settings,
            pages: Vec::new(),
            next_texture_id: 0,
        }
    }

    /// Replacing the settings drops the page pool; textures are recreated
    /// lazily with the new page size and format.
    pub fn set_settings(&mut self, settings: ShadowMapSettings) {
        if self.settings != settings {
            self.settings = settings;
            self.pages.clear();
        }
    }

    pub fn settings(&self) -> &ShadowMapSettings {
        &self.settings
    }

    pub fn reset(&mut self) {
        for page in &mut self.pages {
            page.reset();
        }
    }

    /// Allocate a region for one light's shadow map. Requests larger than a
    /// page are clamped; a request that fits no existing page opens a new
    /// one. Returns the invalid region when shadows are disabled.
    pub fn allocate(&mut self, size: UVec2) -> ShadowMapRegion {
        let page_size = self.settings.page_size;
        if !self.settings.enable_shadows || page_size == 0 {
            return ShadowMapRegion::default();
        }
        if size.x == 0 || size.y == 0 {
            warn!("Ignoring zero-sized shadow map request");
            return ShadowMapRegion::default();
        }

        let clamped = size.min(UVec2::splat(page_size));
        for page in &mut self.pages {
            if let Some(region) = page.allocate(clamped, page_size) {
                return region;
            }
        }

        let texture = TextureHandle::new(self.next_texture_id);
        self.next_texture_id += 1;
        self.pages.push(AtlasPage {
            texture,
            shelves: Vec::new(),
            next_shelf_y: 0,
        });
        self.pages
            .last_mut()
            .and_then(|page| page.allocate(clamped, page_size))
            .unwrap_or_default()
    }

    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator(page_size: u32) -> ShadowMapAllocator {
        ShadowMapAllocator::new(ShadowMapSettings {
            page_size,
            ..ShadowMapSettings::default()
        })
    }

    #[test]
    fn regions_on_one_page_do_not_overlap() {
        let mut atlas = allocator(1024);
        let a = atlas.allocate(UVec2::splat(512));
        let b = atlas.allocate(UVec2::splat(512));

        assert!(a.is_valid() && b.is_valid());
        assert_eq!(a.texture, b.texture);
        assert_ne!(a.rect, b.rect);
    }

    #[test]
    fn exhausted_page_opens_a_new_one() {
        let mut atlas = allocator(512);
        let first = atlas.allocate(UVec2::splat(512));
        let second = atlas.allocate(UVec2::splat(512));

        assert!(second.is_valid());
        assert_ne!(first.texture, second.texture);
        assert_eq!(atlas.num_pages(), 2);
    }

    #[test]
    fn reset_reclaims_pages_and_keeps_textures() {
        let mut atlas = allocator(512);
        let before = atlas.allocate(UVec2::splat(512));
        atlas.reset();
        let after = atlas.allocate(UVec2::splat(512));

        assert_eq!(before.texture, after.texture);
        assert_eq!(before.rect, after.rect);
        assert_eq!(atlas.num_pages(), 1);
    }

    #[test]
    fn oversized_requests_are_clamped_to_the_page() {
        let mut atlas = allocator(256);
        let region = atlas.allocate(UVec2::splat(2048));
        assert!(region.is_valid());
        assert_eq!(region.rect.width(), 256);
    }

    #[test]
    fn disabled_shadows_never_allocate() {
        let mut atlas = ShadowMapAllocator::new(ShadowMapSettings {
            enable_shadows: false,
            ..ShadowMapSettings::default()
        });
        assert!(!atlas.allocate(UVec2::splat(256)).is_valid());
    }
}
