use crate::math::hashing::combine_hash;

/// Global pass slot, interned by name in [`PassRegistry`]. Techniques index
/// their passes by slot so pass lookup is a plain vector access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(u32);

impl PassId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryType {
    Static,
    Skinned,
    Instanced,
    Billboard,
}

impl GeometryType {
    pub fn as_u32(self) -> u32 {
        match self {
            GeometryType::Static => 0,
            GeometryType::Skinned => 1,
            GeometryType::Instanced => 2,
            GeometryType::Billboard => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MaterialQuality {
    Low,
    Medium,
    High,
}

/// Name-interning registry for pass slots ("base", "alpha", "light",
/// "shadow", ...). Slot indices are stable for the registry's lifetime.
#[derive(Debug, Default)]
pub struct PassRegistry {
    names: Vec<String>,
}

impl PassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_register(&mut self, name: &str) -> PassId {
        if let Some(index) = self.names.iter().position(|existing| existing == name) {
            return PassId(index as u32);
        }
        self.names.push(name.to_owned());
        PassId(self.names.len() as u32 - 1)
    }

    pub fn find(&self, name: &str) -> Option<PassId> {
        self.names
            .iter()
            .position(|existing| existing == name)
            .map(|index| PassId(index as u32))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One material pass: render-state relevant bits plus a version counter the
/// asset layer bumps on edit, folded into the content hash.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pass {
    pub depth_write: bool,
    pub alpha_blend: bool,
    pub version: u32,
}

impl Pass {
    pub fn opaque() -> Self {
        Self {
            depth_write: true,
            alpha_blend: false,
            version: 0,
        }
    }

    pub fn transparent() -> Self {
        Self {
            depth_write: false,
            alpha_blend: true,
            version: 0,
        }
    }

    pub fn state_hash(&self) -> u32 {
        let mut hash = 0;
        combine_hash(&mut hash, self.depth_write as u32);
        combine_hash(&mut hash, self.alpha_blend as u32);
        combine_hash(&mut hash, self.version);
        hash
    }
}

#[derive(Debug, Clone, Default)]
pub struct Technique {
    passes: Vec<Option<Pass>>,
}

impl Technique {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pass(mut self, id: PassId, pass: Pass) -> Self {
        if self.passes.len() <= id.index() {
            self.passes.resize(id.index() + 1, None);
        }
        self.passes[id.index()] = Some(pass);
        self
    }

    pub fn pass(&self, id: PassId) -> Option<&Pass> {
        self.passes.get(id.index()).and_then(|slot| slot.as_ref())
    }
}

/// Material: techniques selected by quality tier, plus sort-relevant state.
#[derive(Debug, Clone)]
pub struct Material {
    entries: Vec<(MaterialQuality, Technique)>,
    pub render_order: u8,
    pub version: u32,
}

impl Material {
    pub fn new(technique: Technique) -> Self {
        Self {
            entries: vec![(MaterialQuality::Low, technique)],
            render_order: 128,
            version: 0,
        }
    }

    pub fn with_technique(mut self, min_quality: MaterialQuality, technique: Technique) -> Self {
        self.entries.push((min_quality, technique));
        self
    }

    /// Best technique whose quality requirement is satisfied.
    pub fn find_technique(&self, quality: MaterialQuality) -> Option<&Technique> {
        self.entries
            .iter()
            .filter(|(min_quality, _)| *min_quality <= quality)
            .max_by_key(|(min_quality, _)| *min_quality)
            .map(|(_, technique)| technique)
    }

    pub fn state_hash(&self) -> u32 {
        let mut hash = 0;
        combine_hash(&mut hash, self.render_order as u32);
        combine_hash(&mut hash, self.version);
        hash
    }
}

/// Geometry is owned by the resource layer; the pipeline only needs identity
/// and a content fingerprint.
#[derive(Debug, Clone, Copy, Default)]
pub struct Geometry {
    pub version: u32,
}

impl Geometry {
    pub fn state_hash(&self) -> u32 {
        let mut hash = 0;
        combine_hash(&mut hash, self.version);
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_interns_names_once() {
        let mut registry = PassRegistry::new();
        let base = registry.get_or_register("base");
        let alpha = registry.get_or_register("alpha");
        assert_ne!(base, alpha);
        assert_eq!(registry.get_or_register("base"), base);
        assert_eq!(registry.find("alpha"), Some(alpha));
        assert_eq!(registry.find("missing"), None);
    }

    #[test]
    fn technique_selection_respects_quality_floor() {
        let mut registry = PassRegistry::new();
        let base = registry.get_or_register("base");

        let low = Technique::new().with_pass(base, Pass::opaque());
        let high = Technique::new().with_pass(base, Pass::transparent());
        let material =
            Material::new(low).with_technique(MaterialQuality::High, high);

        let picked_low = material.find_technique(MaterialQuality::Low).unwrap();
        assert!(!picked_low.pass(base).unwrap().alpha_blend);

        let picked_high = material.find_technique(MaterialQuality::High).unwrap();
        assert!(picked_high.pass(base).unwrap().alpha_blend);
    }

    #[test]
    fn missing_pass_slot_is_none() {
        let mut registry = PassRegistry::new();
        let base = registry.get_or_register("base");
        let shadow = registry.get_or_register("shadow");

        let technique = Technique::new().with_pass(base, Pass::opaque());
        assert!(technique.pass(base).is_some());
        assert!(technique.pass(shadow).is_none());
    }
}
