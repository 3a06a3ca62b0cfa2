use glam::{IVec2, UVec2};

/// Integer pixel rectangle with exclusive maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntRect {
    pub min: IVec2,
    pub max: IVec2,
}

impl IntRect {
    pub fn new(min: IVec2, max: IVec2) -> Self {
        Self { min, max }
    }

    pub fn from_position_size(position: IVec2, size: UVec2) -> Self {
        Self {
            min: position,
            max: position + size.as_ivec2(),
        }
    }

    pub fn from_size(size: UVec2) -> Self {
        Self::from_position_size(IVec2::ZERO, size)
    }

    pub fn width(&self) -> i32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> i32 {
        self.max.y - self.min.y
    }

    pub fn size(&self) -> IVec2 {
        self.max - self.min
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_and_emptiness() {
        let rect = IntRect::from_position_size(IVec2::new(4, 8), UVec2::new(16, 32));
        assert_eq!(rect.width(), 16);
        assert_eq!(rect.height(), 32);
        assert!(!rect.is_empty());
        assert!(IntRect::default().is_empty());
    }
}
