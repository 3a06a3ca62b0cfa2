use std::ops::{Add, AddAssign};

use glam::Vec3;

/// First-order spherical harmonics with one color per band, enough to carry
/// flat ambient plus a directional gradient.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SphericalHarmonicsL1 {
    pub ambient: Vec3,
    pub dx: Vec3,
    pub dy: Vec3,
    pub dz: Vec3,
}

impl SphericalHarmonicsL1 {
    pub fn from_ambient(color: Vec3) -> Self {
        Self {
            ambient: color,
            ..Self::default()
        }
    }

    pub fn add_ambient(&mut self, color: Vec3) {
        self.ambient += color;
    }

    pub fn evaluate(&self, direction: Vec3) -> Vec3 {
        self.ambient + self.dx * direction.x + self.dy * direction.y + self.dz * direction.z
    }
}

impl Add for SphericalHarmonicsL1 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            ambient: self.ambient + rhs.ambient,
            dx: self.dx + rhs.dx,
            dy: self.dy + rhs.dy,
            dz: self.dz + rhs.dz,
        }
    }
}

impl AddAssign for SphericalHarmonicsL1 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambient_only_is_direction_independent() {
        let sh = SphericalHarmonicsL1::from_ambient(Vec3::splat(0.25));
        assert_eq!(sh.evaluate(Vec3::X), sh.evaluate(Vec3::NEG_Z));
    }

    #[test]
    fn directional_band_shifts_along_axis() {
        let mut sh = SphericalHarmonicsL1::from_ambient(Vec3::splat(0.5));
        sh.dy = Vec3::splat(0.5);
        assert!(sh.evaluate(Vec3::Y).y > sh.evaluate(Vec3::NEG_Y).y);
    }
}
