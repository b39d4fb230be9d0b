use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// World-space position or direction, in world units
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };
    pub const RIGHT: Vec2 = Vec2 { x: 1.0, y: 0.0 };
    pub const LEFT: Vec2 = Vec2 { x: -1.0, y: 0.0 };

    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `angle` (radians)
    #[inline]
    pub fn from_angle(angle: f32) -> Self {
        Self {
            x: angle.cos(),
            y: angle.sin(),
        }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        self.length_sq().sqrt()
    }

    #[inline]
    pub fn length_sq(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    /// Unit vector in the same direction, or zero for the zero vector
    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0 {
            Self {
                x: self.x / len,
                y: self.y / len,
            }
        } else {
            Self::ZERO
        }
    }

    #[inline]
    pub fn distance_to(&self, other: Vec2) -> f32 {
        (*self - other).length()
    }

    #[inline]
    pub fn distance_sq_to(&self, other: Vec2) -> f32 {
        (*self - other).length_sq()
    }

    /// Step of `distance` from `self` toward `target`, never overshooting it
    pub fn step_toward(&self, target: Vec2, distance: f32) -> Self {
        let delta = target - *self;
        let len = delta.length();
        if len <= distance || len == 0.0 {
            target
        } else {
            *self + delta * (distance / len)
        }
    }

    /// Clamp both components into `[min, max]`
    pub fn clamp_to(&self, min: f32, max: f32) -> Self {
        Self {
            x: self.x.clamp(min, max),
            y: self.y.clamp(min, max),
        }
    }

    /// Whether both components lie inside `[0, size]`
    pub fn within_square(&self, size: f32) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && (0.0..=size).contains(&self.x)
            && (0.0..=size).contains(&self.y)
    }

    pub fn approx_eq(&self, other: Vec2, epsilon: f32) -> bool {
        (self.x - other.x).abs() < epsilon && (self.y - other.y).abs() < epsilon
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(Vec2::ZERO.normalize(), Vec2::ZERO);
    }

    #[test]
    fn test_normalize_unit_length() {
        let v = Vec2::new(3.0, 4.0).normalize();
        assert!((v.length() - 1.0).abs() < 1e-6);
        assert!(v.approx_eq(Vec2::new(0.6, 0.8), 1e-6));
    }

    #[test]
    fn test_step_toward_does_not_overshoot() {
        let from = Vec2::new(0.0, 0.0);
        let target = Vec2::new(2.0, 0.0);
        assert_eq!(from.step_toward(target, 5.0), target);

        let stepped = from.step_toward(Vec2::new(10.0, 0.0), 3.0);
        assert!(stepped.approx_eq(Vec2::new(3.0, 0.0), 1e-6));
    }

    #[test]
    fn test_clamp_to() {
        let v = Vec2::new(-5.0, 250.0).clamp_to(10.0, 190.0);
        assert_eq!(v, Vec2::new(10.0, 190.0));
    }

    #[test]
    fn test_within_square() {
        assert!(Vec2::new(0.0, 100.0).within_square(100.0));
        assert!(!Vec2::new(-0.1, 50.0).within_square(100.0));
        assert!(!Vec2::new(50.0, 100.1).within_square(100.0));
        assert!(!Vec2::new(f32::NAN, 1.0).within_square(100.0));
    }
}
