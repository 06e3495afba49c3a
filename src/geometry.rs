use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// Tolerance for geometric predicates. Positions themselves compare bit-wise;
/// derived quantities (differences, dot products) go through this.
pub const EPSILON: f64 = 1e-9;

pub fn is_zero(v: f64) -> bool {
    v.abs() < EPSILON
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

/// Canvas coordinates and vectors share one representation.
pub type Position = Vec2;

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn dot(&self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn cross(&self, other: Vec2) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn normalized(&self) -> Vec2 {
        let len = self.length();
        Vec2::new(self.x / len, self.y / len)
    }

    /// Rotated 90 degrees counter-clockwise.
    pub fn perpendicular(&self) -> Vec2 {
        Vec2::new(-self.y, self.x)
    }

    pub fn angle(&self) -> f64 {
        self.y.atan2(self.x)
    }

    pub fn polar(angle: f64, length: f64) -> Vec2 {
        Vec2::new(angle.cos() * length, angle.sin() * length)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Vec2 {
    type Output = Vec2;
    fn div(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Vec2) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl MulAssign<f64> for Vec2 {
    fn mul_assign(&mut self, rhs: f64) {
        self.x *= rhs;
        self.y *= rhs;
    }
}

impl DivAssign<f64> for Vec2 {
    fn div_assign(&mut self, rhs: f64) {
        self.x /= rhs;
        self.y /= rhs;
    }
}

/// Half-line with a normalized direction. A degenerate ray (coincident
/// endpoints) carries a zero direction and never intersects anything.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub source: Position,
    pub direction: Vec2,
}

impl Ray {
    pub fn between(from: Position, to: Position) -> Ray {
        let dir = to - from;
        let len = dir.length();
        if len < EPSILON {
            return Ray {
                source: from,
                direction: Vec2::default(),
            };
        }
        Ray {
            source: from,
            direction: dir / len,
        }
    }

    pub fn perpendicular_to(&self, other: &Ray) -> bool {
        self.direction.dot(other.direction).abs() < EPSILON
    }

    pub fn parallel_to(&self, other: &Ray) -> bool {
        self.direction.cross(other.direction).abs() < EPSILON
    }

    pub fn distance_to_point(&self, point: Position) -> f64 {
        self.direction.cross(point - self.source).abs()
    }

    /// Parametric line intersection. `perp_only` additionally requires the
    /// rays to cross at a right angle.
    pub fn intersect(&self, other: &Ray, perp_only: bool) -> Option<Position> {
        if self.parallel_to(other) {
            return None;
        }
        if perp_only && !self.perpendicular_to(other) {
            return None;
        }
        let diff = other.source - self.source;
        let cross = self.direction.cross(other.direction);
        if cross.abs() < EPSILON {
            return None;
        }
        let t = diff.cross(other.direction) / cross;
        Some(self.source + self.direction * t)
    }

    pub fn rotated_90(&self) -> Ray {
        Ray {
            source: self.source,
            direction: self.direction.perpendicular(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_basics() {
        let a = Vec2::new(3.0, 4.0);
        assert_eq!(a.length(), 5.0);
        assert_eq!(a.dot(Vec2::new(1.0, 0.0)), 3.0);
        assert_eq!(a.cross(Vec2::new(1.0, 0.0)), -4.0);
        let n = a.normalized();
        assert!(is_zero(n.length() - 1.0));
        assert_eq!(a.perpendicular(), Vec2::new(-4.0, 3.0));
    }

    #[test]
    fn polar_round_trip() {
        let v = Vec2::polar(std::f64::consts::FRAC_PI_4, 2.0_f64.sqrt());
        assert!(is_zero(v.x - 1.0));
        assert!(is_zero(v.y - 1.0));
    }

    #[test]
    fn ray_intersection() {
        let a = Ray::between(Vec2::new(0.0, -20.0), Vec2::new(0.0, 0.0));
        let b = Ray::between(Vec2::new(30.0, 10.0), Vec2::new(10.0, 10.0));
        assert!(a.perpendicular_to(&b));
        let p = a.intersect(&b, true).unwrap();
        assert_eq!(p, Vec2::new(0.0, 10.0));
    }

    #[test]
    fn parallel_rays_do_not_intersect() {
        let a = Ray::between(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
        let b = Ray::between(Vec2::new(0.0, 5.0), Vec2::new(10.0, 5.0));
        assert!(a.parallel_to(&b));
        assert!(a.intersect(&b, false).is_none());
    }

    #[test]
    fn perp_only_rejects_oblique_crossings() {
        let a = Ray::between(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
        let b = Ray::between(Vec2::new(0.0, 10.0), Vec2::new(10.0, 0.0));
        assert!(a.intersect(&b, false).is_some());
        assert!(a.intersect(&b, true).is_none());
    }

    #[test]
    fn distance_to_point() {
        let r = Ray::between(Vec2::new(0.0, 0.0), Vec2::new(0.0, 10.0));
        assert!(is_zero(r.distance_to_point(Vec2::new(0.0, 25.0))));
        assert!(is_zero(r.distance_to_point(Vec2::new(7.0, 3.0)) - 7.0));
    }
}
