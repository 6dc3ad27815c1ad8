use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    pub min: Vec3,
    pub max: Vec3,
}

impl AABB {
    pub fn new(point1: Vec3, point2: Vec3) -> AABB {
        let min = point1.min(point2);
        let max = point1.max(point2);
        AABB { min, max }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<AABB> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut bounds = AABB {
            min: first,
            max: first,
        };

        for point in points {
            bounds.grow_point(point);
        }

        Some(bounds)
    }

    pub fn grow_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union(&self, other: &AABB) -> AABB {
        AABB {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn max_extent(&self) -> f32 {
        self.size().max_element()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_points_spans_all_points() {
        let bounds = AABB::from_points([
            Vec3::new(1.0, -2.0, 3.0),
            Vec3::new(-4.0, 5.0, 0.0),
            Vec3::new(0.0, 0.0, -1.0),
        ])
        .unwrap();

        assert_eq!(bounds.min, Vec3::new(-4.0, -2.0, -1.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 5.0, 3.0));
        assert_eq!(bounds.max_extent(), 7.0);
    }

    #[test]
    fn from_points_empty_is_none() {
        assert!(AABB::from_points([]).is_none());
    }

    #[test]
    fn single_point_has_zero_size() {
        let bounds = AABB::from_points([Vec3::splat(2.5)]).unwrap();
        assert_eq!(bounds.size(), Vec3::ZERO);
        assert_eq!(bounds.center(), Vec3::splat(2.5));
    }

    #[test]
    fn union_covers_both() {
        let a = AABB::new(Vec3::ZERO, Vec3::ONE);
        let b = AABB::new(Vec3::splat(-2.0), Vec3::splat(-1.0));
        let combined = a.union(&b);
        assert_eq!(combined.min, Vec3::splat(-2.0));
        assert_eq!(combined.max, Vec3::ONE);
    }
}
