use crate::Point;

/// Signed volume of the tetrahedron (positive for right-handed vertex order).
pub fn signed_volume(pt0: Point, pt1: Point, pt2: Point, pt3: Point) -> f64 {
    let a = pt1 - pt0;
    let b = pt2 - pt0;
    let c = pt3 - pt0;
    a.dot(b.cross(c)) / 6.
}

/// Tetrahedron volume.
pub fn tetrahedron_volume(pt0: Point, pt1: Point, pt2: Point, pt3: Point) -> f64 {
    signed_volume(pt0, pt1, pt2, pt3).abs()
}

/// Returns tetrahedron centroid (i.e. average of each vertices)
pub fn tetrahedron_centroid(pt0: Point, pt1: Point, pt2: Point, pt3: Point) -> Point {
    let x = (pt0.x + pt1.x + pt2.x + pt3.x) / 4.;
    let y = (pt0.y + pt1.y + pt2.y + pt3.y) / 4.;
    let z = (pt0.z + pt1.z + pt2.z + pt3.z) / 4.;
    Point::new(x, y, z)
}

/// Mean edge length, used as the length scale for degeneracy checks.
pub fn mean_edge_length(pts: &[Point; 4]) -> f64 {
    let mut sum = 0.;
    for i in 0..4 {
        for j in (i + 1)..4 {
            sum += pts[i].distance(&pts[j]);
        }
    }
    sum / 6.
}

/// Circumsphere center and squared radius.
///
/// Returns `None` when the four points are (nearly) coplanar.
pub fn circumsphere(pt0: Point, pt1: Point, pt2: Point, pt3: Point) -> Option<(Point, f64)> {
    let a = pt1 - pt0;
    let b = pt2 - pt0;
    let c = pt3 - pt0;
    let det = 2. * a.dot(b.cross(c));
    let scale = a.length() * b.length() * c.length();
    if det.abs() <= 1e-12 * scale {
        return None;
    }
    let num = b.cross(c) * a.dot(a) + c.cross(a) * b.dot(b) + a.cross(b) * c.dot(c);
    let offset = num * (1. / det);
    let center = pt0 + offset;
    Some((center, offset.dot(offset)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_tet() -> [Point; 4] {
        [
            Point::new(0., 0., 0.),
            Point::new(1., 0., 0.),
            Point::new(0., 1., 0.),
            Point::new(0., 0., 1.),
        ]
    }

    #[test]
    fn test_volume() {
        let [p0, p1, p2, p3] = unit_tet();
        assert!((tetrahedron_volume(p0, p1, p2, p3) - 1. / 6.).abs() < 1e-12);
        assert!(signed_volume(p0, p1, p2, p3) > 0.);
        assert!(signed_volume(p0, p2, p1, p3) < 0.);
    }

    #[test]
    fn test_circumsphere() {
        let [p0, p1, p2, p3] = unit_tet();
        let (center, r2) = circumsphere(p0, p1, p2, p3).unwrap();
        assert!(center.is_close(&Point::new(0.5, 0.5, 0.5)));
        assert!((r2 - 0.75).abs() < 1e-12);
        for p in [p0, p1, p2, p3] {
            let d = p - center;
            assert!((d.dot(d) - r2).abs() < 1e-12);
        }
    }

    #[test]
    fn test_circumsphere_coplanar() {
        let p3 = Point::new(1., 1., 0.);
        let [p0, p1, p2, _] = unit_tet();
        assert!(circumsphere(p0, p1, p2, p3).is_none());
    }
}
