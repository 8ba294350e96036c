use crate::geom::point::Point;

/// Returns the (min, max) corners of the axis-aligned box holding all points.
///
/// An empty slice gives a degenerate box at the origin.
pub fn bounding_box(pts: &[Point]) -> (Point, Point) {
    if pts.is_empty() {
        return (Point::default(), Point::default());
    }
    let mut pmin = pts[0];
    let mut pmax = pts[0];
    for p in pts.iter().skip(1) {
        pmin.x = pmin.x.min(p.x);
        pmin.y = pmin.y.min(p.y);
        pmin.z = pmin.z.min(p.z);
        pmax.x = pmax.x.max(p.x);
        pmax.y = pmax.y.max(p.y);
        pmax.z = pmax.z.max(p.z);
    }
    (pmin, pmax)
}

/// Radius of the smallest origin-centred sphere holding all points.
pub fn bounding_radius(pts: &[Point]) -> f64 {
    pts.iter()
        .map(|p| p.radius_squared())
        .fold(0.0_f64, f64::max)
        .sqrt()
}
