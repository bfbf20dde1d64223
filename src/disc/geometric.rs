use nalgebra::Vector2;

pub trait Geometric2D {
    fn compute_normal(p0: Vector2<f64>, p1: Vector2<f64>) -> Vector2<f64> {
        // normalized normal vector, outward for an edge walked counter-clockwise
        let normal = Vector2::new(p1.y - p0.y, p0.x - p1.x);
        normal / normal.norm()
    }
    fn compute_edge_length(p0: Vector2<f64>, p1: Vector2<f64>) -> f64 {
        (p1 - p0).norm()
    }
    fn compute_signed_area(points: &[Vector2<f64>]) -> f64 {
        // shoelace formula, positive for counter-clockwise vertex order
        let n = points.len();
        let mut twice_area = 0.0;
        for i in 0..n {
            let a = points[i];
            let b = points[(i + 1) % n];
            twice_area += a.x * b.y - b.x * a.y;
        }
        0.5 * twice_area
    }
    fn compute_vertex_average(points: &[Vector2<f64>]) -> Vector2<f64> {
        let sum = points
            .iter()
            .fold(Vector2::zeros(), |acc: Vector2<f64>, p| acc + p);
        sum / points.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Probe;
    impl Geometric2D for Probe {}

    #[test]
    fn test_signed_area_follows_winding() {
        let ccw = [
            Vector2::new(0.0, 0.0),
            Vector2::new(2.0, 0.0),
            Vector2::new(2.0, 1.0),
            Vector2::new(0.0, 1.0),
        ];
        let mut cw = ccw;
        cw.reverse();
        assert_relative_eq!(Probe::compute_signed_area(&ccw), 2.0, epsilon = 1e-14);
        assert_relative_eq!(Probe::compute_signed_area(&cw), -2.0, epsilon = 1e-14);
    }

    #[test]
    fn test_normal_points_right_of_edge() {
        let n = Probe::compute_normal(Vector2::new(0.0, 0.0), Vector2::new(1.0, 0.0));
        assert_relative_eq!(n.x, 0.0, epsilon = 1e-14);
        assert_relative_eq!(n.y, -1.0, epsilon = 1e-14);
    }
}
