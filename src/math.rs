use crate::my_types::*;

/// Smaller eigenvalue of the symmetric matrix [[a, b], [b, c]].
pub fn min_eigenvalue(a: f64, b: f64, c: f64) -> f64 {
    let half_trace = 0.5 * (a + c);
    let half_diff = 0.5 * (a - c);
    half_trace - (half_diff * half_diff + b * b).sqrt()
}

/// ref C. Harris and M. Stephens, A Combined Corner and Edge Detector, 1988
/// R = det(M) - k * trace(M)^2 for the structure tensor M = [[a, b], [b, c]]
pub fn harris_response(a: f64, b: f64, c: f64, k: f64) -> f64 {
    let det = a * c - b * b;
    let trace = a + c;
    det - k * trace * trace
}

/// Minimum eigenvalue of a spatial gradient matrix.
pub fn min_eigenvalue_of(m: &Matrix2d) -> f64 {
    min_eigenvalue(m[(0, 0)], m[(0, 1)], m[(1, 1)])
}
