//! Module containing miscellaneous utility functions.

/// Returns true if `val1` and `val2` are within a relative/absolute `epsilon` of each other,
/// depending on magnitude.
pub fn almost_eq(val1: f64, val2: f64, epsilon: Option<f64>) -> bool {
    let epsilon = epsilon.unwrap_or(1e-8);
    ((val2 - val1) / (val1 + val2)).abs() < epsilon || (val2 - val1).abs() < epsilon
}

/// Rounds `val` to `decimals` places after the decimal point
pub fn round_to(val: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (val * scale).round() / scale
}

/// Evenly spaced values over `[start, stop]`, endpoints included
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => vec![],
        1 => vec![start],
        _ => {
            let dx = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + dx * i as f64).collect()
        }
    }
}
