//! Vector distance math used for client-side nearest-neighbour ranking

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceMetric {
    Cosine,
}

impl DistanceMetric {
    /// Distance between two vectors, `None` when they are not comparable
    pub fn distance(&self, a: &[f64], b: &[f64]) -> Option<f64> {
        match self {
            DistanceMetric::Cosine => cosine_distance(a, b),
        }
    }
}

/// `1 - cos(a, b)`, matching DuckDB's `array_cosine_distance`.
///
/// Returns `None` for mismatched dimensions, empty input or a zero-length
/// vector, where the angle is undefined.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    let distance = 1.0 - dot / (norm_a.sqrt() * norm_b.sqrt());
    distance.is_finite().then_some(distance)
}

/// Read a JSON array of numbers as a vector
pub fn vector_from_json(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(Value::as_f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_vectors_have_zero_distance() {
        let d = cosine_distance(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert!(d.abs() < 1e-12);
    }

    #[test]
    fn test_orthogonal_and_opposite() {
        let orthogonal = cosine_distance(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!((orthogonal - 1.0).abs() < 1e-12);

        let opposite = cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((opposite - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_magnitude_does_not_matter() {
        let d = cosine_distance(&[1.0, 1.0], &[10.0, 10.0]).unwrap();
        assert!(d.abs() < 1e-12);
    }

    #[test]
    fn test_incomparable_vectors() {
        assert_eq!(cosine_distance(&[1.0, 2.0], &[1.0]), None);
        assert_eq!(cosine_distance(&[], &[]), None);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), None);
    }

    #[test]
    fn test_vector_from_json() {
        assert_eq!(vector_from_json(&json!([1, 2.5, -3])), Some(vec![1.0, 2.5, -3.0]));
        assert_eq!(vector_from_json(&json!([1, "x"])), None);
        assert_eq!(vector_from_json(&json!(null)), None);
    }
}
