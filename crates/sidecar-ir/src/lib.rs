//! Sidecar Intermediate Representation (IR)
//!
//! Structured form of a translated query: which table, which filters, how to
//! order, how many rows. The executor drives the store from this and never
//! looks at query text again.
//! All types are deterministically serializable for caching and provenance.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub mod distance;
mod types;

pub use distance::{cosine_distance, vector_from_json, DistanceMetric};
pub use types::*;

/// A translated `SELECT` against a single table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub table: String,

    /// Projected columns; `None` selects every column in schema order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predicates: Vec<Predicate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordering: Option<Ordering>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl QueryRequest {
    /// Calculate fingerprint (SHA-256) for deterministic caching
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).expect("IR should always serialize");
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Vector ordering that still has to be applied to fetched rows
    pub fn vector_ordering(&self) -> Option<&VectorOrdering> {
        match &self.ordering {
            Some(Ordering::Vector(v)) => Some(v),
            _ => None,
        }
    }
}

/// One `column op value` constraint. Predicates on a request are ANDed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub column: String,
    pub op: CompareOp,
    pub value: String,
}

impl Predicate {
    pub fn new(column: impl Into<String>, op: CompareOp, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    /// Substring match. Not SQL `LIKE` wildcard semantics.
    Like,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::Like => "LIKE",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Row order for a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Ordering {
    Column {
        column: String,
        #[serde(default)]
        direction: SortDirection,
    },
    Vector(VectorOrdering),
}

/// Nearest-first ordering by distance between `column` and `vector`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorOrdering {
    pub column: String,
    pub metric: DistanceMetric,
    pub vector: Vec<f64>,

    /// Store function that computes the same distance, if one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_function: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryRequest {
        QueryRequest {
            table: "media_assets".to_string(),
            columns: None,
            predicates: vec![Predicate::new("status", CompareOp::Eq, "ready")],
            ordering: Some(Ordering::Column {
                column: "ingest_time".to_string(),
                direction: SortDirection::Desc,
            }),
            limit: Some(5),
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let request1 = sample();
        let request2 = request1.clone();

        assert_eq!(request1.fingerprint(), request2.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_limit() {
        let mut other = sample();
        other.limit = Some(6);

        assert_ne!(sample().fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_json_round_trip() {
        let request = QueryRequest {
            ordering: Some(Ordering::Vector(VectorOrdering {
                column: "embedding".to_string(),
                metric: DistanceMetric::Cosine,
                vector: vec![0.1, 0.2, 0.3],
                native_function: Some("array_cosine_distance".to_string()),
            })),
            ..sample()
        };

        let json = serde_json::to_string(&request).unwrap();
        let parsed: QueryRequest = serde_json::from_str(&json).unwrap();

        assert_eq!(request, parsed);
        assert_eq!(request.fingerprint(), parsed.fingerprint());
    }

    #[test]
    fn test_vector_ordering_accessor() {
        assert!(sample().vector_ordering().is_none());

        let request = QueryRequest {
            ordering: Some(Ordering::Vector(VectorOrdering {
                column: "embedding".to_string(),
                metric: DistanceMetric::Cosine,
                vector: vec![1.0],
                native_function: None,
            })),
            ..sample()
        };
        assert_eq!(request.vector_ordering().unwrap().column, "embedding");
    }
}
