//! Registry of distance functions recognised in `ORDER BY`

use serde::{Deserialize, Serialize};
use sidecar_ir::DistanceMetric;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unsupported distance function: {0}")]
    FunctionNotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceFunction {
    pub name: String,
    pub metric: DistanceMetric,
    /// Name of the equivalent store-side function, used for pushdown
    pub native_name: Option<String>,
}

/// Lookup is case-insensitive; names are stored lowercased.
pub struct FunctionRegistry {
    functions: HashMap<String, DistanceFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };
        registry.register_builtins();
        registry
    }

    fn register_builtins(&mut self) {
        // Cosine distance, the only metric served
        for name in ["array_cosine_distance", "cosine_distance"] {
            self.register(DistanceFunction {
                name: name.to_string(),
                metric: DistanceMetric::Cosine,
                native_name: Some("array_cosine_distance".to_string()),
            });
        }
    }

    pub fn register(&mut self, func: DistanceFunction) {
        self.functions.insert(func.name.to_ascii_lowercase(), func);
    }

    pub fn lookup(&self, name: &str) -> Result<&DistanceFunction, RegistryError> {
        self.functions
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| RegistryError::FunctionNotFound(name.to_string()))
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let registry = FunctionRegistry::default();

        let func = registry.lookup("array_cosine_distance").unwrap();
        assert_eq!(func.metric, DistanceMetric::Cosine);
        assert_eq!(func.native_name.as_deref(), Some("array_cosine_distance"));
    }

    #[test]
    fn test_lookup_ignores_case() {
        let registry = FunctionRegistry::default();

        assert!(registry.lookup("ARRAY_COSINE_DISTANCE").is_ok());
        assert!(registry.lookup("Cosine_Distance").is_ok());
    }

    #[test]
    fn test_unknown_function() {
        let registry = FunctionRegistry::default();

        assert_eq!(
            registry.lookup("array_l2_distance").unwrap_err(),
            RegistryError::FunctionNotFound("array_l2_distance".to_string())
        );
    }

    #[test]
    fn test_register_custom() {
        let mut registry = FunctionRegistry {
            functions: HashMap::new(),
        };
        assert!(registry.lookup("cosine_distance").is_err());

        registry.register(DistanceFunction {
            name: "VecCos".to_string(),
            metric: DistanceMetric::Cosine,
            native_name: None,
        });
        assert_eq!(registry.lookup("veccos").unwrap().name, "VecCos");
        assert!(registry.lookup("cosine_distance").is_err());
    }
}
