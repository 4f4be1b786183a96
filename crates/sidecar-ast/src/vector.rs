//! Nearest-neighbour ordering resolution
//!
//! Turns `ORDER BY <fn>(<column>, [<f>, ...])` into a [`VectorOrdering`].
//! The store API has no ordering-by-expression, so the result is a directive
//! for the executor rather than a plain column ordering.

use sidecar_ir::VectorOrdering;
use sidecar_registry::FunctionRegistry;

use crate::parser::ParseError;

pub fn resolve_distance_call(
    functions: &FunctionRegistry,
    func: &str,
    column: &str,
    elements: &[String],
    desc: bool,
) -> Result<VectorOrdering, ParseError> {
    let function = functions
        .lookup(func)
        .map_err(|e| ParseError::Unsupported(e.to_string()))?;

    if desc {
        return Err(ParseError::Unsupported(format!(
            "{func}() orders nearest-first only; DESC is not supported"
        )));
    }

    let vector = parse_vector(elements)?;

    Ok(VectorOrdering {
        column: column.to_string(),
        metric: function.metric,
        vector,
        native_function: function.native_name.clone(),
    })
}

fn parse_vector(elements: &[String]) -> Result<Vec<f64>, ParseError> {
    if elements.is_empty() {
        return Err(ParseError::Syntax("Query vector is empty".to_string()));
    }

    elements
        .iter()
        .enumerate()
        .map(|(i, raw)| match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(ParseError::Syntax(format!(
                "Query vector element {i} is not a number: {raw}"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidecar_ir::DistanceMetric;

    fn elems(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolves_cosine() {
        let registry = FunctionRegistry::default();
        let ordering = resolve_distance_call(
            &registry,
            "ARRAY_COSINE_DISTANCE",
            "embedding",
            &elems(&["0.5", "-1", "2e0"]),
            false,
        )
        .unwrap();

        assert_eq!(ordering.column, "embedding");
        assert_eq!(ordering.metric, DistanceMetric::Cosine);
        assert_eq!(ordering.vector, vec![0.5, -1.0, 2.0]);
        assert_eq!(ordering.native_function.as_deref(), Some("array_cosine_distance"));
    }

    #[test]
    fn test_unknown_function_is_unsupported() {
        let registry = FunctionRegistry::default();
        let err =
            resolve_distance_call(&registry, "array_l2_distance", "e", &elems(&["1"]), false).unwrap_err();
        assert!(matches!(err, ParseError::Unsupported(_)));
    }

    #[test]
    fn test_descending_is_unsupported() {
        let registry = FunctionRegistry::default();
        let err =
            resolve_distance_call(&registry, "cosine_distance", "e", &elems(&["1"]), true).unwrap_err();
        assert!(matches!(err, ParseError::Unsupported(_)));
    }

    #[test]
    fn test_non_numeric_elements_are_malformed() {
        let registry = FunctionRegistry::default();
        for bad in [vec!["0.1", "abc"], vec!["NaN"], vec!["inf"], vec![]] {
            let err = resolve_distance_call(&registry, "cosine_distance", "e", &elems(&bad), false)
                .unwrap_err();
            assert!(matches!(err, ParseError::Syntax(_)), "{bad:?}");
        }
    }
}
