//! Convert AST to the executor's IR

use sidecar_ir::{self as ir, QueryRequest};
use sidecar_registry::FunctionRegistry;

use crate::ast::*;
use crate::parser::ParseError;
use crate::vector::resolve_distance_call;

impl Query {
    /// Convert AST Query to IR, binding `?` placeholders from `args` in order
    pub fn to_ir(
        self,
        args: &[String],
        functions: &FunctionRegistry,
    ) -> Result<QueryRequest, ParseError> {
        let expected = self.placeholder_count();
        if expected != args.len() {
            return Err(ParseError::ArgumentCount {
                expected,
                provided: args.len(),
            });
        }

        let mut args = args.iter();
        let predicates = self
            .conditions
            .into_iter()
            .map(|c| {
                let value = match c.operand {
                    Operand::Literal(v) => v,
                    // Count checked above
                    Operand::Placeholder => args.next().cloned().unwrap_or_default(),
                };
                ir::Predicate {
                    column: c.column,
                    op: c.op.to_ir(),
                    value,
                }
            })
            .collect();

        let ordering = self
            .order
            .map(|o| o.to_ir(functions))
            .transpose()?;

        let limit = match self.limit {
            Some(limit) => limit.to_ir()?,
            None => None,
        };

        Ok(QueryRequest {
            table: self.table,
            columns: self.projection.to_ir(),
            predicates,
            ordering,
            limit,
        })
    }
}

impl Projection {
    fn to_ir(self) -> Option<Vec<String>> {
        match self {
            Projection::Wildcard => None,
            Projection::Columns(columns) => Some(columns),
        }
    }
}

impl CmpOp {
    fn to_ir(self) -> ir::CompareOp {
        match self {
            CmpOp::Eq => ir::CompareOp::Eq,
            CmpOp::Ne => ir::CompareOp::Ne,
            CmpOp::Gt => ir::CompareOp::Gt,
            CmpOp::Lt => ir::CompareOp::Lt,
            CmpOp::Ge => ir::CompareOp::Ge,
            CmpOp::Le => ir::CompareOp::Le,
            CmpOp::Like => ir::CompareOp::Like,
        }
    }
}

impl OrderItem {
    fn to_ir(self, functions: &FunctionRegistry) -> Result<ir::Ordering, ParseError> {
        match self {
            OrderItem::Column { column, desc } => Ok(ir::Ordering::Column {
                column,
                direction: if desc {
                    ir::SortDirection::Desc
                } else {
                    ir::SortDirection::Asc
                },
            }),
            OrderItem::DistanceCall {
                func,
                column,
                elements,
                desc,
            } => resolve_distance_call(functions, &func, &column, &elements, desc)
                .map(ir::Ordering::Vector),
        }
    }
}

impl Limit {
    /// Digits give a bound; anything else means no limit. The store counts
    /// rows as signed 64-bit, so larger bounds are rejected here.
    fn to_ir(self) -> Result<Option<u64>, ParseError> {
        let Some(raw) = self.raw else {
            tracing::warn!("LIMIT without a value, returning all rows");
            return Ok(None);
        };

        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            tracing::warn!(limit = %raw, "non-numeric LIMIT ignored");
            return Ok(None);
        }

        raw.parse::<i64>()
            .ok()
            .and_then(|limit| u64::try_from(limit).ok())
            .map(Some)
            .ok_or_else(|| ParseError::Syntax(format!("LIMIT out of range: {raw}")))
    }
}
